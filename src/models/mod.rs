//! Model builders.
//!
//! Builders translate typed configuration into registry declarations:
//! - `spline`: interpolants and shift-corrected interpolants
//! - `shapes`: elementary shapes, one function for every `ShapeKind`
//! - `composite`: sums and products of registered shapes
//! - `model`: the named `Model` tying a spec to its axes

pub mod composite;
pub mod model;
pub mod shapes;
pub mod spline;

pub use composite::{build_product, build_sum};
pub use model::Model;
pub use shapes::build_shape;
pub use spline::{build_interpolant, build_shifted};
