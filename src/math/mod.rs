//! Mathematical utilities: splines, series bases, line shapes and quadrature.

pub mod basis;
pub mod quad;
pub mod special;
pub mod spline;

pub use basis::*;
pub use quad::*;
pub use spline::{CubicSpline, SplineError};
