//! Input/output helpers.
//!
//! - JSON model files (`model_file`)
//! - CSV datasets (`dataset`)
//! - fit result exports (`export`)

pub mod dataset;
pub mod export;
pub mod model_file;

pub use dataset::*;
pub use export::*;
pub use model_file::*;
