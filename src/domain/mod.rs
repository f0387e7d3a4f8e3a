//! Domain types used throughout the crate.
//!
//! This module defines:
//!
//! - literal parameter ranges (`ParamRange`, `FractionRange`)
//! - the shape-kind registration table (`ShapeKind`)
//! - typed model configurations (`ShapeConfig`, `SumConfig`, `ProductConfig`, `ModelSpec`)
//! - the CLI-derived fit run configuration (`FitConfig`)

pub mod types;

pub use types::*;
