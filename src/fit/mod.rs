//! Fitting.
//!
//! Responsibilities:
//!
//! - prepare a model, its free parameters and the NLL objective (`adapter`)
//! - minimize it with a pluggable `FitEngine`; `GridScanEngine` is the
//!   in-repo reference engine (`grid_scan`)

pub mod adapter;
pub mod grid_scan;

pub use adapter::*;
pub use grid_scan::GridScanEngine;
