//! `mass-models` library crate.
//!
//! Mass-parameterized probability density models: a named-object registry,
//! spline interpolants for mass-dependent parameters, elementary shapes,
//! sum/product composites, and a fit adapter around a pluggable engine.
//!
//! The binary (`mm`) is a thin wrapper around this library so the core logic
//! is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod expr;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod registry;
pub mod report;
