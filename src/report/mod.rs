//! Reporting: registry listings and fit summaries.

pub mod format;

pub use format::*;
