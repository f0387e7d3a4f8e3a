//! Error and warning types shared by every module.
//!
//! Every failure carries a process exit code so the `mm` binary can map errors
//! to exit statuses without inspecting messages:
//!
//! - `2`: bad input (configuration, expression text, datasets, files)
//! - `3`: registry lookups (undeclared names, duplicates, kind conflicts)
//! - `4`: evaluation failures
//! - `5`: the fit engine did not converge

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("'{0}' is not declared in the registry")]
    NotFound(String),

    #[error("'{name}' is already declared as a {existing}, cannot redeclare it as a {requested}")]
    KindConflict {
        name: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("'{0}' is already declared")]
    Duplicate(String),

    #[error("invalid configuration for '{label}': {message}")]
    ShapeConfig { label: String, message: String },

    #[error("cannot parse expression '{text}': {message}")]
    Parse { text: String, message: String },

    #[error("cannot evaluate '{name}': {message}")]
    Evaluation { name: String, message: String },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("fit of '{label}' did not converge: {message}")]
    FitConvergence { label: String, message: String },

    #[error("{0}")]
    Io(String),
}

impl AppError {
    pub fn shape_config(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ShapeConfig {
            label: label.into(),
            message: message.into(),
        }
    }

    pub fn evaluation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::ShapeConfig { .. }
            | AppError::Parse { .. }
            | AppError::Dataset(_)
            | AppError::Io(_) => 2,
            AppError::NotFound(_) | AppError::KindConflict { .. } | AppError::Duplicate(_) => 3,
            AppError::Evaluation { .. } => 4,
            AppError::FitConvergence { .. } => 5,
        }
    }
}

/// Non-fatal advisories recorded by the registry.
///
/// These never abort a build; callers inspect `Registry::warnings` when they
/// need to act on them.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A plain (non-recursive, non-extended) sum mixes more than two terms, so
    /// its last coefficient `1 - Σf` can go negative.
    CompositionPositivity { label: String, terms: usize },
    /// A variable was re-declared with different bounds; the first declaration
    /// was kept.
    BoundsMismatch {
        name: String,
        kept: (f64, f64),
        requested: (f64, f64),
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::CompositionPositivity { label, terms } => write!(
                f,
                "sum '{label}' has {terms} terms and is not guaranteed to be positive; use a recursive sum"
            ),
            Warning::BoundsMismatch {
                name,
                kept,
                requested,
            } => write!(
                f,
                "variable '{name}' redeclared with bounds [{}, {}], keeping [{}, {}]",
                requested.0, requested.1, kept.0, kept.1
            ),
        }
    }
}
