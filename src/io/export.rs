//! Export fit results to JSON.
//!
//! The record is meant to be easy to consume in downstream scripts: one object
//! per fit with the best values, their errors, and when the fit ran.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::fit::FitOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub model: String,
    pub label: String,
    pub values: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, f64>,
    pub nll: f64,
    pub converged: bool,
    pub evaluations: usize,
}

impl FitRecord {
    pub fn new(model: &str, label: &str, outcome: &FitOutcome) -> Self {
        Self {
            tool: "mm".to_string(),
            created: Utc::now(),
            model: model.to_string(),
            label: label.to_string(),
            values: outcome.values.clone(),
            errors: outcome.errors.clone(),
            nll: outcome.nll,
            converged: outcome.converged,
            evaluations: outcome.evaluations,
        }
    }
}

/// Write a fit record as pretty JSON.
pub fn write_fit_json(path: &Path, record: &FitRecord) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::Io(format!("Failed to create fit export '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, record).map_err(|e| AppError::Io(format!("Failed to write fit export: {e}")))
}
