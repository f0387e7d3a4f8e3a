//! JSON model files.
//!
//! A model file declares axis ranges, control values, and an ordered list of
//! models. Composites refer to earlier entries by label, so entries are built
//! in file order:
//!
//! ```json
//! {
//!   "axes": { "x": [0, 200] },
//!   "controls": { "MH": 125 },
//!   "models": [
//!     { "name": "sig", "type": "shape", "kind": "gaussian", "mode": "fixed",
//!       "params": { "mean": [100, 0, 200], "sigma": [5, 0, 20] } },
//!     { "name": "bg", "type": "shape", "kind": "exponential", "mode": "fixed" },
//!     { "name": "model", "type": "sum", "recursive": true,
//!       "constituents": { "bg": [0.3, 0, 1], "sig": [] } }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Axes, IntegralSpline, ModelSpec};
use crate::error::AppError;
use crate::models::Model;
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    #[serde(default)]
    pub axes: BTreeMap<String, [f64; 2]>,
    #[serde(default)]
    pub controls: BTreeMap<String, f64>,
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    /// Registry label; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub axes: Axes,
    #[serde(flatten)]
    pub spec: ModelSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integral: Option<IntegralSpline>,
}

impl ModelEntry {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    pub fn model(&self) -> Result<Model, AppError> {
        let model = Model::new(&self.name, self.axes.clone(), self.spec.clone())?;
        match &self.integral {
            Some(integral) => model.with_integral(integral.clone()),
            None => Ok(model),
        }
    }
}

/// A model built into a registry, with the label it was built under.
#[derive(Debug, Clone)]
pub struct BuiltModel {
    pub model: Model,
    pub label: String,
    pub integral: Option<String>,
}

impl ModelFile {
    pub fn entry(&self, name: &str) -> Result<&ModelEntry, AppError> {
        self.models
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| AppError::NotFound(name.to_string()))
    }

    /// Declare axes, build every model in order, then apply control values.
    ///
    /// Integral splines are registered as `<label>_integral`.
    pub fn build_all(&self, registry: &mut Registry) -> Result<Vec<BuiltModel>, AppError> {
        for (name, [lo, hi]) in &self.axes {
            registry.declare_axis(name, *lo, *hi)?;
        }

        let mut built = Vec::with_capacity(self.models.len());
        for entry in &self.models {
            let mut model = entry.model()?;
            let label = model.build(registry, entry.label())?;
            let integral = model.build_integral(registry, &format!("{label}_integral"))?;
            built.push(BuiltModel { model, label, integral });
        }

        for (name, value) in &self.controls {
            if registry.contains(name) {
                let set = registry.set_value(name, *value)?;
                debug!(name, requested = value, set, "control value");
            } else {
                registry.ensure_control(name, *value, *value, *value)?;
            }
        }
        Ok(built)
    }
}

pub fn parse_model_file(text: &str) -> Result<ModelFile, AppError> {
    serde_json::from_str(text).map_err(|e| AppError::Io(format!("Invalid model file: {e}")))
}

pub fn read_model_file(path: &Path) -> Result<ModelFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::Io(format!("Failed to open model file '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::Io(format!("Invalid model file '{}': {e}", path.display())))
}
