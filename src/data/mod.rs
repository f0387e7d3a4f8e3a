//! In-memory datasets.
//!
//! A `Dataset` is a set of named, equally long `f64` columns with optional
//! per-row weights. Providers (CSV files, toy generation) build one; the fit
//! adapter only reads it.

use std::collections::BTreeMap;

use crate::error::AppError;

pub mod toy;

pub use toy::generate_toy;

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: BTreeMap<String, Vec<f64>>,
    weights: Option<Vec<f64>>,
    rows: usize,
}

impl Dataset {
    pub fn new(columns: Vec<(String, Vec<f64>)>, weights: Option<Vec<f64>>) -> Result<Self, AppError> {
        let Some(rows) = columns.first().map(|(_, v)| v.len()) else {
            return Err(AppError::Dataset("a dataset needs at least one column".to_string()));
        };
        let mut map = BTreeMap::new();
        for (name, values) in columns {
            if values.len() != rows {
                return Err(AppError::Dataset(format!(
                    "column '{name}' has {} rows, expected {rows}",
                    values.len()
                )));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(AppError::Dataset(format!("column '{name}' has non-finite values")));
            }
            if map.insert(name.clone(), values).is_some() {
                return Err(AppError::Dataset(format!("duplicate column '{name}'")));
            }
        }
        if let Some(w) = &weights {
            if w.len() != rows {
                return Err(AppError::Dataset(format!("{} weights for {rows} rows", w.len())));
            }
            if w.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(AppError::Dataset("weights must be finite and non-negative".to_string()));
            }
        }
        Ok(Self {
            columns: map,
            weights,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Result<&[f64], AppError> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| AppError::Dataset(format!("missing column '{name}'")))
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn weight(&self, row: usize) -> f64 {
        self.weights.as_ref().map_or(1.0, |w| w[row])
    }

    pub fn total_weight(&self) -> f64 {
        match &self.weights {
            Some(w) => w.iter().sum(),
            None => self.rows as f64,
        }
    }

    /// Keep only rows whose values lie inside every given `[lo, hi]`.
    pub fn restrict(&self, ranges: &[(&str, (f64, f64))]) -> Result<Self, AppError> {
        let mut keep = vec![true; self.rows];
        for (name, (lo, hi)) in ranges {
            for (k, v) in keep.iter_mut().zip(self.column(name)?) {
                *k &= *v >= *lo && *v <= *hi;
            }
        }
        let pick = |values: &[f64]| -> Vec<f64> {
            values
                .iter()
                .zip(&keep)
                .filter(|(_, k)| **k)
                .map(|(v, _)| *v)
                .collect()
        };
        Ok(Self {
            columns: self
                .columns
                .iter()
                .map(|(name, values)| (name.clone(), pick(values.as_slice())))
                .collect(),
            weights: self.weights.as_deref().map(pick),
            rows: keep.iter().filter(|k| **k).count(),
        })
    }
}
