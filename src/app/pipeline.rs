//! Shared pipeline logic behind the CLI commands.
//!
//! model file -> registry build -> dataset -> fit -> outcome
//!
//! Front-ends only deal with presentation.

use std::path::Path;

use crate::data::{generate_toy, Dataset};
use crate::domain::FitConfig;
use crate::error::AppError;
use crate::fit::{fit, FitOptions, FitOutcome, GridScanEngine};
use crate::io::{read_csv_dataset, read_model_file, BuiltModel};
use crate::plot::AsciiRenderer;
use crate::registry::Registry;

/// Registry and models after building a model file.
#[derive(Debug)]
pub struct BuildOutput {
    pub registry: Registry,
    pub built: Vec<BuiltModel>,
}

/// All computed outputs of a single `mm fit` run.
#[derive(Debug)]
pub struct FitRun {
    pub registry: Registry,
    pub label: String,
    pub dataset: Dataset,
    pub outcome: FitOutcome,
}

pub fn run_build(models_path: &Path) -> Result<BuildOutput, AppError> {
    let file = read_model_file(models_path)?;
    let mut registry = Registry::new();
    let built = file.build_all(&mut registry)?;
    Ok(BuildOutput { registry, built })
}

/// Build the model file, read the dataset, and fit the requested model.
pub fn run_fit(config: &FitConfig) -> Result<FitRun, AppError> {
    let BuildOutput { mut registry, built } = run_build(&config.models_path)?;
    let entry = built
        .into_iter()
        .find(|b| b.model.name == config.model)
        .ok_or_else(|| AppError::NotFound(config.model.clone()))?;
    let mut model = entry.model;
    let label = config.label.clone().unwrap_or(entry.label);

    let dataset = read_csv_dataset(&config.data_path, &config.columns, config.weight_column.as_deref())?;
    let engine = GridScanEngine {
        steps: config.scan_steps,
        max_sweeps: config.max_sweeps,
        tolerance: config.tolerance,
        ..GridScanEngine::default()
    };
    let renderer = config.save_dir.as_ref().map(AsciiRenderer::new);
    let options = FitOptions {
        save: renderer.is_some(),
        compute_errors: config.compute_errors,
    };

    let outcome = fit(
        &mut model,
        &mut registry,
        &dataset,
        &label,
        &engine,
        renderer.as_ref().map(|r| r as &dyn crate::fit::Renderer),
        &options,
    )?;

    Ok(FitRun {
        registry,
        label,
        dataset,
        outcome,
    })
}

/// Build the model file and sample `events` from one model's pdf.
pub fn run_toy(models_path: &Path, model: &str, events: usize, seed: u64) -> Result<Dataset, AppError> {
    let BuildOutput { registry, built } = run_build(models_path)?;
    let entry = built
        .iter()
        .find(|b| b.model.name == model)
        .ok_or_else(|| AppError::NotFound(model.to_string()))?;
    generate_toy(&registry, &entry.label, events, seed)
}
