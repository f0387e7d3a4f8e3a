//! Top-level application orchestration.
//!
//! `src/main.rs` parses arguments and sets up logging; this module maps each
//! CLI command onto the pipeline, then prints reports.

use tracing::info;

use crate::cli::{BuildArgs, Command, FitArgs, ToyArgs};
use crate::domain::FitConfig;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `mm` binary, after argument parsing.
pub fn run(command: Command) -> Result<(), AppError> {
    match command {
        Command::Build(args) => handle_build(args),
        Command::Fit(args) => handle_fit(args),
        Command::Toy(args) => handle_toy(args),
    }
}

fn handle_build(args: BuildArgs) -> Result<(), AppError> {
    let run = pipeline::run_build(&args.models)?;
    println!("{}", crate::report::format_built(&run.built));
    println!("{}", crate::report::format_registry(&run.registry));
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args);
    let run = pipeline::run_fit(&config)?;
    println!(
        "{}",
        crate::report::format_fit_summary(&config.model, &run.label, &run.outcome)
    );

    if let Some(path) = &config.export {
        let record = crate::io::FitRecord::new(&config.model, &run.label, &run.outcome);
        crate::io::write_fit_json(path, &record)?;
        info!(path = %path.display(), "exported fit");
    }
    Ok(())
}

fn handle_toy(args: ToyArgs) -> Result<(), AppError> {
    let dataset = pipeline::run_toy(&args.models, &args.model, args.events, args.seed)?;
    crate::io::write_csv_dataset(&args.out, &dataset)?;
    info!(events = dataset.len(), path = %args.out.display(), "wrote toy dataset");
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    FitConfig {
        models_path: args.models.clone(),
        model: args.model.clone(),
        label: args.label.clone(),
        data_path: args.data.clone(),
        columns: args.columns.clone(),
        weight_column: args.weight.clone(),
        compute_errors: args.errors,
        save_dir: args.save_dir.clone(),
        export: args.export.clone(),
        scan_steps: args.steps,
        max_sweeps: args.max_sweeps,
        tolerance: args.tolerance,
    }
}
