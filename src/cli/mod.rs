//! Command-line parsing for the `mm` mass-model tool.
//!
//! Argument parsing and command dispatch stay separate from the registry and
//! fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::Level;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "mm", version, about = "Mass-parameterized PDF model builder and fitter")]
pub struct Cli {
    /// Log verbosity (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value_t = Level::INFO)]
    pub log_level: Level,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build every model in a model file and print the registry.
    Build(BuildArgs),
    /// Fit one model to a CSV dataset.
    Fit(FitArgs),
    /// Generate a toy dataset from one model.
    Toy(ToyArgs),
}

#[derive(Debug, Args, Clone)]
pub struct BuildArgs {
    /// JSON model file.
    #[arg(long, value_name = "JSON")]
    pub models: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// JSON model file.
    #[arg(long, value_name = "JSON")]
    pub models: PathBuf,

    /// Name of the model entry to fit.
    #[arg(long)]
    pub model: String,

    /// Registry label to fit under (defaults to the entry's label).
    #[arg(long)]
    pub label: Option<String>,

    /// CSV dataset.
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Dataset columns to read, matching the model's axis names.
    #[arg(long, value_delimiter = ',', required = true)]
    pub columns: Vec<String>,

    /// Optional per-event weight column.
    #[arg(long)]
    pub weight: Option<String>,

    /// Estimate parameter errors after the fit.
    #[arg(long)]
    pub errors: bool,

    /// Write one data-vs-model overlay per axis into this directory.
    #[arg(long, value_name = "DIR")]
    pub save_dir: Option<PathBuf>,

    /// Export the fit result to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Candidate points per parameter window.
    #[arg(long, default_value_t = 9)]
    pub steps: usize,

    /// Maximum number of coordinate sweeps.
    #[arg(long, default_value_t = 100)]
    pub max_sweeps: usize,

    /// Convergence tolerance relative to each parameter range.
    #[arg(long, default_value_t = 1e-4)]
    pub tolerance: f64,
}

#[derive(Debug, Args, Clone)]
pub struct ToyArgs {
    /// JSON model file.
    #[arg(long, value_name = "JSON")]
    pub models: PathBuf,

    /// Name of the model entry to sample.
    #[arg(long)]
    pub model: String,

    /// Number of events.
    #[arg(long, default_value_t = 1000)]
    pub events: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fit_with_defaults() {
        let cli = Cli::parse_from([
            "mm", "fit", "--models", "m.json", "--model", "sig", "--data", "d.csv", "--columns", "x,y",
        ]);
        assert_eq!(cli.log_level, Level::INFO);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.columns, ["x", "y"]);
        assert_eq!(args.steps, 9);
        assert!(!args.errors);
    }

    #[test]
    fn log_level_is_global() {
        let cli = Cli::parse_from(["mm", "build", "--models", "m.json", "--log-level", "debug"]);
        assert_eq!(cli.log_level, Level::DEBUG);
    }
}
