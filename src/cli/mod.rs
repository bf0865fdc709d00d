//! Command-line parsing for the `fdc` force-distance curve tool.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! correction/fitting code. `app` turns these arguments into a
//! `CorrectionConfig` and dispatches.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::domain::{ContactPointMethod, ModelSpec};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fdc", version, about = "AFM force-distance curve correction and contact-model fitting")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Correct and fit every curve of a batch, print grid statistics, and optionally export.
    Process(ProcessArgs),
    /// Write a synthetic force-volume batch (JSON) for testing and demos.
    Synth(SynthArgs),
}

/// Options for processing a batch.
#[derive(Debug, Parser, Clone)]
pub struct ProcessArgs {
    /// Batch input: JSON batch file, or long-format CSV (`row,col,segment,position,deflection`).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Load the correction configuration from JSON. Flags below are ignored when set.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Leading fraction of samples used as the non-contact baseline.
    #[arg(long, default_value_t = 0.1)]
    pub baseline_fraction: f64,

    /// Maximum baseline RMS residual relative to the deflection span.
    #[arg(long, default_value_t = 0.05)]
    pub baseline_residual_ratio: f64,

    /// Contact point method.
    #[arg(long, value_enum, default_value_t = ContactPointMethod::TwoLine)]
    pub contact_method: ContactPointMethod,

    /// Minimum slope (deflection per position) of the contact region.
    #[arg(long, default_value_t = 0.05)]
    pub contact_slope: f64,

    /// Contact-window residual limit as a multiple of the baseline RMS.
    #[arg(long, default_value_t = 3.0)]
    pub noise_factor: f64,

    /// Lower bound of the contact residual limit, relative to the deflection span.
    #[arg(long, default_value_t = 1e-6)]
    pub residual_floor: f64,

    /// Contact-window residual allowed relative to the window's deflection rise.
    #[arg(long, default_value_t = 0.01)]
    pub contact_linearity: f64,

    /// Minimum number of contact samples for a model fit.
    #[arg(long, default_value_t = 10)]
    pub min_contact_samples: usize,

    /// Contact model to fit.
    #[arg(long, value_enum, default_value_t = ModelSpec::Hertz)]
    pub model: ModelSpec,

    /// Residual ratio above which a fit is flagged low-confidence.
    #[arg(long, default_value_t = 0.1)]
    pub fit_quality: f64,

    /// Absolute indentation (m) at which stiffness is reported.
    #[arg(long)]
    pub reference_indentation: Option<f64>,

    /// Fraction of the maximum indentation used when no absolute reference is given.
    #[arg(long, default_value_t = 0.5)]
    pub reference_fraction: f64,

    /// Outlier deviation multiplier.
    #[arg(short = 'k', long, default_value_t = 2.0)]
    pub outlier_k: f64,

    /// Histogram bins per channel.
    #[arg(long, default_value_t = 20)]
    pub bins: usize,

    /// Spring constant (N/m) for CSV input.
    #[arg(long)]
    pub spring_constant: Option<f64>,

    /// Deflection sensitivity (m/V) for CSV input recorded in volts.
    #[arg(long)]
    pub deflection_sensitivity: Option<f64>,

    /// Tip radius (m) for CSV input.
    #[arg(long)]
    pub tip_radius: Option<f64>,

    /// Sample Poisson ratio for CSV input.
    #[arg(long)]
    pub poisson_ratio: Option<f64>,

    /// Number of problem curves to list.
    #[arg(long, default_value_t = 20)]
    pub problems: usize,

    /// Grid points of the average curve.
    #[arg(long, default_value_t = 100)]
    pub average_points: usize,

    /// Export per-curve results to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export per-channel statistics to CSV.
    #[arg(long = "export-stats-csv")]
    pub export_stats_csv: Option<PathBuf>,

    /// Export configuration, grid statistics and average curve to JSON.
    #[arg(long = "export-stats")]
    pub export_stats: Option<PathBuf>,

    /// Export every corrected curve and its result to JSON.
    #[arg(long = "export-curves")]
    pub export_curves: Option<PathBuf>,
}

/// Options for generating a synthetic batch.
#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Output batch JSON.
    #[arg(short, long, value_name = "JSON")]
    pub output: PathBuf,

    #[arg(long, default_value_t = 8)]
    pub rows: usize,

    #[arg(long, default_value_t = 8)]
    pub cols: usize,

    /// Samples per segment.
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub samples: usize,

    /// Piezo travel (m).
    #[arg(long, default_value_t = 500e-9)]
    pub travel: f64,

    /// Mean effective modulus (Pa).
    #[arg(long, default_value_t = 1e6)]
    pub e_star: f64,

    /// Relative spread of E* between pixels.
    #[arg(long, default_value_t = 0.1)]
    pub modulus_spread: f64,

    /// Peak-to-peak variation of the contact fraction (topography).
    #[arg(long, default_value_t = 0.2)]
    pub height_amplitude: f64,

    #[arg(long, default_value_t = 20e-9)]
    pub tip_radius: f64,

    #[arg(long, default_value_t = 0.1)]
    pub spring_constant: f64,

    #[arg(long)]
    pub poisson_ratio: Option<f64>,

    /// Gaussian deflection noise (m).
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Adhesion force (N). Zero disables the attractive dip.
    #[arg(long, default_value_t = 0.0)]
    pub adhesion: f64,

    /// Also write retract segments.
    #[arg(long)]
    pub retract: bool,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_defaults_parse() {
        let cli = Cli::parse_from(["fdc", "-vv", "process", "batch.json", "--model", "auto"]);
        assert_eq!(cli.verbose, 2);
        let Command::Process(args) = cli.command else {
            panic!("expected process");
        };
        assert_eq!(args.model, ModelSpec::Auto);
        assert_eq!(args.contact_method, ContactPointMethod::TwoLine);
        assert_eq!(args.min_contact_samples, 10);
    }

    #[test]
    fn contact_method_is_kebab_case() {
        let cli = Cli::parse_from(["fdc", "process", "x.csv", "--contact-method", "zero-crossing"]);
        let Command::Process(args) = cli.command else {
            panic!("expected process");
        };
        assert_eq!(args.contact_method, ContactPointMethod::ZeroCrossing);
    }
}
