//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads and validates the batch
//! - runs correction + fitting over the grid
//! - prints summaries and writes optional exports

use std::fs::File;
use std::path::Path;

use clap::Parser;
use log::{LevelFilter, info};

use crate::cli::{Command, ProcessArgs, SynthArgs};
use crate::data::{SyntheticCurve, SyntheticGrid};
use crate::domain::{CorrectionConfig, CurveMetadata};
use crate::error::{AppError, EXIT_INPUT};
use crate::io::ingest::{BatchFile, IngestedBatch};

pub mod pipeline;

/// Entry point for the `fdc` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Process(args) => handle_process(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    // RUST_LOG, when set, overrides the verbosity flag.
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

fn handle_process(args: ProcessArgs) -> Result<(), AppError> {
    let config = config_from_args(&args)?;
    config.validate()?;

    let batch = load_input(&args)?;
    info!(
        "loaded {} curves from {} records ({} skipped)",
        batch.items.len(),
        batch.records_read,
        batch.record_errors.len()
    );

    let cancel = pipeline::CancelToken::new();
    let run = pipeline::run_batch_with(&batch.items, &config, &cancel, args.average_points)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.statistics, &config, run.cancelled)
    );
    println!("{}", crate::report::format_channel_table(&run.statistics));
    let problems = crate::report::format_problem_curves(&run.results, args.problems);
    if !problems.is_empty() {
        println!("{problems}");
    }

    // Optional exports.
    if let Some(path) = &args.export {
        crate::io::export::write_results_csv(path, &run.results, &config)?;
    }
    if let Some(path) = &args.export_stats_csv {
        crate::io::export::write_statistics_csv(path, &run.statistics)?;
    }
    if let Some(path) = &args.export_stats {
        crate::io::curve::write_statistics_json(
            path,
            &config,
            &run.statistics,
            run.average.as_ref(),
            run.cancelled,
        )?;
    }
    if let Some(path) = &args.export_curves {
        crate::io::curve::write_curves_json(path, &run.results)?;
    }

    Ok(())
}

fn load_input(args: &ProcessArgs) -> Result<IngestedBatch, AppError> {
    let is_csv = args
        .input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return crate::io::ingest::load_batch_json(&args.input);
    }

    let Some(spring_constant) = args.spring_constant else {
        return Err(AppError::config("CSV input requires --spring-constant."));
    };
    let metadata = CurveMetadata {
        spring_constant,
        deflection_sensitivity: args.deflection_sensitivity,
        tip_radius: args.tip_radius,
        poisson_ratio: args.poisson_ratio,
        load_cycle: None,
    };
    crate::io::ingest::load_batch_csv(&args.input, &metadata)
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let grid = SyntheticGrid {
        rows: args.rows,
        cols: args.cols,
        curve: SyntheticCurve {
            samples: args.samples,
            travel: args.travel,
            e_star: args.e_star,
            tip_radius: args.tip_radius,
            spring_constant: args.spring_constant,
            poisson_ratio: args.poisson_ratio,
            noise: args.noise,
            adhesion_force: args.adhesion,
            ..SyntheticCurve::default()
        },
        modulus_spread: args.modulus_spread,
        height_amplitude: args.height_amplitude,
        with_retract: args.retract,
        seed: args.seed,
    };
    let items = grid.generate()?;
    let batch = BatchFile::from_items(&items, format!("fdc synth --seed {}", args.seed));
    crate::io::curve::write_batch_json(&args.output, &batch)?;

    println!(
        "Wrote {} synthetic curves ({}x{}) to {}",
        items.len(),
        args.rows,
        args.cols,
        args.output.display()
    );
    Ok(())
}

/// Build the run configuration from flags, or from `--config` when given.
pub fn config_from_args(args: &ProcessArgs) -> Result<CorrectionConfig, AppError> {
    if let Some(path) = &args.config {
        return read_config_json(path);
    }

    Ok(CorrectionConfig {
        baseline_fraction: args.baseline_fraction,
        baseline_residual_ratio: args.baseline_residual_ratio,
        contact_method: args.contact_method,
        contact_slope_threshold: args.contact_slope,
        contact_noise_factor: args.noise_factor,
        contact_residual_floor: args.residual_floor,
        contact_linearity: args.contact_linearity,
        min_contact_samples: args.min_contact_samples,
        model: args.model,
        fit_quality_threshold: args.fit_quality,
        reference_indentation: args.reference_indentation,
        reference_fraction: args.reference_fraction,
        outlier_k: args.outlier_k,
        histogram_bins: args.bins,
    })
}

fn read_config_json(path: &Path) -> Result<CorrectionConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to open config '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::new(EXIT_INPUT, format!("Invalid config JSON: {e}")))
}
