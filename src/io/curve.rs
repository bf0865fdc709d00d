//! JSON exports of a processed batch.
//!
//! - statistics file: run configuration, grid statistics and the average curve
//! - curves file: every corrected curve with its result, keyed by grid position
//!
//! Non-finite values (e.g. empty average-curve bins) are written as `null`.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{CorrectionConfig, CurveResult, GridPosition};
use crate::error::{AppError, EXIT_INPUT};
use crate::report::{AverageCurve, GridStatistics};

#[derive(Debug, Serialize)]
pub struct StatisticsFile<'a> {
    pub tool: &'static str,
    pub generated_at: DateTime<Utc>,
    pub cancelled: bool,
    pub config: &'a CorrectionConfig,
    pub statistics: &'a GridStatistics,
    pub average_curve: Option<&'a AverageCurve>,
}

#[derive(Debug, Serialize)]
struct CurveEntry<'a> {
    position: GridPosition,
    #[serde(flatten)]
    result: &'a CurveResult,
}

#[derive(Debug, Serialize)]
struct CurvesFile<'a> {
    tool: &'static str,
    generated_at: DateTime<Utc>,
    curves: Vec<CurveEntry<'a>>,
}

pub fn write_statistics_json(
    path: &Path,
    config: &CorrectionConfig,
    statistics: &GridStatistics,
    average_curve: Option<&AverageCurve>,
    cancelled: bool,
) -> Result<(), AppError> {
    let doc = StatisticsFile {
        tool: "fdc",
        generated_at: Utc::now(),
        cancelled,
        config,
        statistics,
        average_curve,
    };
    write_json(path, &doc, "statistics JSON")
}

pub fn write_curves_json(path: &Path, results: &[(GridPosition, CurveResult)]) -> Result<(), AppError> {
    let doc = CurvesFile {
        tool: "fdc",
        generated_at: Utc::now(),
        curves: results
            .iter()
            .map(|(position, result)| CurveEntry {
                position: *position,
                result,
            })
            .collect(),
    };
    write_json(path, &doc, "curves JSON")
}

/// Write a batch file (as produced by `fdc synth`).
pub fn write_batch_json(path: &Path, batch: &crate::io::ingest::BatchFile) -> Result<(), AppError> {
    write_json(path, batch, "batch JSON")
}

fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to create {what} '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write {what}: {e}")))?;
    Ok(())
}
