//! Export per-curve results to CSV.
//!
//! One row per grid position, failures included, so the file can be pivoted
//! back into maps in a spreadsheet or downstream script.

use std::path::Path;

use crate::correct::CurveFeatures;
use crate::domain::{AdhesionSource, Confidence, CorrectionConfig, CurveResult, GridPosition};
use crate::error::{AppError, EXIT_INPUT};
use crate::report::GridStatistics;

const HEADER: [&str; 22] = [
    "row",
    "col",
    "status",
    "detail",
    "model",
    "effective_modulus",
    "youngs_modulus",
    "adhesion_force",
    "adhesion_source",
    "work_of_adhesion",
    "stiffness",
    "residual",
    "bic",
    "fitted_samples",
    "confidence",
    "contact_index",
    "contact_height",
    "max_deflection",
    "deflection_attractive",
    "attractive_area",
    "raw_offset",
    "raw_stiffness",
];

/// Write per-curve results to a CSV file.
pub fn write_results_csv(
    path: &Path,
    results: &[(GridPosition, CurveResult)],
    config: &CorrectionConfig,
) -> Result<(), AppError> {
    let writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_results(writer, results, config)
}

pub fn write_results<W: std::io::Write>(
    mut writer: csv::Writer<W>,
    results: &[(GridPosition, CurveResult)],
    config: &CorrectionConfig,
) -> Result<(), AppError> {
    writer
        .write_record(HEADER)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write export CSV header: {e}")))?;

    for (position, result) in results {
        writer
            .write_record(result_row(*position, result, config))
            .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

fn result_row(position: GridPosition, result: &CurveResult, config: &CorrectionConfig) -> Vec<String> {
    let detail = match result {
        CurveResult::Failure { reason, .. } => reason.to_string(),
        CurveResult::Success { fit, .. } => fit.quality_warning.as_ref().map(|w| w.to_string()).unwrap_or_default(),
    };

    let fit = result.fit();
    let stiffness = match result {
        CurveResult::Success { fit, .. } => fit.stiffness,
        CurveResult::Failure { stiffness, .. } => *stiffness,
    };
    let curve = result.curve().filter(|c| c.is_referenced());
    let features = curve.map(|c| CurveFeatures::from_curve(c, config.contact_noise_factor));

    vec![
        position.row.to_string(),
        position.col.to_string(),
        result.status_code().to_string(),
        detail,
        fit.and_then(|f| f.model).map(|m| m.display_name().to_string()).unwrap_or_default(),
        num(fit.and_then(|f| f.effective_modulus)),
        num(fit.and_then(|f| f.youngs_modulus)),
        num(fit.and_then(|f| f.adhesion_force)),
        fit.and_then(|f| f.adhesion_source)
            .map(|s| match s {
                AdhesionSource::Fitted => "fitted",
                AdhesionSource::PullOff => "pull_off",
                AdhesionSource::JumpToContact => "jump_to_contact",
            })
            .unwrap_or_default()
            .to_string(),
        num(fit.and_then(|f| f.work_of_adhesion)),
        num(stiffness),
        num(fit.and_then(|f| f.residual)),
        num(fit.and_then(|f| f.bic)),
        fit.map(|f| f.fitted_samples.to_string()).unwrap_or_default(),
        fit.map(|f| match f.confidence {
            Confidence::Normal => "normal",
            Confidence::Low => "low",
        })
        .unwrap_or_default()
        .to_string(),
        curve
            .and_then(|c| c.contact_index())
            .map(|i| i.to_string())
            .unwrap_or_default(),
        num(features.as_ref().and_then(|f| f.contact_height)),
        num(features.as_ref().map(|f| f.max_deflection)),
        num(features.as_ref().map(|f| f.deflection_attractive)),
        num(features.as_ref().and_then(|f| f.attractive_area)),
        num(features.as_ref().map(|f| f.raw_offset)),
        num(features.as_ref().map(|f| f.raw_stiffness)),
    ]
}

/// Write per-channel summary statistics to a CSV file.
pub fn write_statistics_csv(path: &Path, stats: &GridStatistics) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to create stats CSV '{}': {e}", path.display())))?;

    writer
        .write_record(["channel", "count", "mean", "std_dev", "min", "max", "outliers"])
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write stats CSV header: {e}")))?;
    for (channel, ch) in &stats.channels {
        writer
            .write_record([
                channel.name().to_string(),
                ch.count.to_string(),
                num(ch.mean),
                num(ch.std_dev),
                num(ch.min),
                num(ch.max),
                ch.outliers.len().to_string(),
            ])
            .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to write stats CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to flush stats CSV: {e}")))?;
    Ok(())
}

fn num(v: Option<f64>) -> String {
    v.filter(|x| x.is_finite()).map(|x| format!("{x:.10e}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailureReason;

    #[test]
    fn failures_are_exported_with_their_reason() {
        let results = vec![(
            GridPosition::new(3, 4),
            CurveResult::Failure {
                reason: FailureReason::InsufficientContactData { found: 4, required: 10 },
                curve: None,
                stiffness: Some(2.5),
            },
        )];
        let mut buf = Vec::new();
        write_results(csv::Writer::from_writer(&mut buf), &results, &CorrectionConfig::default()).unwrap();
        let mut reader = csv::Reader::from_reader(buf.as_slice());
        assert_eq!(reader.headers().unwrap().len(), HEADER.len());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "3");
        assert_eq!(&row[1], "4");
        assert_eq!(&row[2], "insufficient_contact_data");
        assert_eq!(&row[3], "insufficient contact data: 4 samples, need 10");
        assert_eq!(&row[10], "2.5000000000e0");
        assert!(row[5].is_empty());
    }
}
