//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the correction/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{Channel, CorrectionConfig, CurveResult, GridPosition};
use crate::report::aggregate::GridStatistics;

/// Run header: configuration and per-status counts.
pub fn format_run_summary(stats: &GridStatistics, config: &CorrectionConfig, cancelled: bool) -> String {
    let mut out = String::new();

    out.push_str("=== fdc - force-distance curve correction ===\n");
    out.push_str(&format!(
        "Contact: {:?} | slope>={} | noise x{} | min contact samples={}\n",
        config.contact_method,
        config.contact_slope_threshold,
        config.contact_noise_factor,
        config.min_contact_samples
    ));
    out.push_str(&format!(
        "Model: {:?} | quality<={} | outlier k={}\n",
        config.model, config.fit_quality_threshold, config.outlier_k
    ));
    out.push_str(&format!(
        "Curves: n={} | ok={} | low-confidence={} | excluded={}\n",
        stats.curves, stats.succeeded, stats.low_confidence, stats.excluded
    ));
    if cancelled {
        out.push_str("(batch cancelled; statistics cover processed curves only)\n");
    }

    out.push_str("\nStatus:\n");
    for (code, count) in &stats.status_counts {
        out.push_str(&format!("  {code:<28} {count:>6}\n"));
    }
    out.push('\n');

    out
}

/// Per-channel mean/std/range table.
pub fn format_channel_table(stats: &GridStatistics) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<22} {:>6} {:>12} {:>12} {:>12} {:>12} {:>8}",
            "channel", "n", "mean", "std", "min", "max", "outliers"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<22} {:-<6} {:-<12} {:-<12} {:-<12} {:-<12} {:-<8}",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for channel in Channel::ALL {
        let Some(ch) = stats.channel(channel) else {
            continue;
        };
        out.push_str(
            format!(
                "{:<22} {:>6} {:>12} {:>12} {:>12} {:>12} {:>8}",
                channel.name(),
                ch.count,
                fmt_opt(ch.mean),
                fmt_opt(ch.std_dev),
                fmt_opt(ch.min),
                fmt_opt(ch.max),
                ch.outliers.len()
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Failed or low-confidence curves, at most `limit` rows.
pub fn format_problem_curves(results: &[(GridPosition, CurveResult)], limit: usize) -> String {
    let problems: Vec<&(GridPosition, CurveResult)> = results
        .iter()
        .filter(|(_, r)| r.status_code() != "ok")
        .collect();
    if problems.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(&format!("Problem curves ({}):\n", problems.len()));
    for (pos, result) in problems.iter().take(limit) {
        let detail = match result {
            CurveResult::Failure { reason, .. } => reason.to_string(),
            CurveResult::Success { fit, .. } => fit
                .quality_warning
                .as_ref()
                .map(|w| w.to_string())
                .unwrap_or_default(),
        };
        out.push_str(&format!("  {:<12} {}\n", pos.to_string(), truncate(&detail, 90)));
    }
    if problems.len() > limit {
        out.push_str(&format!("  ... and {} more\n", problems.len() - limit));
    }

    out
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) => format!("{x:.4e}"),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailureReason;
    use crate::report::aggregate::ResultAggregator;

    fn failed(detail: &str) -> CurveResult {
        CurveResult::Failure {
            reason: FailureReason::ContactPointNotFound {
                detail: detail.to_string(),
            },
            curve: None,
            stiffness: None,
        }
    }

    #[test]
    fn summary_lists_status_counts() {
        let mut agg = ResultAggregator::new(2.0, 10, 3.0);
        agg.push(GridPosition::new(0, 0), &failed("flat"));
        agg.push(GridPosition::new(0, 1), &failed("flat"));
        let text = format_run_summary(&agg.statistics(), &CorrectionConfig::default(), false);
        assert!(text.contains("Curves: n=2 | ok=0"));
        assert!(text.contains("contact_point_not_found"));
        assert!(!text.contains("cancelled"));
    }

    #[test]
    fn problem_list_is_limited() {
        let results: Vec<(GridPosition, CurveResult)> = (0..5)
            .map(|i| (GridPosition::new(0, i), failed("no slope")))
            .collect();
        let text = format_problem_curves(&results, 2);
        assert!(text.starts_with("Problem curves (5):"));
        assert!(text.contains("... and 3 more"));
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("abcdef", 4), "abc.");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
