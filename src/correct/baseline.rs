//! Baseline removal.
//!
//! A straight line is fitted to the leading non-contact part of the approach and
//! subtracted from the whole curve. What remains is deflection caused by the
//! tip-sample interaction only.

use crate::domain::{BaselineLine, CorrectionConfig, FailureReason};
use crate::math::fit_line;

/// Number of leading samples used as the non-contact region.
pub fn baseline_region_len(n: usize, config: &CorrectionConfig, contact_hint: Option<usize>) -> usize {
    // The epsilon keeps 0.1 * 200 from rounding up to 21.
    let by_fraction = (config.baseline_fraction * n as f64 - 1e-9).ceil().max(0.0) as usize;
    let mut len = by_fraction.min(n);
    if let Some(hint) = contact_hint {
        len = len.min(hint);
    }
    len
}

/// Fit the baseline line on the non-contact region.
///
/// `contact_hint` (a previously located contact index) shrinks the region so it
/// never reaches into contact.
pub fn fit_baseline(
    position: &[f64],
    deflection: &[f64],
    config: &CorrectionConfig,
    contact_hint: Option<usize>,
) -> Result<BaselineLine, FailureReason> {
    let n = position.len().min(deflection.len());
    let len = baseline_region_len(n, config, contact_hint);
    if len < 2 {
        return Err(FailureReason::BaselineUnstable {
            detail: format!("non-contact region has {len} samples"),
        });
    }

    let line = fit_line(&position[..len], &deflection[..len]).ok_or_else(|| {
        FailureReason::BaselineUnstable {
            detail: "non-contact positions are degenerate".to_string(),
        }
    })?;

    let span = deflection_span(deflection);
    let ratio = if span > 0.0 { line.rms / span } else { 0.0 };
    if ratio > config.baseline_residual_ratio {
        return Err(FailureReason::BaselineUnstable {
            detail: format!(
                "residual ratio {ratio:.4} exceeds {:.4}",
                config.baseline_residual_ratio
            ),
        });
    }

    Ok(BaselineLine {
        slope: line.slope,
        intercept: line.intercept,
        rms: line.rms,
        samples: len,
    })
}

/// Subtract the extrapolated baseline from every sample.
pub fn subtract_baseline(position: &[f64], deflection: &[f64], line: &BaselineLine) -> Vec<f64> {
    position
        .iter()
        .zip(deflection)
        .map(|(x, d)| d - line.eval(*x))
        .collect()
}

/// Fit and subtract in one step.
pub fn correct_baseline(
    position: &[f64],
    deflection: &[f64],
    config: &CorrectionConfig,
    contact_hint: Option<usize>,
) -> Result<(BaselineLine, Vec<f64>), FailureReason> {
    let line = fit_baseline(position, deflection, config, contact_hint)?;
    let corrected = subtract_baseline(position, deflection, &line);
    Ok((line, corrected))
}

pub(crate) fn deflection_span(deflection: &[f64]) -> f64 {
    let (lo, hi) = deflection
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| (lo.min(*d), hi.max(*d)));
    if hi >= lo { hi - lo } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tilted_curve() -> (Vec<f64>, Vec<f64>) {
        let position: Vec<f64> = (0..200).map(|i| i as f64 * 1e-9).collect();
        let deflection: Vec<f64> = position
            .iter()
            .enumerate()
            .map(|(i, x)| {
                let drift = 3e-9 + 0.02 * x;
                let contact = if i >= 150 { 0.5 * (x - 150e-9) } else { 0.0 };
                drift + contact
            })
            .collect();
        (position, deflection)
    }

    #[test]
    fn removes_offset_and_tilt() {
        let (position, deflection) = tilted_curve();
        let config = CorrectionConfig::default();

        let (line, corrected) = correct_baseline(&position, &deflection, &config, None).unwrap();
        assert_eq!(line.samples, 20);
        assert!((line.slope - 0.02).abs() < 1e-9, "slope {}", line.slope);
        assert!((line.intercept - 3e-9).abs() < 1e-15);
        for d in &corrected[..150] {
            assert!(d.abs() < 1e-15, "residual {d}");
        }
        assert!(corrected[199] > 0.0);
    }

    #[test]
    fn repeated_correction_is_idempotent() {
        let (position, deflection) = tilted_curve();
        let config = CorrectionConfig::default();

        let (_, once) = correct_baseline(&position, &deflection, &config, None).unwrap();
        let (_, twice) = correct_baseline(&position, &once, &config, None).unwrap();

        let max_change = once
            .iter()
            .zip(&twice)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(max_change < 1e-15, "max change {max_change}");
    }

    #[test]
    fn contact_hint_shrinks_region() {
        let config = CorrectionConfig::default();
        assert_eq!(baseline_region_len(200, &config, None), 20);
        assert_eq!(baseline_region_len(200, &config, Some(12)), 12);
    }

    #[test]
    fn too_few_samples_is_unstable() {
        let config = CorrectionConfig::default();
        let err = fit_baseline(&[0.0, 1.0, 2.0], &[0.0, 0.0, 1.0], &config, None).unwrap_err();
        assert_eq!(err.code(), "baseline_unstable");
    }

    #[test]
    fn noisy_baseline_is_unstable() {
        let position: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let deflection: Vec<f64> = (0..100)
            .map(|i| {
                let noise = if i % 2 == 0 { 1.0 } else { -1.0 };
                if i < 10 { noise } else { 0.1 * (i - 10) as f64 }
            })
            .collect();
        let config = CorrectionConfig::default();
        let err = fit_baseline(&position, &deflection, &config, None).unwrap_err();
        assert!(matches!(err, FailureReason::BaselineUnstable { .. }));
    }
}
