//! Contact point location on a baseline-corrected approach curve.
//!
//! Two methods are available:
//!
//! - two-line: intersect the baseline line with a line fitted to the widest
//!   acceptable trailing window of the contact region, then settle on the last
//!   zero crossing at or before that intersection
//! - zero-crossing: take the last sample at noise level after which deflection
//!   stays above it
//!
//! Both are deterministic: the same inputs and thresholds give the same index.

use log::debug;

use crate::correct::baseline::deflection_span;
use crate::domain::{BaselineLine, ContactPointMethod, CorrectionConfig, FailureReason};
use crate::math::{LineFit, fit_line, trailing_line_fits};

/// Smallest trailing window the two-line scan will fit.
pub const MIN_CONTACT_WINDOW: usize = 5;

/// A located contact point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEstimate {
    /// Sample closest to `position`.
    pub index: usize,
    /// Interpolated contact position (raw position units).
    pub position: f64,
    /// Contact-region line of the two-line method.
    pub contact_line: Option<LineFit>,
    /// First sample of the accepted contact window.
    pub window_start: Option<usize>,
}

/// Residual limit for a contact window, and the noise level for zero-crossing.
pub fn noise_threshold(deflection: &[f64], baseline: &BaselineLine, config: &CorrectionConfig) -> f64 {
    let span = deflection_span(deflection);
    (config.contact_noise_factor * baseline.rms).max(config.contact_residual_floor * span)
}

/// Locate the contact point with the configured method.
pub fn locate_contact(
    position: &[f64],
    deflection: &[f64],
    baseline: &BaselineLine,
    config: &CorrectionConfig,
) -> Result<ContactEstimate, FailureReason> {
    if deflection_span(deflection) <= 0.0 {
        return Err(not_found("deflection is flat"));
    }
    match config.contact_method {
        ContactPointMethod::TwoLine => two_line(position, deflection, baseline, config),
        ContactPointMethod::ZeroCrossing => zero_crossing(position, deflection, baseline, config),
    }
}

fn two_line(
    position: &[f64],
    deflection: &[f64],
    baseline: &BaselineLine,
    config: &CorrectionConfig,
) -> Result<ContactEstimate, FailureReason> {
    let n = position.len().min(deflection.len());
    let region = baseline.samples.min(n);

    // 1) Non-contact line on the corrected deflection.
    let free = fit_line(&position[..region], &deflection[..region])
        .ok_or_else(|| not_found("non-contact line is degenerate"))?;

    // 2) Widest trailing window in the run of accepted windows next to the end.
    // A window must start above the noise, and may curve by a small fraction of
    // its own rise.
    let noise = noise_threshold(deflection, baseline, config);
    let last = position[n - 1];
    let accepts = |start: usize, line: &LineFit| {
        let rise = line.slope.abs() * (last - position[start]).abs();
        line.slope >= config.contact_slope_threshold
            && deflection[start] > noise
            && line.rms <= noise.max(config.contact_linearity * rise)
    };

    let windows = trailing_line_fits(&position[region..n], &deflection[region..n], MIN_CONTACT_WINDOW);
    let mut chosen: Option<(usize, LineFit)> = None;
    for (start, line) in windows {
        let start = start + region;
        if accepts(start, &line) {
            chosen = Some((start, line));
        } else if chosen.is_some() {
            break;
        }
    }
    let Some((window_start, contact)) = chosen else {
        return Err(not_found(format!(
            "no trailing window has slope >= {} with residual <= {noise:.3e}",
            config.contact_slope_threshold
        )));
    };

    // 3) Intersection of the two lines.
    let dslope = contact.slope - free.slope;
    if !(dslope.abs() > f64::EPSILON * contact.slope.abs().max(1.0)) {
        return Err(not_found("contact and non-contact lines are parallel"));
    }
    let x = (free.intercept - contact.intercept) / dslope;
    let (lo, hi) = position_range(&position[..n]);
    if !x.is_finite() || x < lo || x > hi {
        return Err(not_found(format!(
            "intersection {x:.4e} lies outside [{lo:.4e}, {hi:.4e}]"
        )));
    }

    // 4) A curved contact region puts the intersection past the point where the
    // deflection leaves zero.
    let x = settle_on_zero_crossing(&position[..n], &deflection[..n], closest_index(&position[..n], x))
        .unwrap_or(x);

    let index = closest_index(&position[..n], x);
    debug!("two-line contact at index {index} (window from {window_start})");
    Ok(ContactEstimate {
        index,
        position: x,
        contact_line: Some(contact),
        window_start: Some(window_start),
    })
}

fn zero_crossing(
    position: &[f64],
    deflection: &[f64],
    baseline: &BaselineLine,
    config: &CorrectionConfig,
) -> Result<ContactEstimate, FailureReason> {
    let n = position.len().min(deflection.len());
    let region = baseline.samples.min(n);
    let level = noise_threshold(deflection, baseline, config);

    let Some(last) = (region..n).rev().find(|&i| deflection[i] <= level) else {
        return Err(not_found("deflection never returns to the noise level after the baseline"));
    };
    if last + 1 >= n {
        return Err(not_found("deflection does not rise above the noise level"));
    }

    let (d0, d1) = (deflection[last], deflection[last + 1]);
    let (p0, p1) = (position[last], position[last + 1]);
    let x = if d0 <= 0.0 && d1 > 0.0 {
        p0 + (p1 - p0) * (-d0) / (d1 - d0)
    } else {
        p0
    };

    let index = closest_index(&position[..n], x);
    debug!("zero-crossing contact at index {index}");
    Ok(ContactEstimate {
        index,
        position: x,
        contact_line: None,
        window_start: None,
    })
}

/// Position of the last non-positive sample at or before `upto`, interpolated
/// to zero when the next sample is repulsive.
fn settle_on_zero_crossing(position: &[f64], deflection: &[f64], upto: usize) -> Option<f64> {
    let n = position.len().min(deflection.len());
    let last = (0..=upto.min(n.checked_sub(1)?)).rev().find(|&i| deflection[i] <= 0.0)?;
    if last + 1 >= n {
        return Some(position[last]);
    }
    let (d0, d1) = (deflection[last], deflection[last + 1]);
    let (p0, p1) = (position[last], position[last + 1]);
    if d1 > 0.0 {
        Some(p0 + (p1 - p0) * (-d0) / (d1 - d0))
    } else {
        Some(p0)
    }
}

fn position_range(position: &[f64]) -> (f64, f64) {
    position
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(*p), hi.max(*p)))
}

/// Index of the sample closest to `x`; the smallest index wins a tie.
fn closest_index(position: &[f64], x: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, p) in position.iter().enumerate() {
        let dist = (p - x).abs();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

fn not_found(detail: impl Into<String>) -> FailureReason {
    FailureReason::ContactPointNotFound {
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::baseline::correct_baseline;

    fn piecewise(n: usize, contact: usize, slope: f64) -> (Vec<f64>, Vec<f64>) {
        let position: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let deflection = position
            .iter()
            .map(|x| (x - contact as f64).max(0.0) * slope)
            .collect();
        (position, deflection)
    }

    fn locate(position: &[f64], deflection: &[f64], config: &CorrectionConfig) -> Result<ContactEstimate, FailureReason> {
        let (line, corrected) = correct_baseline(position, deflection, config, None).unwrap();
        locate_contact(position, &corrected, &line, config)
    }

    #[test]
    fn two_line_recovers_exact_index() {
        let (position, deflection) = piecewise(500, 321, 0.8);
        let config = CorrectionConfig::default();
        let found = locate(&position, &deflection, &config).unwrap();
        assert_eq!(found.index, 321);
        assert!((found.position - 321.0).abs() < 1e-6);
        // The window starts at the first sample above the noise.
        assert_eq!(found.window_start, Some(322));
    }

    #[test]
    fn curved_contact_region_settles_on_departure_from_zero() {
        let position: Vec<f64> = (0..500).map(|i| i as f64).collect();
        let deflection: Vec<f64> = position
            .iter()
            .map(|x| 100.0 * ((x - 300.0).max(0.0) / 200.0).powf(1.5))
            .collect();
        let config = CorrectionConfig::default();
        let found = locate(&position, &deflection, &config).unwrap();
        assert_eq!(found.index, 300);
        let line = found.contact_line.unwrap();
        let x_line = -line.intercept / line.slope;
        assert!(x_line > 300.0, "contact line crosses zero at {x_line}");

        // A strict linearity limit leaves no window on the curved region.
        let strict = CorrectionConfig {
            contact_linearity: 1e-9,
            ..CorrectionConfig::default()
        };
        assert!(locate(&position, &deflection, &strict).is_err());
    }

    #[test]
    fn zero_crossing_recovers_exact_index() {
        let (position, deflection) = piecewise(500, 321, 0.8);
        let config = CorrectionConfig {
            contact_method: ContactPointMethod::ZeroCrossing,
            ..CorrectionConfig::default()
        };
        let found = locate(&position, &deflection, &config).unwrap();
        assert_eq!(found.index, 321);
    }

    #[test]
    fn prefers_contact_region_nearest_the_end() {
        // An attractive dip before firm contact must not pull the contact back.
        let n = 600;
        let position: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let deflection: Vec<f64> = position
            .iter()
            .map(|&x| {
                if (200.0..220.0).contains(&x) {
                    -(x - 200.0) * 0.5
                } else if x >= 400.0 {
                    (x - 400.0) * 1.2
                } else {
                    0.0
                }
            })
            .collect();
        let config = CorrectionConfig::default();
        let found = locate(&position, &deflection, &config).unwrap();
        assert_eq!(found.index, 400);
    }

    #[test]
    fn shallow_curve_has_no_contact() {
        let (position, deflection) = piecewise(300, 150, 0.01);
        let config = CorrectionConfig::default();
        let err = locate(&position, &deflection, &config).unwrap_err();
        assert_eq!(err.code(), "contact_point_not_found");
    }

    #[test]
    fn flat_curve_has_no_contact() {
        let position: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let deflection = vec![0.0; 100];
        let config = CorrectionConfig::default();
        assert!(locate(&position, &deflection, &config).is_err());
    }

    #[test]
    fn intersection_outside_range_is_rejected() {
        // Contact region extrapolates back to a point before the first sample.
        let position: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let baseline = BaselineLine { slope: 0.0, intercept: 0.0, rms: 0.0, samples: 10 };
        let mut deflection = vec![0.0; 100];
        for (i, d) in deflection.iter_mut().enumerate().skip(10) {
            *d = 50.0 + i as f64;
        }
        let config = CorrectionConfig::default();
        let err = locate_contact(&position, &deflection, &baseline, &config).unwrap_err();
        assert!(err.to_string().contains("outside"), "{err}");
    }

    #[test]
    fn closest_index_prefers_smaller_on_tie() {
        assert_eq!(closest_index(&[0.0, 1.0, 2.0], 0.5), 0);
        assert_eq!(closest_index(&[0.0, 1.0, 2.0], 1.6), 2);
    }
}
