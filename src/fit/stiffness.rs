//! Model-free stiffness at a reference depth.
//!
//! Stiffness is the local slope of force against piezo travel past contact,
//! taken from a small line fit centred on the first sample that reaches the
//! reference depth. It does not depend on any model fit.

use crate::domain::{CorrectedCurve, CorrectionConfig};
use crate::math::fit_line;

/// Smallest half-width of the local fit window (samples).
const MIN_HALF_WINDOW: usize = 2;

/// Local `dF/dz` at the reference indentation, or `None` without a contact.
pub fn local_stiffness(curve: &CorrectedCurve, config: &CorrectionConfig) -> Option<f64> {
    let c = curve.contact_index()?;
    let n = curve.len();
    if c + 1 >= n {
        return None;
    }

    let indentation = &curve.indentation()[c..];
    let displacement = &curve.displacement()[c..];
    let max_indentation = indentation.iter().copied().fold(0.0_f64, f64::max);

    // Indentation when the sample yields, nominal travel on a rigid one.
    let depth = if max_indentation > 0.0 { indentation } else { displacement };
    let max_depth = depth.iter().copied().fold(0.0_f64, f64::max);
    if !(max_depth > 0.0) {
        return None;
    }
    let reference = config
        .reference_indentation
        .unwrap_or(config.reference_fraction * max_depth);

    let at = depth.iter().position(|d| *d >= reference)? + c;

    let half = MIN_HALF_WINDOW.max(config.min_contact_samples / 2);
    let lo = at.saturating_sub(half).max(c);
    let hi = (at + half + 1).min(n);
    let line = fit_line(&curve.displacement()[lo..hi], &curve.force()[lo..hi])?;
    Some(line.slope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::distance::convert_distance;
    use crate::domain::BaselineLine;

    fn line() -> BaselineLine {
        BaselineLine {
            slope: 0.0,
            intercept: 0.0,
            rms: 0.0,
            samples: 10,
        }
    }

    #[test]
    fn linear_contact_gives_its_slope() {
        let position: Vec<f64> = (0..100).map(|i| i as f64).collect();
        // Deflection takes 25% of travel; k = 4 so dF/dz = 1.
        let deflection: Vec<f64> = position.iter().map(|x| 0.25 * (x - 40.0).max(0.0)).collect();
        let curve = convert_distance(&position, deflection, 4.0, Some(40), line());

        let s = local_stiffness(&curve, &CorrectionConfig::default()).unwrap();
        assert!((s - 1.0).abs() < 1e-12, "stiffness {s}");
    }

    #[test]
    fn evaluated_at_reference_depth() {
        // Force grows quadratically with travel past contact, so the slope reveals
        // where it was taken.
        let position: Vec<f64> = (0..201).map(|i| i as f64 * 0.01).collect();
        let deflection: Vec<f64> = position.iter().map(|x| 0.1 * (x - 1.0).max(0.0).powi(2)).collect();
        let curve = convert_distance(&position, deflection, 1.0, Some(100), line());

        let config = CorrectionConfig {
            reference_indentation: Some(0.5),
            ..CorrectionConfig::default()
        };
        let s = local_stiffness(&curve, &config).unwrap();
        // Indentation reaches 0.5 near travel ≈ 0.53, where the slope is ≈ 0.106.
        assert!(s > 0.09 && s < 0.12, "stiffness {s}");
    }

    #[test]
    fn no_contact_no_stiffness() {
        let position: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let curve = convert_distance(&position, vec![0.0; 10], 1.0, None, line());
        assert_eq!(local_stiffness(&curve, &CorrectionConfig::default()), None);
    }
}
