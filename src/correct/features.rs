//! Model-free per-curve features.
//!
//! These feed the non-mechanical channels of a force volume (topography,
//! attraction, raw baseline) and only need a corrected curve.

use serde::Serialize;

use crate::domain::{Channel, CorrectedCurve};
use crate::math::trapezoid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveFeatures {
    /// Raw piezo position at contact (topography).
    pub contact_height: Option<f64>,
    pub max_deflection: f64,
    /// Displacement at which `max_deflection` occurs.
    pub piezo_at_max_deflection: f64,
    /// Most negative deflection before contact (whole curve when unreferenced).
    pub deflection_attractive: f64,
    /// `max(-min force before contact, 0)`.
    pub attractive_force: f64,
    /// Integral of deflection over displacement across the attractive dip.
    pub attractive_area: Option<f64>,
    /// Displacement extent of the attractive dip.
    pub attractive_length: Option<f64>,
    pub raw_offset: f64,
    pub raw_stiffness: f64,
    /// Force drops somewhere after contact by more than the noise level.
    pub has_artifacts: bool,
}

impl CurveFeatures {
    pub fn from_curve(curve: &CorrectedCurve, noise_factor: f64) -> Self {
        let deflection = curve.deflection();
        let force = curve.force();
        let displacement = curve.displacement();
        let n = curve.len();
        let pre = curve.contact_index().unwrap_or(n).min(n);

        let (max_idx, max_deflection) = deflection
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, d)| if d > best.1 { (i, d) } else { best });
        let piezo_at_max_deflection = displacement.get(max_idx).copied().unwrap_or(0.0);

        let attractive_region = if pre > 0 { &deflection[..pre] } else { deflection };
        let deflection_attractive = attractive_region.iter().copied().fold(f64::INFINITY, f64::min);
        let attractive_force = force[..pre]
            .iter()
            .copied()
            .fold(0.0_f64, |acc, f| acc.max(-f));

        let (attractive_area, attractive_length) = match curve.contact_index() {
            Some(c) if c > 0 => {
                // Last strictly positive sample before contact bounds the dip.
                let start = deflection[..c].iter().rposition(|d| *d > 0.0).unwrap_or(0);
                let area = trapezoid(&displacement[start..=c], &deflection[start..=c]);
                let length = (displacement[c] - displacement[start]).abs();
                (Some(area), Some(length))
            }
            _ => (None, None),
        };

        let has_artifacts = match curve.contact_index() {
            Some(c) => {
                let tol = noise_factor * curve.baseline().rms * spring_ratio(curve);
                force[c..].windows(2).any(|w| w[1] - w[0] < -tol)
            }
            None => false,
        };

        Self {
            contact_height: curve.contact_index().map(|_| curve.reference_position()),
            max_deflection: if max_deflection.is_finite() { max_deflection } else { 0.0 },
            piezo_at_max_deflection,
            deflection_attractive: if deflection_attractive.is_finite() {
                deflection_attractive
            } else {
                0.0
            },
            attractive_force,
            attractive_area,
            attractive_length,
            raw_offset: curve.baseline().intercept,
            raw_stiffness: curve.baseline().slope,
            has_artifacts,
        }
    }

    /// Value of a model-free channel, `None` for channels this struct does not carry.
    pub fn channel_value(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::ContactHeight => self.contact_height,
            Channel::MaxDeflection => Some(self.max_deflection),
            Channel::AttractiveArea => self.attractive_area,
            Channel::DeflectionAttractive => Some(self.deflection_attractive),
            Channel::RawOffset => Some(self.raw_offset),
            Channel::RawStiffness => Some(self.raw_stiffness),
            Channel::Modulus | Channel::Adhesion | Channel::Stiffness => None,
        }
    }
}

/// Force per unit deflection, recovered from the curve itself.
fn spring_ratio(curve: &CorrectedCurve) -> f64 {
    curve
        .deflection()
        .iter()
        .zip(curve.force())
        .find(|(d, _)| d.abs() > 0.0)
        .map(|(d, f)| f / d)
        .unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::distance::convert_distance;
    use crate::domain::BaselineLine;

    fn baseline() -> BaselineLine {
        BaselineLine {
            slope: 0.01,
            intercept: -2.0,
            rms: 0.0,
            samples: 5,
        }
    }

    fn dipped_curve() -> CorrectedCurve {
        let position: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let deflection: Vec<f64> = position
            .iter()
            .map(|&x| {
                if (10.0..=14.0).contains(&x) {
                    -(2.0 - (x - 12.0).abs())
                } else if x > 20.0 {
                    0.5 * (x - 20.0)
                } else {
                    0.0
                }
            })
            .collect();
        convert_distance(&position, deflection, 2.0, Some(20), baseline())
    }

    #[test]
    fn dip_and_topography() {
        let features = CurveFeatures::from_curve(&dipped_curve(), 3.0);
        assert_eq!(features.contact_height, Some(20.0));
        assert_eq!(features.deflection_attractive, -2.0);
        assert_eq!(features.attractive_force, 4.0);
        assert_eq!(features.max_deflection, 4.5);
        assert_eq!(features.piezo_at_max_deflection, 9.0);
        // Triangle of base 4 and depth 2.
        assert!((features.attractive_area.unwrap() + 4.0).abs() < 1e-12);
        assert_eq!(features.raw_offset, -2.0);
        assert_eq!(features.raw_stiffness, 0.01);
        assert!(!features.has_artifacts);
    }

    #[test]
    fn drop_after_contact_is_an_artifact() {
        let position: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let deflection = vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.5, 3.0, 4.0];
        let curve = convert_distance(&position, deflection, 1.0, Some(4), baseline());
        assert!(CurveFeatures::from_curve(&curve, 3.0).has_artifacts);
    }

    #[test]
    fn unreferenced_curve_has_no_topography() {
        let position = vec![0.0, 1.0, 2.0];
        let curve = convert_distance(&position, vec![0.0, -1.0, 3.0], 1.0, None, baseline());
        let features = CurveFeatures::from_curve(&curve, 3.0);
        assert_eq!(features.contact_height, None);
        assert_eq!(features.attractive_area, None);
        assert_eq!(features.channel_value(Channel::MaxDeflection), Some(3.0));
    }
}
