//! Synthetic force-distance curves and force volumes.
//!
//! Curves follow a spherical Hertz contact on a cantilever of stiffness `k`.
//! Past the contact position the piezo travel `Δz` splits into cantilever
//! deflection `d` and indentation `δ = Δz - d` such that
//!
//! ```text
//! k d = (4/3) E* √R δ^1.5
//! ```
//!
//! which is solved per sample by bisection. A tilted/offset baseline, an
//! adhesion dip and Gaussian deflection noise can be layered on top.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{BatchItem, CurveMetadata, GridPosition, RawCurve, Segment};
use crate::error::AppError;

const BISECTION_STEPS: usize = 200;

/// Cantilever deflection for piezo travel `travel` past contact.
pub fn hertz_deflection(travel: f64, e_star: f64, tip_radius: f64, spring_constant: f64) -> f64 {
    if !(travel > 0.0) {
        return 0.0;
    }
    let c = 4.0 / 3.0 * e_star * tip_radius.sqrt();
    // g(d) = k d - c (Δz - d)^1.5 is increasing in d, negative at 0, positive at Δz.
    let g = |d: f64| {
        let delta = (travel - d).max(0.0);
        spring_constant * d - c * delta * delta.sqrt()
    };
    let (mut lo, mut hi) = (0.0, travel);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if g(mid) > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
        if hi - lo <= f64::EPSILON * travel {
            break;
        }
    }
    0.5 * (lo + hi)
}

/// Parameters of one synthetic approach/retract pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticCurve {
    pub samples: usize,
    /// Total piezo travel (m).
    pub travel: f64,
    /// Contact position as a fraction of `travel`.
    pub contact_at: f64,
    pub e_star: f64,
    pub tip_radius: f64,
    pub spring_constant: f64,
    pub poisson_ratio: Option<f64>,
    /// Standard deviation of deflection noise (m).
    pub noise: f64,
    pub baseline_slope: f64,
    pub baseline_offset: f64,
    /// Adhesion force (N). Shows as a dip before contact on the approach and as
    /// the pull-off on the retract.
    pub adhesion_force: f64,
    /// Extent of the adhesion dip (m).
    pub adhesion_range: f64,
    pub seed: u64,
}

impl Default for SyntheticCurve {
    fn default() -> Self {
        Self {
            samples: 1000,
            travel: 500e-9,
            contact_at: 0.5,
            e_star: 1e6,
            tip_radius: 20e-9,
            spring_constant: 0.1,
            poisson_ratio: None,
            noise: 0.0,
            baseline_slope: 0.0,
            baseline_offset: 0.0,
            adhesion_force: 0.0,
            adhesion_range: 5e-9,
            seed: 0,
        }
    }
}

impl SyntheticCurve {
    pub fn metadata(&self) -> CurveMetadata {
        CurveMetadata {
            spring_constant: self.spring_constant,
            deflection_sensitivity: None,
            tip_radius: Some(self.tip_radius),
            poisson_ratio: self.poisson_ratio,
            load_cycle: None,
        }
    }

    fn positions(&self) -> Vec<f64> {
        crate::math::linspace(0.0, self.travel, self.samples)
    }

    fn contact_position(&self) -> f64 {
        self.contact_at * self.travel
    }

    fn interaction(&self, z: f64, retract: bool) -> f64 {
        let zc = self.contact_position();
        let dip = -self.adhesion_force / self.spring_constant;
        if z > zc {
            hertz_deflection(z - zc, self.e_star, self.tip_radius, self.spring_constant)
        } else if self.adhesion_force > 0.0 && zc - z < self.adhesion_range {
            // On the way back the tip stays stuck until the pull-off point.
            if retract {
                dip
            } else {
                dip * (1.0 - (zc - z) / self.adhesion_range)
            }
        } else {
            0.0
        }
    }

    fn build(&self, segment: Segment, seed: u64) -> Result<RawCurve, AppError> {
        if self.samples < 2 {
            return Err(AppError::config("Synthetic curves need at least 2 samples."));
        }
        if !(self.spring_constant > 0.0 && self.travel > 0.0) {
            return Err(AppError::config("Synthetic spring constant and travel must be > 0."));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, self.noise.max(0.0))
            .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

        let retract = segment == Segment::Retract;
        let mut position = self.positions();
        if retract {
            position.reverse();
        }
        let deflection: Vec<f64> = position
            .iter()
            .map(|&z| {
                let noise = if self.noise > 0.0 { normal.sample(&mut rng) } else { 0.0 };
                self.baseline_offset + self.baseline_slope * z + self.interaction(z, retract) + noise
            })
            .collect();

        RawCurve::new(segment, position, deflection, self.metadata())
    }

    pub fn approach(&self) -> Result<RawCurve, AppError> {
        self.build(Segment::Approach, self.seed)
    }

    /// Retract segment, positions ordered as recorded (away from the sample).
    pub fn retract(&self) -> Result<RawCurve, AppError> {
        self.build(Segment::Retract, self.seed.wrapping_add(1))
    }
}

/// A `rows x cols` force volume with varying stiffness and topography.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticGrid {
    pub rows: usize,
    pub cols: usize,
    pub curve: SyntheticCurve,
    /// Relative standard deviation of `E*` between pixels.
    pub modulus_spread: f64,
    /// Peak-to-peak variation of the contact fraction across the grid.
    pub height_amplitude: f64,
    pub with_retract: bool,
    pub seed: u64,
}

impl SyntheticGrid {
    pub fn generate(&self) -> Result<Vec<BatchItem>, AppError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(AppError::config("Synthetic grid must have at least one row and column."));
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

        let mut items = Vec::with_capacity(self.rows * self.cols);
        for row in 0..self.rows {
            for col in 0..self.cols {
                let z: f64 = normal.sample(&mut rng);
                let factor = (1.0 + self.modulus_spread * z).max(0.1);
                let phase = (row as f64 / self.rows as f64 + col as f64 / self.cols as f64)
                    * std::f64::consts::PI;
                let curve = SyntheticCurve {
                    e_star: self.curve.e_star * factor,
                    contact_at: (self.curve.contact_at + 0.5 * self.height_amplitude * phase.sin())
                        .clamp(0.2, 0.9),
                    seed: self
                        .seed
                        .wrapping_mul(1_000_003)
                        .wrapping_add((row * self.cols + col) as u64 * 2),
                    ..self.curve.clone()
                };
                let retract = if self.with_retract {
                    Some(curve.retract()?)
                } else {
                    None
                };
                items.push(BatchItem {
                    position: GridPosition::new(row, col),
                    approach: curve.approach()?,
                    retract,
                });
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hertz_shape;

    #[test]
    fn deflection_balances_contact_force() {
        let (e, r, k) = (1.5e6, 15e-9, 0.05);
        let travel = 80e-9;
        let d = hertz_deflection(travel, e, r, k);
        let elastic = e * hertz_shape(travel - d, r);
        assert!((k * d - elastic).abs() < 1e-9 * k * d, "k d = {}, F = {elastic}", k * d);
    }

    #[test]
    fn approach_is_flat_before_contact() {
        let curve = SyntheticCurve::default().approach().unwrap();
        assert_eq!(curve.len(), 1000);
        assert!(curve.deflection()[..499].iter().all(|d| *d == 0.0));
        assert!(curve.deflection()[999] > 0.0);
    }

    #[test]
    fn retract_shows_pull_off_dip() {
        let synth = SyntheticCurve {
            adhesion_force: 1e-9,
            ..SyntheticCurve::default()
        };
        let retract = synth.retract().unwrap();
        let min = retract.deflection().iter().copied().fold(f64::INFINITY, f64::min);
        assert!((min + 1e-9 / synth.spring_constant).abs() < 1e-18);
        assert!(retract.position()[0] > retract.position()[1]);
    }

    #[test]
    fn noise_is_reproducible_per_seed() {
        let synth = SyntheticCurve {
            noise: 1e-10,
            seed: 7,
            ..SyntheticCurve::default()
        };
        assert_eq!(synth.approach().unwrap(), synth.approach().unwrap());
        let other = SyntheticCurve { seed: 8, ..synth.clone() };
        assert_ne!(synth.approach().unwrap(), other.approach().unwrap());
    }

    #[test]
    fn grid_is_row_major() {
        let grid = SyntheticGrid {
            rows: 2,
            cols: 3,
            curve: SyntheticCurve {
                samples: 100,
                ..SyntheticCurve::default()
            },
            modulus_spread: 0.1,
            height_amplitude: 0.1,
            with_retract: true,
            seed: 1,
        };
        let items = grid.generate().unwrap();
        assert_eq!(items.len(), 6);
        assert_eq!(items[4].position, GridPosition::new(1, 1));
        assert!(items.iter().all(|i| i.retract.is_some()));
    }
}
