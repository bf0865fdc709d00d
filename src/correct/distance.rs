//! Piezo position to tip-sample separation.
//!
//! With positions increasing toward the sample and repulsive deflection positive:
//!
//! ```text
//! displacement[i] = position[i] - position[ref]
//! separation[i]   = deflection[i] - displacement[i]
//! indentation[i]  = max(-separation[i], 0)      for i >= contact
//! force[i]        = deflection[i] * k
//! ```
//!
//! `ref` is the contact index, or the first sample when contact is unknown. In
//! that case distances are offsets only and no indentation is reported.

use crate::domain::{BaselineLine, CorrectedCurve};

pub fn convert_distance(
    position: &[f64],
    deflection: Vec<f64>,
    spring_constant: f64,
    contact_index: Option<usize>,
    baseline: BaselineLine,
) -> CorrectedCurve {
    let n = position.len().min(deflection.len());
    let contact_index = contact_index.filter(|&c| c < n);
    let reference_position = match contact_index {
        Some(c) => position[c],
        None => position.first().copied().unwrap_or(0.0),
    };

    let displacement: Vec<f64> = position[..n].iter().map(|p| p - reference_position).collect();
    let separation: Vec<f64> = deflection[..n]
        .iter()
        .zip(&displacement)
        .map(|(d, z)| d - z)
        .collect();
    let force: Vec<f64> = deflection[..n].iter().map(|d| d * spring_constant).collect();
    let indentation: Vec<f64> = separation
        .iter()
        .enumerate()
        .map(|(i, s)| match contact_index {
            Some(c) if i >= c && *s < 0.0 => -s,
            _ => 0.0,
        })
        .collect();

    let mut deflection = deflection;
    deflection.truncate(n);

    CorrectedCurve::new(
        separation,
        force,
        deflection,
        displacement,
        indentation,
        contact_index,
        reference_position,
        baseline,
    )
}
