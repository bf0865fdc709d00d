//! Force-indentation laws for Hertz / DMT / JKR.
//!
//! The fitter relies on two primitive operations:
//! - predict `F(δ)` given the fitted parameters
//! - fill a Jacobian row `∂F/∂θ` for one sample
//!
//! Parameters are `[E*]` for Hertz and `[E*, F_adh]` for the adhesive variants.
//! All three share the spherical indenter power law
//!
//! ```text
//! F = (4/3) E* √R δ^1.5  [- F_adh]
//! ```
//!
//! and differ only in how the fitted adhesion offset is interpreted afterwards.

use std::f64::consts::PI;

use crate::domain::ContactModel;

/// Geometric factor `(4/3) √R δ^1.5`.
pub fn hertz_shape(indentation: f64, tip_radius: f64) -> f64 {
    let d = indentation.max(0.0);
    4.0 / 3.0 * tip_radius.sqrt() * d * d.sqrt()
}

/// Predict the force at `indentation`.
///
/// # Panics
/// Panics if `params` is shorter than `model.param_len()`.
pub fn predict(model: ContactModel, indentation: f64, params: &[f64], tip_radius: f64) -> f64 {
    let elastic = params[0] * hertz_shape(indentation, tip_radius);
    match model {
        ContactModel::Hertz => elastic,
        ContactModel::Dmt | ContactModel::Jkr => elastic - params[1],
    }
}

/// Fill the Jacobian row of `predict` with respect to the parameters.
///
/// # Panics
/// Panics if `out` does not have length `model.param_len()`.
pub fn fill_jacobian_row(model: ContactModel, indentation: f64, tip_radius: f64, out: &mut [f64]) {
    out[0] = hertz_shape(indentation, tip_radius);
    match model {
        ContactModel::Hertz => {}
        ContactModel::Dmt | ContactModel::Jkr => out[1] = -1.0,
    }
}

/// Thermodynamic work of adhesion implied by an adhesion force.
pub fn work_of_adhesion(model: ContactModel, adhesion_force: f64, tip_radius: f64) -> Option<f64> {
    match model {
        ContactModel::Hertz => None,
        ContactModel::Dmt => Some(adhesion_force / (2.0 * PI * tip_radius)),
        ContactModel::Jkr => Some(adhesion_force / (1.5 * PI * tip_radius)),
    }
}

/// Initial `E*` from the local contact slope at a small depth `δ0`.
///
/// Differentiating the power law gives `dF/dδ = 2 E* √(R δ)`.
pub fn initial_modulus(slope: f64, tip_radius: f64, depth: f64) -> f64 {
    let denom = 2.0 * (tip_radius * depth).sqrt();
    if denom > 0.0 && slope.is_finite() {
        (slope / denom).max(0.0)
    } else {
        0.0
    }
}
