//! Nonlinear least squares fit of one contact model.
//!
//! Given contact-region samples `(δ_i, F_i)` and a fixed tip radius `R`, we
//! minimise
//!
//! ```text
//! Σ (F_model(δ_i; θ) - F_i)^2
//! ```
//!
//! with Levenberg–Marquardt. Parameters and residuals are rescaled to O(1)
//! (modulus by its initial guess, forces by the RMS force) so the solver's
//! tolerances mean the same thing for nN/MPa data as for unit test data.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{DMatrix, DVector, Dyn, storage::Owned};

use crate::domain::{ContactModel, FailureReason};
use crate::math::fit_line;
use crate::models::{fill_jacobian_row, hertz_shape, initial_modulus, predict};

/// Depth, as a fraction of the deepest sample, at which the initial slope is taken.
const INITIAL_DEPTH_FRACTION: f64 = 0.1;
/// Floor for the normalised SSE inside the BIC logarithm.
const SSE_FLOOR: f64 = 1e-12;

/// Solver settings.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub min_samples: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    /// Evaluation budget multiplier (`patience * (params + 1)` evaluations).
    pub patience: usize,
}

impl FitOptions {
    pub fn with_min_samples(min_samples: usize) -> Self {
        Self {
            min_samples,
            ..Self::default()
        }
    }
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            min_samples: 10,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            patience: 200,
        }
    }
}

/// Best fit for a single model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFit {
    pub model: ContactModel,
    /// `E*` (Pa).
    pub effective_modulus: f64,
    /// Fitted offset for the adhesive variants.
    pub adhesion_force: Option<f64>,
    pub sse: f64,
    pub rms_residual: f64,
    pub rms_force: f64,
    pub bic: f64,
    pub samples: usize,
    pub evaluations: usize,
}

impl ModelFit {
    /// `rms(residual) / rms(force)`.
    pub fn quality_ratio(&self) -> f64 {
        if self.rms_force > 0.0 {
            self.rms_residual / self.rms_force
        } else {
            f64::INFINITY
        }
    }

    pub fn params(&self) -> Vec<f64> {
        match self.adhesion_force {
            Some(f) => vec![self.effective_modulus, f],
            None => vec![self.effective_modulus],
        }
    }
}

struct ContactProblem<'a> {
    model: ContactModel,
    indentation: &'a [f64],
    force: &'a [f64],
    tip_radius: f64,
    modulus_scale: f64,
    force_scale: f64,
    theta: DVector<f64>,
}

impl ContactProblem<'_> {
    fn physical_params(&self) -> Vec<f64> {
        let mut p = vec![self.theta[0] * self.modulus_scale];
        if self.model.is_adhesive() {
            p.push(self.theta[1] * self.force_scale);
        }
        p
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for ContactProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.theta.clone_from(x);
        // E* >= 0
        if self.theta[0] < 0.0 {
            self.theta[0] = 0.0;
        }
    }

    fn params(&self) -> DVector<f64> {
        self.theta.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let params = self.physical_params();
        let r = DVector::from_iterator(
            self.indentation.len(),
            self.indentation
                .iter()
                .zip(self.force)
                .map(|(d, f)| (predict(self.model, *d, &params, self.tip_radius) - f) / self.force_scale),
        );
        if r.iter().all(|v| v.is_finite()) {
            Some(r)
        } else {
            None
        }
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let n = self.indentation.len();
        let p = self.model.param_len();
        let mut jac = DMatrix::<f64>::zeros(n, p);
        let mut row = vec![0.0; p];
        for (i, d) in self.indentation.iter().enumerate() {
            fill_jacobian_row(self.model, *d, self.tip_radius, &mut row);
            jac[(i, 0)] = row[0] * self.modulus_scale / self.force_scale;
            if p > 1 {
                // The offset is scaled by force_scale, so its column is unscaled.
                jac[(i, 1)] = row[1];
            }
        }
        Some(jac)
    }
}

/// Fit `model` to contact samples `(indentation, force)`.
pub fn fit_model(
    model: ContactModel,
    indentation: &[f64],
    force: &[f64],
    tip_radius: f64,
    opts: &FitOptions,
) -> Result<ModelFit, FailureReason> {
    let n = indentation.len().min(force.len());
    let required = opts.min_samples.max(model.param_len() + 1);
    if n < required {
        return Err(FailureReason::InsufficientContactData { found: n, required });
    }
    let (indentation, force) = (&indentation[..n], &force[..n]);

    let rms_force = (force.iter().map(|f| f * f).sum::<f64>() / n as f64).sqrt();
    if !(rms_force > 0.0 && rms_force.is_finite()) {
        return Err(no_converge("contact region carries no force"));
    }

    let modulus_guess = initial_guess(indentation, force, tip_radius)
        .ok_or_else(|| no_converge("no positive force to seed the modulus"))?;

    let mut theta = vec![1.0];
    if model.is_adhesive() {
        let pull = force.iter().copied().fold(0.0_f64, |acc, f| acc.max(-f));
        theta.push(pull / rms_force);
    }

    let problem = ContactProblem {
        model,
        indentation,
        force,
        tip_radius,
        modulus_scale: modulus_guess,
        force_scale: rms_force,
        theta: DVector::from_vec(theta),
    };

    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_patience(opts.patience.max(1));
    let (problem, report) = lm.minimize(problem);

    if !report.termination.was_successful() {
        return Err(no_converge(format!(
            "{} solver stopped: {:?}",
            model.display_name(),
            report.termination
        )));
    }

    let params = problem.physical_params();
    if params.iter().any(|v| !v.is_finite()) {
        return Err(no_converge(format!("{} produced non-finite parameters", model.display_name())));
    }

    let sse: f64 = indentation
        .iter()
        .zip(force)
        .map(|(d, f)| {
            let r = predict(model, *d, &params, tip_radius) - f;
            r * r
        })
        .sum();
    let rms_residual = (sse / n as f64).sqrt();
    let bic = bic(n, sse / (rms_force * rms_force), model.param_len());

    debug!(
        "{} fit: E*={:.4e} rms={:.3e} evals={}",
        model.display_name(),
        params[0],
        rms_residual,
        report.number_of_evaluations
    );

    Ok(ModelFit {
        model,
        effective_modulus: params[0],
        adhesion_force: params.get(1).copied(),
        sse,
        rms_residual,
        rms_force,
        bic,
        samples: n,
        evaluations: report.number_of_evaluations,
    })
}

/// BIC = n ln(SSE/n) + k ln(n).
pub fn bic(n: usize, sse: f64, k: usize) -> f64 {
    let n_f = n as f64;
    let sse_per = (sse / n_f).max(SSE_FLOOR);
    n_f * sse_per.ln() + (k as f64) * n_f.ln()
}

/// Starting `E*` from the local slope at a shallow depth, falling back to the
/// secant through the deepest sample.
fn initial_guess(indentation: &[f64], force: &[f64], tip_radius: f64) -> Option<f64> {
    let max_depth = indentation.iter().copied().fold(0.0_f64, f64::max);
    if !(max_depth > 0.0) {
        return None;
    }
    let depth = INITIAL_DEPTH_FRACTION * max_depth;

    let (xs, ys): (Vec<f64>, Vec<f64>) = indentation
        .iter()
        .zip(force)
        .filter(|(d, _)| **d > 0.0 && **d <= 2.0 * depth)
        .map(|(d, f)| (*d, *f))
        .unzip();
    let local = fit_line(&xs, &ys).map(|line| initial_modulus(line.slope, tip_radius, depth));
    if let Some(e) = local.filter(|e| *e > 0.0 && e.is_finite()) {
        return Some(e);
    }

    let (d_max, f_at_max) = indentation
        .iter()
        .zip(force)
        .fold((0.0, 0.0), |acc, (d, f)| if *d > acc.0 { (*d, *f) } else { acc });
    let shape = hertz_shape(d_max, tip_radius);
    let secant = if shape > 0.0 { f_at_max / shape } else { 0.0 };
    (secant > 0.0 && secant.is_finite()).then_some(secant)
}

fn no_converge(detail: impl Into<String>) -> FailureReason {
    FailureReason::FitDidNotConverge {
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: f64 = 20e-9;

    fn hertz_samples(e_star: f64, adhesion: f64, n: usize) -> (Vec<f64>, Vec<f64>) {
        let indentation: Vec<f64> = (0..n).map(|i| i as f64 * 10e-9 / (n - 1) as f64).collect();
        let force = indentation
            .iter()
            .map(|d| e_star * hertz_shape(*d, R) - adhesion)
            .collect();
        (indentation, force)
    }

    #[test]
    fn hertz_recovers_modulus_on_exact_data() {
        let (d, f) = hertz_samples(2.5e6, 0.0, 200);
        let fit = fit_model(ContactModel::Hertz, &d, &f, R, &FitOptions::default()).unwrap();
        let rel = (fit.effective_modulus - 2.5e6).abs() / 2.5e6;
        assert!(rel < 0.01, "relative error {rel}");
        assert!(fit.quality_ratio() < 1e-3);
        assert_eq!(fit.adhesion_force, None);
        assert_eq!(fit.params().len(), 1);
    }

    #[test]
    fn dmt_recovers_modulus_and_adhesion() {
        let (d, f) = hertz_samples(1.0e6, 2e-9, 150);
        let fit = fit_model(ContactModel::Dmt, &d, &f, R, &FitOptions::default()).unwrap();
        assert!((fit.effective_modulus - 1.0e6).abs() / 1.0e6 < 0.01);
        let adhesion = fit.adhesion_force.unwrap();
        assert!((adhesion - 2e-9).abs() / 2e-9 < 0.01, "adhesion {adhesion}");
        assert_eq!(fit.params(), vec![fit.effective_modulus, adhesion]);
    }

    #[test]
    fn too_few_samples_is_insufficient() {
        let (d, f) = hertz_samples(1.0e6, 0.0, 6);
        let err = fit_model(ContactModel::Hertz, &d, &f, R, &FitOptions::default()).unwrap_err();
        assert_eq!(
            err,
            FailureReason::InsufficientContactData {
                found: 6,
                required: 10
            }
        );
    }

    #[test]
    fn zero_force_does_not_converge() {
        let d: Vec<f64> = (0..20).map(|i| i as f64 * 1e-9).collect();
        let f = vec![0.0; 20];
        let err = fit_model(ContactModel::Hertz, &d, &f, R, &FitOptions::default()).unwrap_err();
        assert_eq!(err.code(), "fit_did_not_converge");
    }

    #[test]
    fn bic_penalises_parameters() {
        assert!(bic(100, 1.0, 1) < bic(100, 1.0, 2));
    }
}
