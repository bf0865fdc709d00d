//! Model selection (Hertz vs DMT) using BIC.
//!
//! The tool fits each requested model and computes
//! `BIC = n * ln(SSE/n) + k * ln(n)` on force-normalised residuals.
//!
//! Selection rules:
//! 1. A single explicitly requested model is always the result
//! 2. Otherwise choose the model with minimum BIC
//! 3. If ΔBIC < 2 between the best and a simpler model, pick the simpler model

use log::debug;

use crate::domain::{ContactModel, FailureReason, ModelSpec};
use crate::fit::fitter::{FitOptions, ModelFit, fit_model};

/// Output of fitting + selection.
#[derive(Debug, Clone)]
pub struct FitSelection {
    pub best: ModelFit,
    /// Fits for all models that converged.
    pub fits: Vec<ModelFit>,
    /// Models that failed and why (for diagnostics).
    pub skipped: Vec<(ContactModel, FailureReason)>,
}

/// Fit the models named by `spec` and select the best one.
pub fn fit_and_select(
    spec: ModelSpec,
    indentation: &[f64],
    force: &[f64],
    tip_radius: f64,
    opts: &FitOptions,
) -> Result<FitSelection, FailureReason> {
    let candidates = spec.candidates();
    if candidates.is_empty() {
        return Err(FailureReason::FitDidNotConverge {
            detail: "no contact model requested".to_string(),
        });
    }

    let mut fits = Vec::new();
    let mut skipped = Vec::new();
    for &model in candidates {
        match fit_model(model, indentation, force, tip_radius, opts) {
            Ok(fit) => fits.push(fit),
            Err(reason) => {
                debug!("{} skipped: {reason}", model.display_name());
                skipped.push((model, reason));
            }
        }
    }

    if fits.is_empty() {
        // Report the simplest model's failure.
        let (_, reason) = skipped.swap_remove(0);
        return Err(reason);
    }

    let best = if candidates.len() == 1 {
        fits[0].clone()
    } else {
        select_by_bic(&fits)
    };

    Ok(FitSelection {
        best,
        fits,
        skipped,
    })
}

fn select_by_bic(fits: &[ModelFit]) -> ModelFit {
    // Find minimum BIC.
    let mut best = &fits[0];
    for f in &fits[1..] {
        if f.bic < best.bic {
            best = f;
        }
    }

    let best_bic = best.bic;

    // Prefer simplicity if within 2 BIC points.
    //
    // We iterate in order of increasing complexity and pick the first fit that
    // is "close enough" to the best.
    let order = [ContactModel::Hertz, ContactModel::Dmt, ContactModel::Jkr];
    for kind in order {
        if let Some(f) = fits.iter().find(|f| f.model == kind) {
            if f.bic < best_bic + 2.0 {
                return f.clone();
            }
        }
    }

    best.clone()
}
