//! Single-curve correction pipeline.
//!
//! ```text
//! Raw -> BaselineCorrected -> ContactLocated -> DistanceConverted -> ModelFitted -> Done
//! ```
//!
//! Any stage may end the run with `Failed(reason)`. The pipeline never returns
//! an error: it always produces a `CurveResult`, carrying whatever corrected
//! curve was computed before the failing stage.

use log::debug;

use crate::correct::baseline::{correct_baseline, subtract_baseline};
use crate::correct::contact::locate_contact;
use crate::correct::distance::convert_distance;
use crate::domain::{
    AdhesionSource, Confidence, CorrectedCurve, CorrectionConfig, CurveResult, FailureReason,
    FitResult, RawCurve,
};
use crate::fit::{FitOptions, fit_and_select, local_stiffness};
use crate::models::work_of_adhesion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Raw,
    BaselineCorrected,
    ContactLocated,
    DistanceConverted,
    ModelFitted,
    Done,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::BaselineCorrected => "baseline-corrected",
            Stage::ContactLocated => "contact-located",
            Stage::DistanceConverted => "distance-converted",
            Stage::ModelFitted => "model-fitted",
            Stage::Done => "done",
        }
    }
}

/// Correct one approach curve and fit the configured contact model.
///
/// `retract`, when present, only contributes the measured pull-off force.
///
/// A fitting model with no tip radius in the metadata ends as
/// `FitDidNotConverge` after distance conversion, keeping the curve and its
/// stiffness. Batch runs reject that metadata before any curve is processed.
pub fn correct_curve(
    approach: &RawCurve,
    retract: Option<&RawCurve>,
    config: &CorrectionConfig,
) -> CurveResult {
    let meta = approach.metadata();
    let k = meta.spring_constant;
    let position = approach.position();
    let deflection = approach.deflection_length();

    // Raw -> BaselineCorrected
    let (mut baseline, mut corrected) = match correct_baseline(position, &deflection, config, None) {
        Ok(v) => v,
        Err(reason) => return fail(Stage::Raw, reason, None, None),
    };

    // BaselineCorrected -> ContactLocated
    let mut contact = match locate_contact(position, &corrected, &baseline, config) {
        Ok(c) => c,
        Err(reason) => {
            let curve = convert_distance(position, corrected, k, None, baseline);
            return fail(Stage::BaselineCorrected, reason, Some(curve), None);
        }
    };

    // A contact inside the non-contact region means the baseline saw contact
    // samples; refit it on the free part only and locate once more.
    if contact.index < baseline.samples {
        match correct_baseline(position, &deflection, config, Some(contact.index)) {
            Ok((line, values)) => {
                baseline = line;
                corrected = values;
                if let Ok(relocated) = locate_contact(position, &corrected, &baseline, config) {
                    debug!("contact moved from {} to {} after baseline refit", contact.index, relocated.index);
                    contact = relocated;
                }
            }
            Err(reason) => {
                let curve = convert_distance(position, corrected, k, Some(contact.index), baseline);
                return fail(Stage::ContactLocated, reason, Some(curve), None);
            }
        }
    }

    // ContactLocated -> DistanceConverted
    let curve = convert_distance(position, corrected, k, Some(contact.index), baseline);
    let stiffness = local_stiffness(&curve, config);

    let pull_off = retract.map(|r| pull_off_force(r, &curve));
    let measured_adhesion = match pull_off {
        Some(f) => Some((f, AdhesionSource::PullOff)),
        None => jump_to_contact_force(&curve).map(|f| (f, AdhesionSource::JumpToContact)),
    };

    let mut fit = FitResult {
        model: None,
        effective_modulus: None,
        youngs_modulus: None,
        adhesion_force: measured_adhesion.map(|(f, _)| f),
        adhesion_source: measured_adhesion.map(|(_, s)| s),
        work_of_adhesion: None,
        stiffness,
        residual: None,
        bic: None,
        fitted_samples: 0,
        contact_height: Some(curve.reference_position()),
        confidence: Confidence::Normal,
        quality_warning: None,
    };

    if !config.model.fits_model() {
        debug!("curve done without model fit (stage {})", Stage::Done.name());
        return CurveResult::Success { curve, fit };
    }

    // DistanceConverted -> ModelFitted
    let c = contact.index;
    let found = curve.len() - c;
    if found < config.min_contact_samples {
        let reason = FailureReason::InsufficientContactData {
            found,
            required: config.min_contact_samples,
        };
        return fail(Stage::DistanceConverted, reason, Some(curve), stiffness);
    }
    let Some(tip_radius) = meta.tip_radius else {
        let reason = FailureReason::FitDidNotConverge {
            detail: "tip radius is missing".to_string(),
        };
        return fail(Stage::DistanceConverted, reason, Some(curve), stiffness);
    };

    let opts = FitOptions::with_min_samples(config.min_contact_samples);
    let selection = match fit_and_select(
        config.model,
        &curve.indentation()[c..],
        &curve.force()[c..],
        tip_radius,
        &opts,
    ) {
        Ok(s) => s,
        Err(reason) => return fail(Stage::DistanceConverted, reason, Some(curve), stiffness),
    };
    let best = selection.best;

    fit.model = Some(best.model);
    fit.effective_modulus = Some(best.effective_modulus);
    fit.youngs_modulus = meta
        .poisson_ratio
        .map(|nu| best.effective_modulus * (1.0 - nu * nu));
    if let Some(f_adh) = best.adhesion_force {
        fit.adhesion_force = Some(f_adh);
        fit.adhesion_source = Some(AdhesionSource::Fitted);
        fit.work_of_adhesion = work_of_adhesion(best.model, f_adh, tip_radius);
    }
    fit.residual = Some(best.rms_residual);
    fit.bic = Some(best.bic);
    fit.fitted_samples = best.samples;

    // ModelFitted -> Done (soft quality gate)
    let ratio = best.quality_ratio();
    if ratio > config.fit_quality_threshold {
        debug!("low-confidence {} fit, residual ratio {ratio:.4}", best.model.display_name());
        fit.confidence = Confidence::Low;
        fit.quality_warning = Some(FailureReason::PoorFitQuality {
            ratio,
            threshold: config.fit_quality_threshold,
        });
    }

    CurveResult::Success { curve, fit }
}

fn fail(
    stage: Stage,
    reason: FailureReason,
    curve: Option<CorrectedCurve>,
    stiffness: Option<f64>,
) -> CurveResult {
    debug!("curve failed after stage {}: {reason}", stage.name());
    CurveResult::Failure {
        reason,
        curve,
        stiffness,
    }
}

/// `max(-min F_retract, 0)` with the approach baseline removed from the retract.
fn pull_off_force(retract: &RawCurve, approach: &CorrectedCurve) -> f64 {
    let k = retract.metadata().spring_constant;
    let deflection = retract.deflection_length();
    let corrected = subtract_baseline(retract.position(), &deflection, approach.baseline());
    corrected
        .iter()
        .map(|d| d * k)
        .fold(0.0_f64, |acc, f| acc.max(-f))
}

/// Attractive force on the approach before contact, if any.
fn jump_to_contact_force(curve: &CorrectedCurve) -> Option<f64> {
    let c = curve.contact_index()?;
    let f = curve.force()[..c]
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(-v));
    (f > 0.0).then_some(f)
}
