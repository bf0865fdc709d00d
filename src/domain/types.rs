//! Curve data model.
//!
//! Conventions used everywhere in the crate:
//!
//! - `position` increases as the probe moves toward the sample (piezo extension)
//! - corrected deflection is positive for repulsion (cantilever bent away)
//! - `separation` is positive off contact and negative once the tip indents
//!
//! Raw curves are immutable once built; corrected curves are created once by the
//! pipeline and only exposed through accessors.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Which half of the load cycle a curve was recorded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Approach,
    Retract,
}

/// Per-curve instrument metadata supplied by the import side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveMetadata {
    /// Cantilever spring constant (N/m).
    pub spring_constant: f64,
    /// Deflection sensitivity (m/V).
    ///
    /// `None` means deflection is already in length units.
    #[serde(default)]
    pub deflection_sensitivity: Option<f64>,
    /// Tip radius (m). Required when a contact model is fitted.
    #[serde(default)]
    pub tip_radius: Option<f64>,
    /// Sample Poisson ratio, used to turn `E*` into a Young's modulus.
    #[serde(default)]
    pub poisson_ratio: Option<f64>,
    #[serde(default)]
    pub load_cycle: Option<u32>,
}

impl CurveMetadata {
    pub fn new(spring_constant: f64) -> Self {
        Self {
            spring_constant,
            deflection_sensitivity: None,
            tip_radius: None,
            poisson_ratio: None,
            load_cycle: None,
        }
    }

    pub fn with_tip_radius(mut self, radius: f64) -> Self {
        self.tip_radius = Some(radius);
        self
    }

    pub fn with_poisson_ratio(mut self, nu: f64) -> Self {
        self.poisson_ratio = Some(nu);
        self
    }
}

/// One recorded segment: ordered `(position, deflection)` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCurve {
    segment: Segment,
    position: Vec<f64>,
    deflection: Vec<f64>,
    metadata: CurveMetadata,
}

impl RawCurve {
    /// Build a curve from parallel position/deflection arrays.
    ///
    /// Rejects mismatched lengths, empty curves and non-finite samples.
    pub fn new(
        segment: Segment,
        position: Vec<f64>,
        deflection: Vec<f64>,
        metadata: CurveMetadata,
    ) -> Result<Self, AppError> {
        if position.len() != deflection.len() {
            return Err(AppError::config(format!(
                "Curve has {} positions but {} deflection values.",
                position.len(),
                deflection.len()
            )));
        }
        if position.is_empty() {
            return Err(AppError::config("Curve has no samples."));
        }
        if let Some(i) = position
            .iter()
            .zip(deflection.iter())
            .position(|(p, d)| !(p.is_finite() && d.is_finite()))
        {
            return Err(AppError::config(format!("Curve sample {i} is not finite.")));
        }

        Ok(Self {
            segment,
            position,
            deflection,
            metadata,
        })
    }

    pub fn from_samples(
        segment: Segment,
        samples: &[(f64, f64)],
        metadata: CurveMetadata,
    ) -> Result<Self, AppError> {
        let (position, deflection) = samples.iter().copied().unzip();
        Self::new(segment, position, deflection, metadata)
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn position(&self) -> &[f64] {
        &self.position
    }

    /// Deflection exactly as recorded (volts or length, see `metadata`).
    pub fn deflection(&self) -> &[f64] {
        &self.deflection
    }

    pub fn metadata(&self) -> &CurveMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Deflection in length units, applying the sensitivity when present.
    pub fn deflection_length(&self) -> Vec<f64> {
        match self.metadata.deflection_sensitivity {
            Some(s) => self.deflection.iter().map(|d| d * s).collect(),
            None => self.deflection.clone(),
        }
    }
}

/// Grid coordinate of a curve inside a force volume (row-major ordering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub row: usize,
    pub col: usize,
}

impl GridPosition {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl std::fmt::Display for GridPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// One force-volume pixel handed to the batch driver.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub position: GridPosition,
    pub approach: RawCurve,
    pub retract: Option<RawCurve>,
}

/// Straight line `y = intercept + slope * x` fitted to the non-contact region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineLine {
    pub slope: f64,
    pub intercept: f64,
    /// RMS residual of the fit (length units).
    pub rms: f64,
    /// Number of leading samples the line was fitted on.
    pub samples: usize,
}

impl BaselineLine {
    pub fn eval(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// A curve after baseline removal and distance conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectedCurve {
    separation: Vec<f64>,
    force: Vec<f64>,
    deflection: Vec<f64>,
    displacement: Vec<f64>,
    indentation: Vec<f64>,
    contact_index: Option<usize>,
    reference_position: f64,
    baseline: BaselineLine,
}

impl CorrectedCurve {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        separation: Vec<f64>,
        force: Vec<f64>,
        deflection: Vec<f64>,
        displacement: Vec<f64>,
        indentation: Vec<f64>,
        contact_index: Option<usize>,
        reference_position: f64,
        baseline: BaselineLine,
    ) -> Self {
        Self {
            separation,
            force,
            deflection,
            displacement,
            indentation,
            contact_index,
            reference_position,
            baseline,
        }
    }

    /// Tip-sample separation (length units).
    pub fn separation(&self) -> &[f64] {
        &self.separation
    }

    /// Baseline-subtracted force (deflection × spring constant).
    pub fn force(&self) -> &[f64] {
        &self.force
    }

    /// Baseline-subtracted deflection in length units.
    pub fn deflection(&self) -> &[f64] {
        &self.deflection
    }

    /// Piezo travel relative to the reference position.
    pub fn displacement(&self) -> &[f64] {
        &self.displacement
    }

    pub fn indentation(&self) -> &[f64] {
        &self.indentation
    }

    /// `None` when the contact point could not be determined.
    pub fn contact_index(&self) -> Option<usize> {
        self.contact_index
    }

    /// Raw position used as zero: contact position, or the first sample.
    pub fn reference_position(&self) -> f64 {
        self.reference_position
    }

    /// Whether distances are true separations (contact was located).
    pub fn is_referenced(&self) -> bool {
        self.contact_index.is_some()
    }

    pub fn baseline(&self) -> &BaselineLine {
        &self.baseline
    }

    pub fn len(&self) -> usize {
        self.force.len()
    }

    pub fn is_empty(&self) -> bool {
        self.force.is_empty()
    }
}

/// Closed set of contact-mechanics models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactModel {
    Hertz,
    Dmt,
    Jkr,
}

impl ContactModel {
    pub fn display_name(self) -> &'static str {
        match self {
            ContactModel::Hertz => "Hertz",
            ContactModel::Dmt => "DMT",
            ContactModel::Jkr => "JKR",
        }
    }

    /// Number of fitted parameters (`E*`, plus an adhesion offset if adhesive).
    pub fn param_len(self) -> usize {
        match self {
            ContactModel::Hertz => 1,
            ContactModel::Dmt | ContactModel::Jkr => 2,
        }
    }

    pub fn is_adhesive(self) -> bool {
        !matches!(self, ContactModel::Hertz)
    }
}

/// Where a reported adhesion force came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdhesionSource {
    /// Offset fitted jointly with `E*` (DMT / JKR).
    Fitted,
    /// Minimum force on the retract segment.
    PullOff,
    /// Attractive dip on the approach before contact.
    JumpToContact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Normal,
    Low,
}

/// Why a curve could not be (fully) corrected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("baseline unstable: {detail}")]
    BaselineUnstable { detail: String },
    #[error("contact point not found: {detail}")]
    ContactPointNotFound { detail: String },
    #[error("insufficient contact data: {found} samples, need {required}")]
    InsufficientContactData { found: usize, required: usize },
    #[error("fit did not converge: {detail}")]
    FitDidNotConverge { detail: String },
    /// Soft failure: the numeric result is kept and tagged low-confidence.
    #[error("poor fit quality: residual ratio {ratio:.4} exceeds {threshold:.4}")]
    PoorFitQuality { ratio: f64, threshold: f64 },
}

impl FailureReason {
    /// Stable short code for tables and CSV exports.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::BaselineUnstable { .. } => "baseline_unstable",
            FailureReason::ContactPointNotFound { .. } => "contact_point_not_found",
            FailureReason::InsufficientContactData { .. } => "insufficient_contact_data",
            FailureReason::FitDidNotConverge { .. } => "fit_did_not_converge",
            FailureReason::PoorFitQuality { .. } => "poor_fit_quality",
        }
    }
}

/// Scalar outputs for one curve. Fields are `None` when the stage producing them
/// was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub model: Option<ContactModel>,
    /// Effective modulus `E*` (Pa).
    pub effective_modulus: Option<f64>,
    /// `E* (1 - ν²)`, only when a Poisson ratio is known.
    pub youngs_modulus: Option<f64>,
    pub adhesion_force: Option<f64>,
    pub adhesion_source: Option<AdhesionSource>,
    pub work_of_adhesion: Option<f64>,
    /// Local slope of force against piezo travel at the reference indentation.
    pub stiffness: Option<f64>,
    /// RMS residual of the model fit (force units).
    pub residual: Option<f64>,
    pub bic: Option<f64>,
    pub fitted_samples: usize,
    pub contact_height: Option<f64>,
    pub confidence: Confidence,
    pub quality_warning: Option<FailureReason>,
}

/// Unit exchanged between the pipeline and downstream aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CurveResult {
    Success {
        curve: CorrectedCurve,
        fit: FitResult,
    },
    Failure {
        reason: FailureReason,
        /// Whatever was computed before the failing stage.
        curve: Option<CorrectedCurve>,
        /// Stiffness does not depend on the model fit and survives its failure.
        stiffness: Option<f64>,
    },
}

impl CurveResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CurveResult::Success { .. })
    }

    pub fn curve(&self) -> Option<&CorrectedCurve> {
        match self {
            CurveResult::Success { curve, .. } => Some(curve),
            CurveResult::Failure { curve, .. } => curve.as_ref(),
        }
    }

    pub fn fit(&self) -> Option<&FitResult> {
        match self {
            CurveResult::Success { fit, .. } => Some(fit),
            CurveResult::Failure { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            CurveResult::Success { .. } => None,
            CurveResult::Failure { reason, .. } => Some(reason),
        }
    }

    /// Hard failure reason, or the soft quality warning of a success.
    pub fn status_code(&self) -> &'static str {
        match self {
            CurveResult::Success { fit, .. } => fit
                .quality_warning
                .as_ref()
                .map(FailureReason::code)
                .unwrap_or("ok"),
            CurveResult::Failure { reason, .. } => reason.code(),
        }
    }
}

/// Derived per-position quantity aggregated over a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    Modulus,
    Adhesion,
    Stiffness,
    ContactHeight,
    MaxDeflection,
    AttractiveArea,
    DeflectionAttractive,
    RawOffset,
    RawStiffness,
}

impl Channel {
    pub const ALL: [Channel; 9] = [
        Channel::Modulus,
        Channel::Adhesion,
        Channel::Stiffness,
        Channel::ContactHeight,
        Channel::MaxDeflection,
        Channel::AttractiveArea,
        Channel::DeflectionAttractive,
        Channel::RawOffset,
        Channel::RawStiffness,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Modulus => "modulus",
            Channel::Adhesion => "adhesion",
            Channel::Stiffness => "stiffness",
            Channel::ContactHeight => "contact-height",
            Channel::MaxDeflection => "max-deflection",
            Channel::AttractiveArea => "attractive-area",
            Channel::DeflectionAttractive => "deflection-attractive",
            Channel::RawOffset => "raw-offset",
            Channel::RawStiffness => "raw-stiffness",
        }
    }

    /// Channels whose values only exist when a contact model fit succeeded.
    pub fn is_model_dependent(self) -> bool {
        matches!(self, Channel::Modulus | Channel::Adhesion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_curve_rejects_length_mismatch() {
        let err = RawCurve::new(
            Segment::Approach,
            vec![0.0, 1.0, 2.0],
            vec![0.0, 0.0],
            CurveMetadata::new(1.0),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn raw_curve_rejects_non_finite_samples() {
        let err = RawCurve::from_samples(
            Segment::Approach,
            &[(0.0, 0.0), (1.0, f64::NAN)],
            CurveMetadata::new(1.0),
        )
        .unwrap_err();
        assert!(err.message().contains("sample 1"), "{err}");
    }

    #[test]
    fn deflection_sensitivity_scales_to_length() {
        let mut meta = CurveMetadata::new(1.0);
        meta.deflection_sensitivity = Some(2e-9);
        let curve =
            RawCurve::from_samples(Segment::Approach, &[(0.0, 1.0), (1.0, -0.5)], meta).unwrap();
        let d = curve.deflection_length();
        assert!((d[0] - 2e-9).abs() < 1e-24);
        assert!((d[1] + 1e-9).abs() < 1e-24);
        // The recorded values are untouched.
        assert_eq!(curve.deflection(), &[1.0, -0.5]);
    }

    #[test]
    fn grid_positions_order_row_major() {
        let mut v = vec![GridPosition::new(1, 0), GridPosition::new(0, 2), GridPosition::new(0, 1)];
        v.sort();
        assert_eq!(v, vec![GridPosition::new(0, 1), GridPosition::new(0, 2), GridPosition::new(1, 0)]);
    }

    #[test]
    fn status_code_reports_soft_warning() {
        let reason = FailureReason::PoorFitQuality { ratio: 0.3, threshold: 0.1 };
        assert_eq!(reason.code(), "poor_fit_quality");
        assert!(reason.to_string().contains("0.3000"));
    }
}
