//! Correction configuration.
//!
//! One immutable `CorrectionConfig` is built per run (from CLI flags or a JSON
//! file) and passed by reference into every stage.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::{ContactModel, CurveMetadata};
use crate::error::AppError;

/// Which contact model(s) to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelSpec {
    /// Skip model fitting; only correction, contact point and stiffness.
    Off,
    /// Fit Hertz and DMT, keep the one with the lower BIC.
    Auto,
    Hertz,
    Dmt,
    Jkr,
}

impl ModelSpec {
    pub fn fits_model(self) -> bool {
        !matches!(self, ModelSpec::Off)
    }

    /// Candidate models to fit for this spec.
    pub fn candidates(self) -> &'static [ContactModel] {
        match self {
            ModelSpec::Off => &[],
            ModelSpec::Auto => &[ContactModel::Hertz, ContactModel::Dmt],
            ModelSpec::Hertz => &[ContactModel::Hertz],
            ModelSpec::Dmt => &[ContactModel::Dmt],
            ModelSpec::Jkr => &[ContactModel::Jkr],
        }
    }
}

/// How the contact point is located on the corrected curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ContactPointMethod {
    /// Intersection of the baseline line with a line fitted to the contact region.
    TwoLine,
    /// Last crossing of the noise level before the deflection stays positive.
    ZeroCrossing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Leading fraction of samples treated as the non-contact region.
    pub baseline_fraction: f64,
    /// Maximum baseline RMS residual, relative to the curve's deflection span.
    pub baseline_residual_ratio: f64,

    pub contact_method: ContactPointMethod,
    /// Minimum slope (deflection per unit position) of an accepted contact window.
    pub contact_slope_threshold: f64,
    /// Contact-window residual limit, as a multiple of the baseline RMS.
    pub contact_noise_factor: f64,
    /// Lower bound on the residual limit, relative to the deflection span.
    pub contact_residual_floor: f64,
    /// Residual a curved contact window may keep, relative to its own rise.
    pub contact_linearity: f64,

    pub min_contact_samples: usize,
    pub model: ModelSpec,
    /// Maximum `rms(residual) / rms(force)` before a fit is tagged low-confidence.
    pub fit_quality_threshold: f64,

    /// Absolute indentation at which stiffness is evaluated.
    pub reference_indentation: Option<f64>,
    /// Used when `reference_indentation` is unset: fraction of the maximum indentation.
    pub reference_fraction: f64,

    /// Outlier deviation multiplier `k`.
    pub outlier_k: f64,
    pub histogram_bins: usize,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            baseline_fraction: 0.1,
            baseline_residual_ratio: 0.05,
            contact_method: ContactPointMethod::TwoLine,
            contact_slope_threshold: 0.05,
            contact_noise_factor: 3.0,
            contact_residual_floor: 1e-6,
            contact_linearity: 0.01,
            min_contact_samples: 10,
            model: ModelSpec::Hertz,
            fit_quality_threshold: 0.1,
            reference_indentation: None,
            reference_fraction: 0.5,
            outlier_k: 2.0,
            histogram_bins: 20,
        }
    }
}

impl CorrectionConfig {
    /// Reject out-of-range settings before any curve is processed.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.baseline_fraction.is_finite()
            && self.baseline_fraction > 0.0
            && self.baseline_fraction < 1.0)
        {
            return Err(AppError::config(format!(
                "baseline_fraction must be in (0, 1), got {}.",
                self.baseline_fraction
            )));
        }
        ensure_positive("baseline_residual_ratio", self.baseline_residual_ratio)?;
        ensure_positive("contact_slope_threshold", self.contact_slope_threshold)?;
        ensure_positive("contact_noise_factor", self.contact_noise_factor)?;
        if !(self.contact_residual_floor.is_finite() && self.contact_residual_floor >= 0.0) {
            return Err(AppError::config(format!(
                "contact_residual_floor must be >= 0, got {}.",
                self.contact_residual_floor
            )));
        }
        ensure_positive("contact_linearity", self.contact_linearity)?;
        if self.min_contact_samples < 2 {
            return Err(AppError::config("min_contact_samples must be >= 2."));
        }
        ensure_positive("fit_quality_threshold", self.fit_quality_threshold)?;
        if let Some(depth) = self.reference_indentation {
            ensure_positive("reference_indentation", depth)?;
        }
        if !(self.reference_fraction.is_finite()
            && self.reference_fraction > 0.0
            && self.reference_fraction <= 1.0)
        {
            return Err(AppError::config(format!(
                "reference_fraction must be in (0, 1], got {}.",
                self.reference_fraction
            )));
        }
        ensure_positive("outlier_k", self.outlier_k)?;
        if self.histogram_bins == 0 {
            return Err(AppError::config("histogram_bins must be > 0."));
        }
        Ok(())
    }

    /// Check that a curve's metadata carries what this configuration needs.
    pub fn validate_metadata(&self, meta: &CurveMetadata) -> Result<(), AppError> {
        ensure_positive("spring_constant", meta.spring_constant)?;
        if let Some(s) = meta.deflection_sensitivity {
            ensure_positive("deflection_sensitivity", s)?;
        }
        if self.model.fits_model() {
            match meta.tip_radius {
                Some(r) => ensure_positive("tip_radius", r)?,
                None => {
                    return Err(AppError::config(
                        "tip_radius is required when a contact model fit is requested.",
                    ));
                }
            }
        }
        if let Some(nu) = meta.poisson_ratio {
            if !(nu.is_finite() && (-1.0..0.5).contains(&nu)) {
                return Err(AppError::config(format!(
                    "poisson_ratio must be in [-1, 0.5), got {nu}."
                )));
            }
        }
        Ok(())
    }
}

fn ensure_positive(name: &str, value: f64) -> Result<(), AppError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AppError::config(format!("{name} must be finite and > 0, got {value}.")))
    }
}
