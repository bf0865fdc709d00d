//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - raw and corrected curves (`RawCurve`, `CorrectedCurve`)
//! - per-curve outputs (`FitResult`, `CurveResult`, `FailureReason`)
//! - the run configuration (`CorrectionConfig`, `ModelSpec`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
