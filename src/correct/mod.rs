//! Per-curve correction.
//!
//! Responsibilities:
//!
//! - remove the non-contact baseline
//! - locate the contact point
//! - convert piezo position to separation and indentation
//! - run the whole chain for one curve (`correct_curve`)
//! - extract model-free features from a corrected curve

pub mod baseline;
pub mod contact;
pub mod distance;
pub mod features;
pub mod pipeline;

pub use baseline::{correct_baseline, fit_baseline, subtract_baseline};
pub use contact::{ContactEstimate, locate_contact};
pub use distance::convert_distance;
pub use features::CurveFeatures;
pub use pipeline::{Stage, correct_curve};
