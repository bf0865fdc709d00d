//! Contact model fitting.
//!
//! Responsibilities:
//!
//! - fit one contact model by Levenberg–Marquardt
//! - select the best model using BIC
//! - report model-free stiffness at a reference depth

pub mod fitter;
pub mod selection;
pub mod stiffness;

pub use fitter::*;
pub use selection::*;
pub use stiffness::*;
