//! Data sources for the batch driver.

pub mod synthetic;

pub use synthetic::{SyntheticCurve, SyntheticGrid, hertz_deflection};
