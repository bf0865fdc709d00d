//! Mathematical utilities: line fits, window regression, running statistics
//! and interpolation.

pub mod interp;
pub mod ols;
pub mod stats;
pub mod window;

pub use interp::*;
pub use ols::*;
pub use stats::*;
pub use window::*;
