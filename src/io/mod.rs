//! Input/output helpers.
//!
//! - batch ingest + validation, JSON and CSV (`ingest`)
//! - per-curve CSV exports (`export`)
//! - statistics, curve and batch JSON writers (`curve`)

pub mod curve;
pub mod export;
pub mod ingest;

pub use curve::*;
pub use export::*;
pub use ingest::*;
