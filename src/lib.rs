//! `afm-curves` library crate.
//!
//! The binary (`fdc`) is a thin wrapper around this library so that:
//!
//! - per-curve correction and fitting are testable without spawning processes
//! - the batch pipeline can be driven from other front-ends

pub mod app;
pub mod cli;
pub mod correct;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
