//! Batch-level error type.
//!
//! Per-curve problems are not errors; they travel as `FailureReason` inside a
//! `CurveResult`. `AppError` is reserved for things that stop a whole run:
//! invalid configuration, unreadable input, failed exports.

/// Input, configuration, or I/O problem.
pub const EXIT_INPUT: u8 = 2;
/// Nothing usable left to process.
pub const EXIT_NO_DATA: u8 = 3;
/// Internal numeric failure.
pub const EXIT_NUMERIC: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Shorthand for a configuration/input rejection (exit code 2).
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_INPUT, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
