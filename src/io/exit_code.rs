//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success. Skipped images, "no match" and a failed query all count,
//!   since the process did what it could and reported the rest on stderr.
//! - `1`: General error
//! - `2`: Configuration error at startup
//! - `3-5`: Specific startup failures
//! - `126-255`: Reserved by shell

use crate::error::AppError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Settings are missing or invalid (code 2)
    ConfigError = 2,

    /// Reading input or writing output failed (code 3)
    IoError = 3,

    /// A captioning or embedding provider could not be set up (code 4)
    ProviderError = 4,

    /// The record store could not be opened or written (code 5)
    StorageError = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// Convert an `AppError` to the appropriate exit code.
    ///
    /// A failed query is reported but still exits with `Success`.
    pub fn from_error(error: &AppError) -> Self {
        match error {
            AppError::Configuration { .. } => ExitCode::ConfigError,
            // Vectors from another model cannot be searched, treat as misconfiguration
            AppError::Storage(crate::vector::StoreError::ModelMismatch { .. }) => {
                ExitCode::ConfigError
            }
            AppError::Storage(_) => ExitCode::StorageError,
            AppError::Search(_) => ExitCode::Success,
            AppError::Provider(_) => ExitCode::ProviderError,
            AppError::Io { .. } => ExitCode::IoError,
            AppError::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::IoError => "I/O error",
            ExitCode::ProviderError => "Provider error",
            ExitCode::StorageError => "Storage error",
        }
    }
}
