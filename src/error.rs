//! Top-level error type for the photofind binary
//!
//! Library layers keep their own thiserror enums (`VectorError`,
//! `InsertError`, `StoreError`, `CollaboratorError`, `IngestError`,
//! `SearchError`). `AppError` is what reaches the process boundary and
//! decides the exit code.

use crate::pipeline::SearchError;
use crate::providers::CollaboratorError;
use crate::vector::StoreError;
use thiserror::Error;

/// Errors that end a command.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {message}\nSuggestion: {suggestion}")]
    Configuration { message: String, suggestion: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Query failed: {0}")]
    Search(#[from] SearchError),

    #[error("Provider setup failed: {0}")]
    Provider(CollaboratorError),

    #[error("Failed to {action}: {source}")]
    Io {
        action: &'static str,
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for configuration errors.
    pub fn config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Get a status code for this error
    pub fn status_code(&self) -> String {
        match self {
            Self::Configuration { .. } => "CONFIG_ERROR",
            Self::Storage(StoreError::ModelMismatch { .. }) => "MODEL_MISMATCH",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Search(SearchError::EmptyQuery) => "EMPTY_QUERY",
            Self::Search(_) => "SEARCH_ERROR",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::Other(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Configuration { .. } => vec![
                "Run 'photofind config' to see the effective settings",
                "Run 'photofind init --force' to regenerate the settings file",
            ],
            Self::Storage(StoreError::ModelMismatch { .. }) => vec![
                "Set embedding.model back to the model that built the store",
                "Or point store_path at a new directory and re-ingest",
            ],
            Self::Storage(_) => vec![
                "Check disk space and permissions in the store directory",
                "If the store is corrupted, move it aside and re-ingest",
            ],
            Self::Search(SearchError::EmbeddingFailed(_)) | Self::Provider(_) => vec![
                "Check network access and that PF_API_KEY is valid",
                "Increase embedding.timeout_secs for slow connections",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for top-level operations
pub type AppResult<T> = Result<T, AppError>;
