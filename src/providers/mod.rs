//! External collaborators: image captioning and text embedding.
//!
//! Both are async traits injected as `Arc<dyn ...>`, so the pipeline and the
//! query engine never know whether they talk to a remote API or a local
//! model. Callers wrap every call in a timeout; implementations do not retry.

mod caption;
mod embedding;
mod gemini;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use caption::CaptionGenerator;
pub use embedding::{EmbeddingGenerator, EmbeddingPurpose, FastEmbedGenerator, parse_fastembed_model};
pub use gemini::{DEFAULT_ENDPOINT, GeminiCaptioner, GeminiClient, GeminiEmbedder};

use crate::config::{CaptionProvider, EmbeddingProvider, Settings};
use crate::error::AppError;

/// Failure of a single collaborator call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Response contained no {0}")]
    EmptyResponse(&'static str),

    #[error("Model error: {0}")]
    Model(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Builds the caption generator selected by `settings.caption`.
pub fn caption_generator(settings: &Settings) -> Result<Arc<dyn CaptionGenerator>, AppError> {
    match settings.caption.provider {
        CaptionProvider::Gemini => {
            let client = gemini_client(settings, &settings.caption.endpoint)?;
            Ok(Arc::new(GeminiCaptioner::new(
                client,
                settings.caption.model.clone(),
                settings.caption.prompt.clone(),
            )))
        }
    }
}

/// Builds the embedding generator selected by `settings.embedding`.
///
/// The local provider loads (and on first use downloads) its model here.
pub fn embedding_generator(
    settings: &Settings,
) -> Result<Arc<dyn EmbeddingGenerator>, AppError> {
    match settings.embedding.provider {
        EmbeddingProvider::Gemini => {
            let client = gemini_client(settings, &settings.embedding.endpoint)?;
            Ok(Arc::new(GeminiEmbedder::new(
                client,
                settings.embedding.model.clone(),
            )))
        }
        EmbeddingProvider::Fastembed => {
            let model = parse_fastembed_model(&settings.embedding.model).ok_or_else(|| {
                AppError::Configuration {
                    message: format!(
                        "Unknown fastembed model '{}'",
                        settings.embedding.model
                    ),
                    suggestion: "Use AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15 or MultilingualE5Small".to_string(),
                }
            })?;
            let generator = FastEmbedGenerator::with_model(model, settings.debug)
                .map_err(AppError::Provider)?;
            Ok(Arc::new(generator))
        }
    }
}

fn gemini_client(settings: &Settings, endpoint: &str) -> Result<GeminiClient, AppError> {
    let api_key = settings.api_key().ok_or_else(|| AppError::Configuration {
        message: "No API key configured for the Gemini provider".to_string(),
        suggestion: "Set PF_API_KEY (or API_KEY) in the environment".to_string(),
    })?;
    GeminiClient::new(endpoint, api_key).map_err(AppError::Provider)
}
