//! Text embedding generators.
//!
//! [`FastEmbedGenerator`] runs a local ONNX model through fastembed and needs
//! no credentials. The remote implementation lives in the `gemini` module.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::CollaboratorError;

/// What an embedding will be used for.
///
/// Retrieval models may embed stored documents and search queries
/// asymmetrically. Providers without that distinction ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingPurpose {
    /// Text describing an item being stored
    Document,
    /// Free-text search query
    Query,
}

/// Maps text into a fixed-dimensionality vector space.
///
/// Every call on one generator must return vectors of the same length.
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    async fn embed(
        &self,
        text: &str,
        purpose: EmbeddingPurpose,
    ) -> Result<Vec<f32>, CollaboratorError>;
}

/// Parses a fastembed model name as written in the settings file.
#[must_use]
pub fn parse_fastembed_model(name: &str) -> Option<EmbeddingModel> {
    match name {
        "AllMiniLML6V2" | "all-MiniLM-L6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" | "all-MiniLM-L12-v2" => Some(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" | "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" | "bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" | "multilingual-e5-small" => {
            Some(EmbeddingModel::MultilingualE5Small)
        }
        _ => None,
    }
}

/// Local embedding generator backed by fastembed.
///
/// The model is loaded once and shared behind a mutex; inference runs on
/// the blocking thread pool so it never stalls the async runtime.
pub struct FastEmbedGenerator {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedGenerator")
            .field("model", &"<TextEmbedding>")
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedGenerator {
    /// Loads `model` from the user cache directory, downloading it on first use.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn with_model(
        model: EmbeddingModel,
        show_download_progress: bool,
    ) -> Result<Self, CollaboratorError> {
        let cache_dir = models_dir();
        tracing::debug!("Loading embedding model from {}", cache_dir.display());

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| {
            CollaboratorError::Model(format!(
                "Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download"
            ))
        })?;

        // Probe the output size once so callers can report it
        let dimension = text_model
            .embed(vec!["dimension probe"], None)
            .map_err(|e| CollaboratorError::Model(format!("Failed to generate embedding: {e}")))?
            .into_iter()
            .next()
            .map(|v| v.len())
            .ok_or(CollaboratorError::EmptyResponse("embedding"))?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_model)),
            dimension,
        })
    }

    /// Length of the vectors this model produces.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl EmbeddingGenerator for FastEmbedGenerator {
    async fn embed(
        &self,
        text: &str,
        _purpose: EmbeddingPurpose,
    ) -> Result<Vec<f32>, CollaboratorError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        let embeddings = tokio::task::spawn_blocking(move || {
            model
                .lock()
                .map_err(|_| {
                    CollaboratorError::Model(
                        "Failed to acquire embedding model lock - model may be poisoned"
                            .to_string(),
                    )
                })?
                .embed(vec![text], None)
                .map_err(|e| CollaboratorError::Model(format!("Failed to generate embedding: {e}")))
        })
        .await
        .map_err(|e| CollaboratorError::Model(format!("Embedding task failed: {e}")))??;

        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or(CollaboratorError::EmptyResponse("embedding"))?;

        if embedding.len() != self.dimension {
            return Err(CollaboratorError::Model(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        Ok(embedding)
    }
}

/// Directory where downloaded models are cached.
fn models_dir() -> std::path::PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("photofind")
        .join("models")
}
