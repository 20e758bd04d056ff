//! Ingestion pipeline: image file -> caption -> embedding -> index.
//!
//! Each image is processed independently. A failure at any stage skips
//! that image, is logged, and is recorded in the [`IngestReport`]; it never
//! stops the remaining images.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::pipeline::source::{mime_for, record_id_for};
use crate::providers::{CaptionGenerator, CollaboratorError, EmbeddingGenerator, EmbeddingPurpose};
use crate::vector::{InsertError, Payload, RecordId, VectorIndex, VectorRecord};

/// Why a single image was not stored.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Description failed: {0}")]
    DescriptionFailed(CollaboratorError),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(CollaboratorError),

    #[error(transparent)]
    Insert(#[from] InsertError),

    #[error("Processing aborted: {0}")]
    Aborted(String),
}

impl IngestError {
    /// Stable short name of the failure kind, used in reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::DescriptionFailed(_) => "description_failed",
            Self::EmbeddingFailed(_) => "embedding_failed",
            Self::Insert(InsertError::DuplicateId { .. }) => "duplicate_id",
            Self::Insert(InsertError::DimensionMismatch { .. }) => "dimension_mismatch",
            Self::Insert(InsertError::InvalidVector { .. } | InsertError::InvalidRecord { .. }) => {
                "invalid_vector"
            }
            Self::Insert(InsertError::Storage(_)) => "storage",
            Self::Aborted(_) => "aborted",
        }
    }
}

/// An image that was not stored, and why.
#[derive(Debug)]
pub struct SkippedItem {
    pub source: PathBuf,
    pub error: IngestError,
}

/// Outcome of one ingestion run, in input order.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub stored: Vec<RecordId>,
    pub skipped: Vec<SkippedItem>,
}

impl IngestReport {
    /// Number of images looked at.
    #[must_use]
    pub fn total(&self) -> usize {
        self.stored.len() + self.skipped.len()
    }
}

/// Tuning knobs for [`IngestionPipeline`].
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Images processed at once; 1 gives deterministic insertion order
    pub concurrency: usize,
    pub caption_timeout: Duration,
    pub embedding_timeout: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            caption_timeout: Duration::from_secs(60),
            embedding_timeout: Duration::from_secs(30),
        }
    }
}

/// Collaborators shared by every ingestion task.
struct Stages {
    index: Arc<dyn VectorIndex>,
    captioner: Arc<dyn CaptionGenerator>,
    embedder: Arc<dyn EmbeddingGenerator>,
    caption_timeout: Duration,
    embedding_timeout: Duration,
}

impl Stages {
    async fn process(&self, path: &Path) -> Result<RecordId, IngestError> {
        let id = record_id_for(path).map_err(|e| IngestError::SourceUnavailable {
            reason: e.to_string(),
        })?;

        // Cheap check first so duplicates never cost remote calls
        if self.index.contains(&id) {
            return Err(InsertError::DuplicateId { id }.into());
        }

        let mime = mime_for(path).ok_or_else(|| IngestError::SourceUnavailable {
            reason: format!("'{}' is not a supported image type", path.display()),
        })?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IngestError::SourceUnavailable {
                reason: format!("Cannot read '{}': {e}", path.display()),
            })?;

        let description = tokio::time::timeout(self.caption_timeout, self.captioner.describe(&bytes, mime))
            .await
            .unwrap_or(Err(CollaboratorError::Timeout(self.caption_timeout)))
            .map_err(IngestError::DescriptionFailed)?;
        let description = description.trim();
        if description.is_empty() {
            return Err(IngestError::DescriptionFailed(CollaboratorError::EmptyResponse(
                "description",
            )));
        }
        tracing::debug!("Described {id}: {description}");

        let vector = tokio::time::timeout(
            self.embedding_timeout,
            self.embedder.embed(description, EmbeddingPurpose::Document),
        )
        .await
        .unwrap_or(Err(CollaboratorError::Timeout(self.embedding_timeout)))
        .map_err(IngestError::EmbeddingFailed)?;

        let payload = Payload {
            source: path.display().to_string(),
            description: description.to_string(),
        };
        let record = VectorRecord::new(id.clone(), vector, payload)
            .map_err(|e| IngestError::Insert(e.into()))?;
        self.index.insert(record)?;

        tracing::info!("Stored {id}");
        Ok(id)
    }
}

/// Runs images through captioning, embedding and insertion.
pub struct IngestionPipeline {
    stages: Arc<Stages>,
    concurrency: usize,
    progress: Option<ProgressBar>,
}

impl IngestionPipeline {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        captioner: Arc<dyn CaptionGenerator>,
        embedder: Arc<dyn EmbeddingGenerator>,
        options: IngestOptions,
    ) -> Self {
        Self {
            stages: Arc::new(Stages {
                index,
                captioner,
                embedder,
                caption_timeout: options.caption_timeout,
                embedding_timeout: options.embedding_timeout,
            }),
            concurrency: options.concurrency.max(1),
            progress: None,
        }
    }

    /// Advances `progress` by one for every finished image.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Ingests every file in `files`.
    ///
    /// Never fails as a whole: per-image failures are logged and listed in
    /// the returned report.
    pub async fn ingest(&self, files: Vec<PathBuf>) -> IngestReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut positions = HashMap::new();
        let mut outcomes: Vec<Option<Result<RecordId, IngestError>>> =
            files.iter().map(|_| None).collect();

        for (position, path) in files.iter().enumerate() {
            // Taking the permit before spawning keeps start order equal to input order
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    outcomes[position] = Some(Err(IngestError::Aborted(e.to_string())));
                    continue;
                }
            };

            let stages = Arc::clone(&self.stages);
            let progress = self.progress.clone();
            let path = path.clone();
            let handle = tasks.spawn(async move {
                let outcome = stages.process(&path).await;
                drop(permit);
                if let Some(progress) = progress {
                    progress.inc(1);
                }
                (position, outcome)
            });
            positions.insert(handle.id(), position);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (position, outcome))) => outcomes[position] = Some(outcome),
                Err(e) => {
                    if let Some(&position) = positions.get(&e.id()) {
                        outcomes[position] = Some(Err(IngestError::Aborted(e.to_string())));
                    }
                }
            }
        }

        let mut report = IngestReport::default();
        for (path, outcome) in files.into_iter().zip(outcomes) {
            match outcome {
                Some(Ok(id)) => report.stored.push(id),
                Some(Err(error)) => {
                    tracing::warn!("Skipping {}: {error}", path.display());
                    report.skipped.push(SkippedItem {
                        source: path,
                        error,
                    });
                }
                None => report.skipped.push(SkippedItem {
                    source: path,
                    error: IngestError::Aborted("Task did not report a result".to_string()),
                }),
            }
        }

        tracing::info!(
            "Ingestion finished: {} stored, {} skipped",
            report.stored.len(),
            report.skipped.len()
        );
        report
    }
}
