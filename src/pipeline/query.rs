//! Query engine: free text -> query embedding -> ranked matches.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::providers::{CollaboratorError, EmbeddingGenerator, EmbeddingPurpose};
use crate::vector::{QueryError, Ranked, RankingPolicy, VectorIndex};

/// Errors on the query path. Each one is reported to the operator once.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("Query text is empty\nSuggestion: Describe the image you are looking for")]
    EmptyQuery,

    #[error("Could not embed the query: {0}")]
    EmbeddingFailed(CollaboratorError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// One retrieved image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    pub id: String,
    pub source: String,
    pub description: String,
    /// Cosine similarity or Euclidean distance, depending on the policy
    pub score: f32,
}

impl From<Ranked> for QueryMatch {
    fn from(ranked: Ranked) -> Self {
        let Ranked { record, score } = ranked;
        let payload = record.payload().clone();
        Self {
            id: record.id().to_string(),
            source: payload.source,
            description: payload.description,
            score,
        }
    }
}

/// Result of a successful query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "matches", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Best matches first
    Found(Vec<QueryMatch>),
    /// Records exist but none is close enough under the threshold policy
    NoMatch,
    /// Nothing has been ingested yet
    EmptyIndex,
}

/// Hook into the query path, for diagnostics.
///
/// Every method has a no-op default.
pub trait QueryObserver: Send + Sync {
    /// Called once the query text has been embedded.
    fn query_embedded(&self, _text: &str, _vector: &[f32]) {}

    /// Called for each candidate in rank order.
    fn candidate_ranked(&self, _rank: usize, _candidate: &Ranked) {}

    /// Whether the engine should rank every stored record, not just the top k.
    fn wants_all_candidates(&self) -> bool {
        false
    }
}

/// Observer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl QueryObserver for NoopObserver {}

/// Observer that logs the embedding and every candidate score at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl QueryObserver for TracingObserver {
    fn query_embedded(&self, text: &str, vector: &[f32]) {
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        let head: Vec<f32> = vector.iter().take(4).copied().collect();
        tracing::debug!(
            "Query {text:?} embedded: dimension={}, norm={norm:.4}, head={head:?}",
            vector.len()
        );
    }

    fn candidate_ranked(&self, rank: usize, candidate: &Ranked) {
        tracing::debug!(
            "#{rank} {} score={:.4}",
            candidate.record.id(),
            candidate.score
        );
    }

    fn wants_all_candidates(&self) -> bool {
        true
    }
}

/// Answers free-text queries against a vector index.
pub struct QueryEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingGenerator>,
    policy: RankingPolicy,
    top_k: usize,
    embedding_timeout: Duration,
    observer: Arc<dyn QueryObserver>,
}

impl QueryEngine {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingGenerator>,
        policy: RankingPolicy,
    ) -> Self {
        Self {
            index,
            embedder,
            policy,
            top_k: 1,
            embedding_timeout: Duration::from_secs(30),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Number of matches returned per query.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.embedding_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn QueryObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn policy(&self) -> RankingPolicy {
        self.policy
    }

    /// Finds the stored images closest to `text`.
    pub async fn search(&self, text: &str) -> Result<QueryOutcome, SearchError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if self.index.is_empty() {
            return Ok(QueryOutcome::EmptyIndex);
        }

        let vector = tokio::time::timeout(
            self.embedding_timeout,
            self.embedder.embed(text, EmbeddingPurpose::Query),
        )
        .await
        .unwrap_or(Err(CollaboratorError::Timeout(self.embedding_timeout)))
        .map_err(SearchError::EmbeddingFailed)?;
        self.observer.query_embedded(text, &vector);

        let k = if self.observer.wants_all_candidates() {
            self.index.len().max(self.top_k)
        } else {
            self.top_k
        };

        let mut ranked = match self.index.query_nearest(&vector, k, self.policy) {
            Ok(ranked) => ranked,
            Err(QueryError::EmptyIndex) => return Ok(QueryOutcome::EmptyIndex),
            Err(e) => return Err(e.into()),
        };
        for (rank, candidate) in ranked.iter().enumerate() {
            self.observer.candidate_ranked(rank + 1, candidate);
        }
        ranked.truncate(self.top_k);

        if ranked.is_empty() {
            tracing::debug!(
                "No match within the {} policy for {text:?}",
                self.policy.name()
            );
            return Ok(QueryOutcome::NoMatch);
        }
        Ok(QueryOutcome::Found(
            ranked.into_iter().map(QueryMatch::from).collect(),
        ))
    }
}
