//! Exact nearest-neighbour index over vector records.
//!
//! [`FlatIndex`] scores the query against every stored record. It is the
//! reference implementation of the [`VectorIndex`] contract: an approximate
//! structure may replace it as long as exact ties still rank by insertion
//! order.
//!
//! # Concurrency
//! Records live behind a single `RwLock`. Inserts validate, persist and
//! append under the write lock, so a query that starts after an insert
//! returns sees that record, and no query can observe a half-written one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use rayon::prelude::*;
use thiserror::Error;

use crate::vector::metadata::StoreMetadata;
use crate::vector::record::{Ranked, VectorRecord};
use crate::vector::similarity::RankingPolicy;
use crate::vector::storage::{MmapRecordStore, RecordStore, StoreError};
use crate::vector::types::{RecordId, VectorDimension, VectorError, ensure_finite};

/// Collections at least this large are scored on the rayon pool.
const PARALLEL_SCAN_THRESHOLD: usize = 4_096;

/// Errors returned by [`VectorIndex::insert`]. The index is unchanged after any of them.
#[derive(Error, Debug)]
pub enum InsertError {
    #[error("Record '{id}' already exists\nSuggestion: Record ids are derived from file names, rename one of the files")]
    DuplicateId { id: RecordId },

    #[error(
        "Vector dimension mismatch: index holds {expected}-dimensional vectors, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector component {position} is not finite ({value})")]
    InvalidVector { position: usize, value: f32 },

    #[error("Invalid record: {reason}")]
    InvalidRecord { reason: String },

    #[error("Failed to persist record: {0}")]
    Storage(#[from] StoreError),
}

impl From<VectorError> for InsertError {
    fn from(error: VectorError) -> Self {
        match error {
            VectorError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            VectorError::InvalidVector { position, value } => {
                Self::InvalidVector { position, value }
            }
            other => Self::InvalidRecord {
                reason: other.to_string(),
            },
        }
    }
}

/// Errors returned by [`VectorIndex::query_nearest`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error(
        "Query dimension mismatch: index holds {expected}-dimensional vectors, got {actual}\nSuggestion: Query with the same embedding model used for ingestion"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Query vector component {position} is not finite ({value})")]
    InvalidVector { position: usize, value: f32 },

    #[error("The index is empty\nSuggestion: Ingest some images before querying")]
    EmptyIndex,
}

/// Checks a query vector against the index dimension.
fn validate_query(dimension: VectorDimension, vector: &[f32]) -> Result<(), QueryError> {
    if vector.len() != dimension.get() {
        return Err(QueryError::DimensionMismatch {
            expected: dimension.get(),
            actual: vector.len(),
        });
    }
    if let Some(position) = vector.iter().position(|value| !value.is_finite()) {
        return Err(QueryError::InvalidVector {
            position,
            value: vector[position],
        });
    }
    Ok(())
}

/// Storage and k-nearest-neighbour retrieval of vector records.
///
/// All mutation goes through `insert` and all reads through
/// `query_nearest`; callers never touch the record collection directly.
pub trait VectorIndex: Send + Sync {
    /// Adds a record. The first successful insert fixes the index dimension.
    fn insert(&self, record: VectorRecord) -> Result<(), InsertError>;

    /// Returns up to `k` records ranked by `policy`, ties broken by insertion order.
    ///
    /// Under [`RankingPolicy::Cosine`] an empty index is an error; under
    /// [`RankingPolicy::Threshold`] it yields an empty sequence.
    fn query_nearest(
        &self,
        vector: &[f32],
        k: usize,
        policy: RankingPolicy,
    ) -> Result<Vec<Ranked>, QueryError>;

    /// Whether a record with this id is stored.
    fn contains(&self, id: &RecordId) -> bool;

    /// Dimension shared by every stored vector, once known.
    fn dimension(&self) -> Option<VectorDimension>;

    /// Number of stored records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where persisted records live and which model produced them.
struct Persistence {
    store: Box<dyn RecordStore>,
    metadata: Option<(PathBuf, StoreMetadata)>,
}

struct FlatInner {
    /// Records in insertion order; the position is the tie-break sequence
    records: Vec<VectorRecord>,
    ids: HashSet<RecordId>,
    dimension: Option<VectorDimension>,
    persistence: Option<Persistence>,
}

/// Brute-force index: exact scores against every record, O(N·D) per query.
pub struct FlatIndex {
    inner: RwLock<FlatInner>,
}

impl std::fmt::Debug for FlatIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_read() {
            Some(inner) => f
                .debug_struct("FlatIndex")
                .field("records", &inner.records.len())
                .field("dimension", &inner.dimension)
                .field("persistent", &inner.persistence.is_some())
                .finish(),
            None => write!(f, "FlatIndex {{ <locked> }}"),
        }
    }
}

impl Default for FlatIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatIndex {
    /// Creates an empty in-memory index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FlatInner {
                records: Vec::new(),
                ids: HashSet::new(),
                dimension: None,
                persistence: None,
            }),
        }
    }

    /// Creates an index backed by `store`, loading every record it holds.
    pub fn with_store(mut store: Box<dyn RecordStore>) -> Result<Self, StoreError> {
        let records = store.scan()?;
        let index = Self::new();
        {
            let mut inner = index.inner.write();
            inner.dimension = store.dimension();
            for record in records {
                if !inner.ids.insert(record.id().clone()) {
                    return Err(StoreError::InvalidFormat(format!(
                        "Record '{}' is stored twice",
                        record.id()
                    )));
                }
                if let Some(dimension) = inner.dimension {
                    dimension.validate_vector(record.vector())?;
                }
                inner.records.push(record);
            }
            inner.persistence = Some(Persistence {
                store,
                metadata: None,
            });
        }
        Ok(index)
    }

    /// Opens (or creates) the on-disk store at `path` for vectors from `model_name`.
    ///
    /// Fails with [`StoreError::ModelMismatch`] when the store was written by a
    /// different embedding model, since those vectors are not comparable.
    pub fn open(path: &Path, model_name: &str) -> Result<Self, StoreError> {
        let store = MmapRecordStore::open_or_create(path)?;

        let metadata = if StoreMetadata::exists(path) {
            let metadata = StoreMetadata::load(path)?;
            if metadata.model_name != model_name {
                return Err(StoreError::ModelMismatch {
                    stored: metadata.model_name,
                    configured: model_name.to_string(),
                });
            }
            metadata
        } else {
            let metadata = StoreMetadata::new(
                model_name.to_string(),
                store.dimension().map_or(0, |d| d.get()),
                store.len(),
            );
            metadata.save(path)?;
            metadata
        };

        let index = Self::with_store(Box::new(store))?;
        {
            let mut inner = index.inner.write();
            let count = inner.records.len();
            if let Some(persistence) = inner.persistence.as_mut() {
                persistence.metadata = Some((path.to_path_buf(), metadata));
            }
            tracing::info!(
                "Opened store at {} with {} records (model {})",
                path.display(),
                count,
                model_name
            );
        }
        Ok(index)
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&self, record: VectorRecord) -> Result<(), InsertError> {
        let mut inner = self.inner.write();

        if inner.ids.contains(record.id()) {
            return Err(InsertError::DuplicateId {
                id: record.id().clone(),
            });
        }

        let dimension = match inner.dimension {
            Some(dimension) => {
                dimension.validate_vector(record.vector())?;
                dimension
            }
            None => VectorDimension::new(record.dimension())?,
        };
        ensure_finite(record.vector())?;

        if let Some(persistence) = inner.persistence.as_mut() {
            persistence.store.put(&record)?;

            let count = persistence.store.len();
            if let Some((path, metadata)) = persistence.metadata.as_mut() {
                metadata.update(dimension.get(), count);
                if let Err(e) = metadata.save(path) {
                    // The record file is authoritative, metadata only lags behind
                    tracing::warn!("Failed to update store metadata: {e}");
                }
            }
        }

        inner.dimension = Some(dimension);
        inner.ids.insert(record.id().clone());
        inner.records.push(record);
        Ok(())
    }

    fn query_nearest(
        &self,
        vector: &[f32],
        k: usize,
        policy: RankingPolicy,
    ) -> Result<Vec<Ranked>, QueryError> {
        let inner = self.inner.read();

        let dimension = match inner.dimension {
            Some(dimension) if !inner.records.is_empty() => dimension,
            _ if policy.allows_empty_result() => return Ok(Vec::new()),
            _ => return Err(QueryError::EmptyIndex),
        };
        validate_query(dimension, vector)?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let score = |(sequence, record): (usize, &VectorRecord)| {
            (sequence, policy.score(vector, record.vector()))
        };
        let mut scored: Vec<(usize, f32)> = if inner.records.len() >= PARALLEL_SCAN_THRESHOLD {
            inner.records.par_iter().enumerate().map(score).collect()
        } else {
            inner.records.iter().enumerate().map(score).collect()
        };

        scored.retain(|(_, s)| policy.accepts(*s));
        scored.sort_by(|a, b| policy.compare(a.1, b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(sequence, score)| Ranked {
                record: inner.records[sequence].clone(),
                score,
            })
            .collect())
    }

    fn contains(&self, id: &RecordId) -> bool {
        self.inner.read().ids.contains(id)
    }

    fn dimension(&self) -> Option<VectorDimension> {
        self.inner.read().dimension
    }

    fn len(&self) -> usize {
        self.inner.read().records.len()
    }
}
