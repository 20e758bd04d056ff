//! The stored unit of the index: identity, embedding and payload.

use crate::vector::types::{RecordId, VectorError, ensure_finite};
use serde::{Deserialize, Serialize};

/// Metadata carried alongside a vector. The index never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Locator of the original item, as it was given to ingestion
    pub source: String,

    /// Generated natural-language description of the item
    pub description: String,
}

/// A single record: identity, embedding vector and payload.
///
/// Records are immutable once built. Construction rejects empty and
/// non-finite vectors so every record that reaches an index is valid apart
/// from its dimensionality, which only the index can check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    id: RecordId,
    vector: Vec<f32>,
    payload: Payload,
}

impl VectorRecord {
    /// Builds a record, validating the vector components.
    pub fn new(id: RecordId, vector: Vec<f32>, payload: Payload) -> Result<Self, VectorError> {
        if vector.is_empty() {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        ensure_finite(&vector)?;
        Ok(Self {
            id,
            vector,
            payload,
        })
    }

    #[must_use]
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    #[must_use]
    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Number of components in the vector.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// A record paired with its score for one query.
///
/// `score` is a cosine similarity or a Euclidean distance depending on the
/// ranking policy that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked {
    pub record: VectorRecord,
    pub score: f32,
}
