//! Type-safe wrappers and core types for the vector index.
//!
//! Newtypes keep record identities and dimensions from being confused with
//! plain strings and integers. Every fallible constructor validates its input
//! so the index can rely on the invariants downstream.

use std::fmt;
use thiserror::Error;

/// Stable identity of a stored record.
///
/// Derived from the source file name at ingestion time. Never empty and never
/// changed after the record is inserted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Creates a new `RecordId`.
    ///
    /// Returns an error if the id is empty or only whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, VectorError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(VectorError::InvalidRecordId {
                id,
                reason: "Record id cannot be empty",
            });
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RecordId {
    type Error = VectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent dimension
/// mismatches during insert and query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Upper bound accepted for a single embedding.
    pub const MAX: usize = 65_536;

    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero or unreasonably large.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        if dim > Self::MAX {
            return Err(VectorError::InvalidDimension {
                dimension: dim,
                reason: "Vector dimension exceeds the supported maximum of 65536",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checks that every component of `vector` is finite.
///
/// Returns the position of the first NaN or infinite component as an error.
pub fn ensure_finite(vector: &[f32]) -> Result<(), VectorError> {
    match vector.iter().position(|value| !value.is_finite()) {
        Some(position) => Err(VectorError::InvalidVector {
            position,
            value: vector[position],
        }),
        None => Ok(()),
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Vector component {position} is not finite ({value})\nSuggestion: Check the embedding provider output"
    )]
    InvalidVector { position: usize, value: f32 },

    #[error("Invalid record id '{id}'\nReason: {reason}")]
    InvalidRecordId { id: String, reason: &'static str },
}
