//! Metadata tracking for store persistence.
//!
//! Records which embedding model produced the stored vectors, their
//! dimension and count, so a store is never queried with vectors from a
//! different model.

use crate::vector::storage::StoreError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the metadata sidecar inside the store directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Metadata for store persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Name of the embedding model used
    pub model_name: String,

    /// Dimension of embeddings, zero until the first record is stored
    pub dimension: usize,

    /// Number of records stored
    pub record_count: usize,

    /// Unix timestamp when created
    pub created_at: u64,

    /// Unix timestamp when last updated
    pub updated_at: u64,

    /// Version of the metadata format
    pub version: u32,
}

fn now() -> u64 {
    Utc::now().timestamp() as u64
}

impl StoreMetadata {
    /// Current metadata version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create new metadata with current timestamp
    pub fn new(model_name: String, dimension: usize, record_count: usize) -> Self {
        let now = now();
        Self {
            model_name,
            dimension,
            record_count,
            created_at: now,
            updated_at: now,
            version: Self::CURRENT_VERSION,
        }
    }

    /// Update the metadata with new dimension, record count and timestamp
    pub fn update(&mut self, dimension: usize, record_count: usize) {
        self.dimension = dimension;
        self.record_count = record_count;
        self.updated_at = now();
    }

    /// Save metadata to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Serialization(format!("Failed to serialize metadata: {e}")))?;

        std::fs::create_dir_all(path)?;
        std::fs::write(path.join(METADATA_FILE), json)?;

        Ok(())
    }

    /// Load metadata from a JSON file
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path.join(METADATA_FILE))?;

        let metadata: Self = serde_json::from_str(&json).map_err(|e| {
            StoreError::Serialization(format!(
                "Failed to parse metadata: {e}. The metadata file may be corrupted"
            ))
        })?;

        if metadata.version > Self::CURRENT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                actual: metadata.version,
            });
        }

        Ok(metadata)
    }

    /// Check if metadata file exists
    pub fn exists(path: &Path) -> bool {
        path.join(METADATA_FILE).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_save_and_load() {
        let temp_dir = TempDir::new().unwrap();

        let metadata = StoreMetadata::new("gemini/embedding-001".to_string(), 768, 12);
        metadata.save(temp_dir.path()).unwrap();

        let loaded = StoreMetadata::load(temp_dir.path()).unwrap();
        assert_eq!(loaded, metadata);
        assert_eq!(loaded.version, StoreMetadata::CURRENT_VERSION);
    }

    #[test]
    fn test_metadata_update() {
        let mut metadata = StoreMetadata::new("TestModel".to_string(), 0, 0);
        let created = metadata.created_at;

        metadata.update(384, 3);

        assert_eq!(metadata.dimension, 384);
        assert_eq!(metadata.record_count, 3);
        assert!(metadata.updated_at >= created);
        assert_eq!(metadata.created_at, created);
    }

    #[test]
    fn test_metadata_exists() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!StoreMetadata::exists(temp_dir.path()));

        StoreMetadata::new("Test".to_string(), 10, 0)
            .save(temp_dir.path())
            .unwrap();
        assert!(StoreMetadata::exists(temp_dir.path()));
    }

    #[test]
    fn test_version_compatibility() {
        let temp_dir = TempDir::new().unwrap();
        let future_metadata = r#"{
            "model_name": "FutureModel",
            "dimension": 512,
            "record_count": 0,
            "created_at": 1735689600,
            "updated_at": 1735689600,
            "version": 999
        }"#;
        std::fs::write(temp_dir.path().join(METADATA_FILE), future_metadata).unwrap();

        let result = StoreMetadata::load(temp_dir.path());
        assert!(matches!(
            result,
            Err(StoreError::VersionMismatch { actual: 999, .. })
        ));
    }
}
