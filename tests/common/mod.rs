//! Shared fixtures for integration tests.
//!
//! The fake collaborators are deterministic: a "photo" here is a small file
//! whose bytes are its own description, and embeddings count words from a
//! fixed vocabulary.

#![allow(dead_code)]

use async_trait::async_trait;
use photofind::providers::{
    CaptionGenerator, CollaboratorError, EmbeddingGenerator, EmbeddingPurpose,
};
use photofind::vector::{Payload, RecordId, VectorRecord};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Words the fake embedder knows, one vector component each.
pub const VOCABULARY: [&str; 5] = ["dog", "cat", "beach", "sunset", "car"];

/// A temporary directory of fake images.
pub struct TestAlbum {
    pub dir: TempDir,
}

impl TestAlbum {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Writes an "image" whose content is the caption the fake captioner returns.
    pub fn add_image(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&path, content).expect("Failed to write image");
        path
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Captioner that returns the file content as the description.
///
/// Content containing "corrupt" fails with an API error.
#[derive(Default)]
pub struct FileCaptioner {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CaptionGenerator for FileCaptioner {
    async fn describe(&self, image: &[u8], _mime: &str) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = String::from_utf8_lossy(image).into_owned();
        if text.contains("corrupt") {
            return Err(CollaboratorError::Api {
                status: 400,
                body: "Unable to process input image".to_string(),
            });
        }
        Ok(text)
    }
}

/// Embedder that counts vocabulary words, plus a constant bias component
/// so no vector is ever zero.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn vector_for(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| text.matches(word).count() as f32)
            .collect();
        vector.push(0.1);
        vector
    }
}

#[async_trait]
impl EmbeddingGenerator for KeywordEmbedder {
    async fn embed(
        &self,
        text: &str,
        _purpose: EmbeddingPurpose,
    ) -> Result<Vec<f32>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector_for(text))
    }
}

/// Embedder that always fails, for query error paths.
pub struct UnreachableEmbedder;

#[async_trait]
impl EmbeddingGenerator for UnreachableEmbedder {
    async fn embed(
        &self,
        _text: &str,
        _purpose: EmbeddingPurpose,
    ) -> Result<Vec<f32>, CollaboratorError> {
        Err(CollaboratorError::Transport("connection refused".to_string()))
    }
}

/// Builds a record with a payload derived from its id.
pub fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
    VectorRecord::new(
        RecordId::new(id).expect("valid id"),
        vector,
        Payload {
            source: format!("/photos/{id}"),
            description: format!("description of {id}"),
        },
    )
    .expect("valid record")
}

pub fn id(value: &str) -> RecordId {
    RecordId::new(value).expect("valid id")
}
