//! Resolving ingestion sources into image files.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::vector::{RecordId, VectorError};

/// File extensions treated as images, lowercase.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "heic", "heif"];

/// Media type for an image path, judged by extension.
#[must_use]
pub fn mime_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => return None,
    };
    Some(mime)
}

/// Record id for an image: its file name.
pub fn record_id_for(path: &Path) -> Result<RecordId, VectorError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    RecordId::new(name)
}

/// Expands sources into individual files.
///
/// Directories are walked recursively for image files and contribute them
/// in sorted order. Anything else is passed through unchanged so that
/// ingestion can report it as unavailable.
#[must_use]
pub fn expand_sources(sources: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for source in sources {
        if !source.is_dir() {
            files.push(source.clone());
            continue;
        }

        let mut found: Vec<PathBuf> = WalkDir::new(source)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {e}", source.display());
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| mime_for(path).is_some())
            .collect();
        found.sort();

        tracing::debug!("Found {} images under {}", found.len(), source.display());
        files.extend(found);
    }

    files
}
