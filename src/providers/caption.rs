use async_trait::async_trait;

use super::CollaboratorError;

/// Turns raw image bytes into a natural-language description.
///
/// Implementations may return whitespace-only text; the ingestion pipeline
/// treats that as a failed description.
#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    /// Describes the image. `mime` is the media type derived from the file extension.
    async fn describe(&self, image: &[u8], mime: &str) -> Result<String, CollaboratorError>;
}
