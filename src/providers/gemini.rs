//! Google Gemini API client for captions and embeddings.
//!
//! Uses the `generateContent` and `embedContent` REST methods of the
//! `v1beta` API. Images are sent inline as base64.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{CaptionGenerator, CollaboratorError, EmbeddingGenerator, EmbeddingPurpose};

/// Default base URL of the Gemini REST API.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Shared HTTP plumbing for Gemini calls.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiClient {
    pub fn new(endpoint: &str, api_key: impl Into<String>) -> Result<Self, CollaboratorError> {
        let http = Client::builder()
            .user_agent(concat!("photofind/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn method_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.endpoint)
    }

    async fn call<B, R>(&self, model: &str, method: &str, body: &B) -> Result<R, CollaboratorError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(model, method))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CollaboratorError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| CollaboratorError::Transport(format!("Failed to parse response: {e}")))
    }
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Part {
    Text(String),
    InlineData { mime_type: String, data: String },
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> Result<String, CollaboratorError> {
        let content = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or(CollaboratorError::EmptyResponse("candidates"))?;

        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        if text.is_empty() {
            return Err(CollaboratorError::EmptyResponse("text"));
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

impl EmbedContentResponse {
    fn into_values(self) -> Result<Vec<f32>, CollaboratorError> {
        match self.embedding {
            Some(embedding) if !embedding.values.is_empty() => Ok(embedding.values),
            _ => Err(CollaboratorError::EmptyResponse("embedding")),
        }
    }
}

fn task_type(purpose: EmbeddingPurpose) -> &'static str {
    match purpose {
        EmbeddingPurpose::Document => "RETRIEVAL_DOCUMENT",
        EmbeddingPurpose::Query => "RETRIEVAL_QUERY",
    }
}

/// Image captioning through a multimodal Gemini model.
#[derive(Debug, Clone)]
pub struct GeminiCaptioner {
    client: GeminiClient,
    model: String,
    prompt: String,
}

impl GeminiCaptioner {
    pub fn new(client: GeminiClient, model: String, prompt: String) -> Self {
        Self {
            client,
            model,
            prompt,
        }
    }

    fn request(&self, image: &[u8], mime: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text(self.prompt.clone()),
                    Part::InlineData {
                        mime_type: mime.to_string(),
                        data: BASE64.encode(image),
                    },
                ],
            }],
        }
    }
}

#[async_trait]
impl CaptionGenerator for GeminiCaptioner {
    async fn describe(&self, image: &[u8], mime: &str) -> Result<String, CollaboratorError> {
        let request = self.request(image, mime);
        let response: GenerateContentResponse = self
            .client
            .call(&self.model, "generateContent", &request)
            .await?;
        response.into_text()
    }
}

/// Text embeddings through the Gemini embedding model.
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(client: GeminiClient, model: String) -> Self {
        Self { client, model }
    }

    fn request(&self, text: &str, purpose: EmbeddingPurpose) -> EmbedContentRequest {
        EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part::Text(text.to_string())],
            },
            task_type: task_type(purpose),
        }
    }
}

#[async_trait]
impl EmbeddingGenerator for GeminiEmbedder {
    async fn embed(
        &self,
        text: &str,
        purpose: EmbeddingPurpose,
    ) -> Result<Vec<f32>, CollaboratorError> {
        let request = self.request(text, purpose);
        let response: EmbedContentResponse = self
            .client
            .call(&self.model, "embedContent", &request)
            .await?;
        response.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> GeminiClient {
        GeminiClient::new("https://example.invalid/v1beta/", "test-key").unwrap()
    }

    #[test]
    fn test_method_url() {
        let client = client();
        assert_eq!(
            client.method_url("embedding-001", "embedContent"),
            "https://example.invalid/v1beta/models/embedding-001:embedContent"
        );
    }

    #[test]
    fn test_caption_request_body() {
        let captioner = GeminiCaptioner::new(
            client(),
            "gemini-1.5-pro".to_string(),
            "Describe this image in detail".to_string(),
        );
        let body = serde_json::to_value(captioner.request(b"abc", "image/png")).unwrap();

        assert_eq!(
            body,
            json!({
                "contents": [{
                    "parts": [
                        { "text": "Describe this image in detail" },
                        { "inline_data": { "mime_type": "image/png", "data": "YWJj" } }
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_embed_request_body() {
        let embedder = GeminiEmbedder::new(client(), "embedding-001".to_string());

        let body = serde_json::to_value(embedder.request("red car", EmbeddingPurpose::Document))
            .unwrap();
        assert_eq!(body["model"], "models/embedding-001");
        assert_eq!(body["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(body["content"]["parts"][0]["text"], "red car");

        let body =
            serde_json::to_value(embedder.request("red car", EmbeddingPurpose::Query)).unwrap();
        assert_eq!(body["taskType"], "RETRIEVAL_QUERY");
    }

    #[test]
    fn test_caption_response_parsing() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "A cat " }, { "text": "on a sofa" }] }
            }]
        }))
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "A cat on a sofa");

        let blocked: GenerateContentResponse =
            serde_json::from_value(json!({ "promptFeedback": {} })).unwrap();
        assert_eq!(
            blocked.into_text(),
            Err(CollaboratorError::EmptyResponse("candidates"))
        );
    }

    #[test]
    fn test_embed_response_parsing() {
        let response: EmbedContentResponse =
            serde_json::from_value(json!({ "embedding": { "values": [0.5, -0.25] } })).unwrap();
        assert_eq!(response.into_values().unwrap(), vec![0.5, -0.25]);

        let empty: EmbedContentResponse =
            serde_json::from_value(json!({ "embedding": { "values": [] } })).unwrap();
        assert!(empty.into_values().is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("test-key"));
    }
}
