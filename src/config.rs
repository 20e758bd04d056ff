//! Configuration module for the image retrieval engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PF_` and use double underscores
//! to separate nested levels:
//! - `PF_RANKING__POLICY=threshold` sets `ranking.policy`
//! - `PF_INGESTION__CONCURRENCY=8` sets `ingestion.concurrency`
//! - `PF_EMBEDDING__PROVIDER=fastembed` sets `embedding.provider`
//!
//! The API key is never read from the settings file. It comes from
//! `PF_API_KEY`, falling back to `API_KEY`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::providers::DEFAULT_ENDPOINT;
use crate::vector::{DEFAULT_MAX_DISTANCE, RankingPolicy};

/// Directory holding the settings file and, by default, the store.
pub const CONFIG_DIR: &str = ".photofind";

/// Settings file name inside [`CONFIG_DIR`].
pub const SETTINGS_FILE: &str = "settings.toml";

/// Environment variables checked for the API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["PF_API_KEY", "API_KEY"];

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory of the persistent record store
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Workspace root directory (where .photofind is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub caption: CaptionConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestionConfig {
    /// Image files or directories ingested on every run
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Maximum number of images processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaptionProvider {
    Gemini,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptionConfig {
    #[serde(default = "default_caption_provider")]
    pub provider: CaptionProvider,

    /// Multimodal model that describes images
    #[serde(default = "default_caption_model")]
    pub model: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Instruction sent along with every image
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_caption_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Gemini,
    Fastembed,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    /// Model producing document and query vectors
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Cosine,
    Threshold,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_policy")]
    pub policy: PolicyKind,

    /// Euclidean distance cutoff for the threshold policy
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,

    /// Number of matches returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct QueryConfig {
    /// Log the query embedding and every ranked candidate
    #[serde(default = "default_false")]
    pub verbose: bool,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_store_path() -> PathBuf {
    PathBuf::from(".photofind/store")
}
fn default_false() -> bool {
    false
}
fn default_concurrency() -> usize {
    4
}
fn default_caption_provider() -> CaptionProvider {
    CaptionProvider::Gemini
}
fn default_caption_model() -> String {
    "gemini-1.5-pro".to_string()
}
fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}
fn default_prompt() -> String {
    "Describe this image in detail".to_string()
}
fn default_caption_timeout() -> u64 {
    60
}
fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Gemini
}
fn default_embedding_model() -> String {
    "embedding-001".to_string()
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_policy() -> PolicyKind {
    PolicyKind::Cosine
}
fn default_max_distance() -> f32 {
    DEFAULT_MAX_DISTANCE
}
fn default_top_k() -> usize {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            store_path: default_store_path(),
            workspace_root: None,
            debug: false,
            ingestion: IngestionConfig::default(),
            caption: CaptionConfig::default(),
            embedding: EmbeddingConfig::default(),
            ranking: RankingConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            provider: default_caption_provider(),
            model: default_caption_model(),
            endpoint: default_endpoint(),
            prompt: default_prompt(),
            timeout_secs: default_caption_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            max_distance: default_max_distance(),
            top_k: default_top_k(),
        }
    }
}

impl EmbeddingConfig {
    /// Provider-qualified model name recorded in the store metadata.
    #[must_use]
    pub fn qualified_model(&self) -> String {
        let provider = match self.provider {
            EmbeddingProvider::Gemini => "gemini",
            EmbeddingProvider::Fastembed => "fastembed",
        };
        format!("{provider}/{}", self.model)
    }
}

impl RankingConfig {
    /// The ranking policy these settings select.
    #[must_use]
    pub fn policy(&self) -> RankingPolicy {
        match self.policy {
            PolicyKind::Cosine => RankingPolicy::Cosine,
            PolicyKind::Threshold => RankingPolicy::Threshold {
                max_distance: self.max_distance,
            },
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .photofind directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| Path::new(CONFIG_DIR).join(SETTINGS_FILE));

        Self::layered(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        let path = path.as_ref();
        Self::layered(path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::root_for_file(path);
                }
                settings
            })
    }

    /// Workspace root for an explicitly given settings file: the parent of its
    /// `.photofind` directory, or else the directory holding the file.
    fn root_for_file(path: &Path) -> Option<PathBuf> {
        let dir = path.parent()?;
        if dir.file_name().is_some_and(|name| name == CONFIG_DIR) {
            dir.parent().map(Path::to_path_buf)
        } else {
            Some(dir.to_path_buf())
        }
    }

    fn layered(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Layer in environment variables with PF_ prefix
            // Use double underscore (__) to separate nested levels
            .merge(Env::prefixed("PF_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Find the settings file by looking for a .photofind directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Get the workspace root directory (where .photofind is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Store directory, resolved against the workspace root when relative.
    #[must_use]
    pub fn resolved_store_path(&self) -> PathBuf {
        match &self.workspace_root {
            Some(root) if self.store_path.is_relative() => root.join(&self.store_path),
            _ => self.store_path.clone(),
        }
    }

    /// API key from the environment, if any.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        API_KEY_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.trim().is_empty())
    }

    /// Checks values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<(), String> {
        if self.ingestion.concurrency == 0 {
            return Err("ingestion.concurrency must be at least 1".to_string());
        }
        if self.ranking.top_k == 0 {
            return Err("ranking.top_k must be at least 1".to_string());
        }
        if !self.ranking.max_distance.is_finite() || self.ranking.max_distance < 0.0 {
            return Err(format!(
                "ranking.max_distance must be a non-negative number, got {}",
                self.ranking.max_distance
            ));
        }
        if self.caption.timeout_secs == 0 || self.embedding.timeout_secs == 0 {
            return Err("timeout_secs must be at least 1".to_string());
        }
        if self.embedding.model.trim().is_empty() {
            return Err("embedding.model cannot be empty".to_string());
        }
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments under `dir`
    pub fn init_config_file(dir: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = dir.join(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# photofind configuration file

# Version of the configuration schema
version = 1

# Directory of the record store (relative to the workspace root)
store_path = ".photofind/store"

# Global debug mode
debug = false

[ingestion]
# Image files or directories ingested on every run
sources = []

# Maximum number of images captioned and embedded at once
concurrency = {concurrency}

[caption]
# Captioning provider: "gemini"
provider = "gemini"
model = "{caption_model}"
endpoint = "{endpoint}"
prompt = "{prompt}"
timeout_secs = {caption_timeout}

[embedding]
# Embedding provider: "gemini" (remote) or "fastembed" (local, e.g. model = "AllMiniLML6V2")
# Changing the model requires a fresh store_path
provider = "gemini"
model = "{embedding_model}"
endpoint = "{endpoint}"
timeout_secs = {embedding_timeout}

[ranking]
# "cosine" always returns the closest image
# "threshold" returns only images within max_distance (Euclidean, lower is closer)
policy = "cosine"
max_distance = {max_distance}

# Number of matches shown per query
top_k = 1

[query]
# Log the query embedding and every ranked candidate
verbose = false

# The API key is read from the PF_API_KEY (or API_KEY) environment variable
"#,
            concurrency = default_concurrency(),
            caption_model = default_caption_model(),
            endpoint = DEFAULT_ENDPOINT,
            prompt = default_prompt(),
            caption_timeout = default_caption_timeout(),
            embedding_model = default_embedding_model(),
            embedding_timeout = default_embedding_timeout(),
            max_distance = DEFAULT_MAX_DISTANCE,
        );

        std::fs::write(&config_path, template)?;

        Ok(config_path)
    }
}
