//! Configuration management for PaperLink stages
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    /// Section-tree construction
    #[serde(default)]
    pub tree: TreeConfig,

    /// Hierarchical chunking
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Image-text linking
    #[serde(default)]
    pub linking: LinkingConfig,

    /// Embedding provider
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Document graph persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// What happens to blocks that appear before the first header
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreamblePolicy {
    /// Keep them in the synthetic root's own blocks
    #[default]
    Root,
    /// Collect them into a synthetic level-1 "Preamble" section
    Section,
    /// Discard them (reported as an anomaly)
    Drop,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TreeConfig {
    /// Handling of content preceding the first header
    #[serde(default)]
    pub preamble: PreamblePolicy,

    /// Header titles are truncated to this many characters
    #[serde(default = "default_max_title_chars")]
    pub max_title_chars: usize,
}

/// Configuration for text chunking
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between adjacent chunks of a section in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkingConfig {
    /// Weight of image-to-chunk similarity
    #[serde(default = "default_image_weight")]
    pub image_weight: f32,

    /// Weight of caption-to-chunk similarity
    #[serde(default = "default_caption_weight")]
    pub caption_weight: f32,

    /// Score a winner must strictly exceed
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Page distance used when same-page/same-section yields nothing
    #[serde(default = "default_page_window")]
    pub page_window: u32,

    /// Captions with fewer words are regenerated
    #[serde(default = "default_min_caption_words")]
    pub min_caption_words: usize,

    /// Maximum in-flight provider calls per document
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Length of the chunk snippet in the audit summary
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: http, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the inference server
    pub api_key: Option<String>,

    /// API base URL
    pub api_base: Option<String>,

    /// Model used for retrieval text embeddings
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Model shared by images, captions and chunk matching text
    #[serde(default = "default_matching_model")]
    pub matching_model: String,

    /// Model used to generate captions
    #[serde(default = "default_caption_model")]
    pub caption_model: String,

    /// Embedding dimension (mock provider)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Client-side request rate
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Client-side burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory receiving one sub-directory per processed document
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Base directory for relative image paths
    #[serde(default = "default_image_root")]
    pub image_root: String,

    /// Documents processed concurrently in directory mode
    #[serde(default = "default_document_concurrency")]
    pub document_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,
}

// Default value functions
fn default_max_title_chars() -> usize { 200 }
fn default_chunk_size() -> usize { crate::DEFAULT_CHUNK_SIZE }
fn default_chunk_overlap() -> usize { crate::DEFAULT_CHUNK_OVERLAP }
fn default_image_weight() -> f32 { 0.7 }
fn default_caption_weight() -> f32 { 0.3 }
fn default_threshold() -> f32 { crate::DEFAULT_LINK_THRESHOLD }
fn default_page_window() -> u32 { 1 }
fn default_min_caption_words() -> usize { 3 }
fn default_max_concurrency() -> usize { 8 }
fn default_snippet_chars() -> usize { 200 }
fn default_embedding_provider() -> String { "http".to_string() }
fn default_text_model() -> String { "BAAI/bge-large-en-v1.5".to_string() }
fn default_matching_model() -> String { "google/siglip-so400m-patch14-384".to_string() }
fn default_caption_model() -> String { "Salesforce/blip-image-captioning-large".to_string() }
fn default_embedding_dimension() -> usize { 768 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_requests_per_second() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_output_dir() -> String { "data/processed".to_string() }
fn default_image_root() -> String { ".".to_string() }
fn default_document_concurrency() -> usize { 4 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            preamble: PreamblePolicy::default(),
            max_title_chars: default_max_title_chars(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    /// Budget for a split piece before the backward overlap is added
    pub fn piece_budget(&self) -> usize {
        if self.chunk_overlap < self.chunk_size {
            self.chunk_size - self.chunk_overlap
        } else {
            (self.chunk_size / 2).max(1)
        }
    }
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            image_weight: default_image_weight(),
            caption_weight: default_caption_weight(),
            threshold: default_threshold(),
            page_window: default_page_window(),
            min_caption_words: default_min_caption_words(),
            max_concurrency: default_max_concurrency(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            text_model: default_text_model(),
            matching_model: default_matching_model(),
            caption_model: default_caption_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
        }
    }
}

impl EmbeddingConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            image_root: default_image_root(),
            document_concurrency: default_document_concurrency(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__LINKING__THRESHOLD=0.3
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Message(
                "chunking.chunk_size must be positive".to_string(),
            ));
        }
        if self.linking.max_concurrency == 0 {
            return Err(ConfigError::Message(
                "linking.max_concurrency must be positive".to_string(),
            ));
        }
        if self.linking.image_weight < 0.0 || self.linking.caption_weight < 0.0 {
            return Err(ConfigError::Message(
                "linking weights must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
