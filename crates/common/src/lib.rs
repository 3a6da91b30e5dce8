//! PaperLink Common Library
//!
//! Shared code for the PaperLink pipeline stages including:
//! - Document model (blocks, section tree, chunks, images)
//! - Embedding provider abstraction
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability
//! - Document graph persistence

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod storage;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::EmbeddingProvider;
pub use errors::{AppError, Result};
pub use models::{
    BlockKind, ContentBlock, DocumentGraph, FineChunk, ImageAsset, ParsedDocument, SectionNode,
    SectionTree, StructuralAnomaly,
};
pub use storage::ArtifactStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default chunk window size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between adjacent chunks in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Default score a link candidate must exceed to be confirmed
pub const DEFAULT_LINK_THRESHOLD: f32 = 0.25;
