//! Error types for PaperLink pipeline stages
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - Severity classification (fatal per document vs. recoverable per entity)
//! - Error codes for machine handling

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Resource errors (4xxx)
    NotFound,
    SectionNotFound,
    ChunkNotFound,
    ImageNotFound,

    // Document integrity errors (5xxx)
    InvariantViolation,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    EmbeddingTimeout,
    EmbeddingUnavailable,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    StorageError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::SectionNotFound => 4002,
            ErrorCode::ChunkNotFound => 4003,
            ErrorCode::ImageNotFound => 4004,

            // Integrity (5xxx)
            ErrorCode::InvariantViolation => 5001,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::EmbeddingTimeout => 8003,
            ErrorCode::EmbeddingUnavailable => 8004,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::StorageError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    // Document integrity
    #[error("Invariant violated in document {doc_id}: {message}")]
    InvariantViolation { doc_id: String, message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("Embedding unavailable for {entity}: {message}")]
    EmbeddingUnavailable { entity: String, message: String },

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error at {path}: {message}")]
    Storage { path: String, message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for an invariant violation on a document
    pub fn invariant(doc_id: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::InvariantViolation {
            doc_id: doc_id.into(),
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::NotFound { resource_type, .. } => match resource_type.as_str() {
                "section" => ErrorCode::SectionNotFound,
                "chunk" => ErrorCode::ChunkNotFound,
                "image" => ErrorCode::ImageNotFound,
                _ => ErrorCode::NotFound,
            },
            AppError::InvariantViolation { .. } => ErrorCode::InvariantViolation,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::EmbeddingUnavailable { .. } => ErrorCode::EmbeddingUnavailable,
            AppError::Upstream { .. } | AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether this error must abort the current document's run
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::InvariantViolation { .. })
    }

    /// Whether this error only excludes a single entity from matching
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::EmbeddingError { .. }
                | AppError::EmbeddingTimeout { .. }
                | AppError::EmbeddingUnavailable { .. }
                | AppError::Upstream { .. }
                | AppError::HttpClient(_)
        )
    }

    /// Whether a retry of the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::EmbeddingTimeout { .. } => true,
            AppError::Upstream { status, .. } => *status == 429 || *status >= 500,
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::NotFound {
            resource_type: "chunk".into(),
            id: "c1".into(),
        };
        assert_eq!(err.code(), ErrorCode::ChunkNotFound);
        assert_eq!(err.code().as_code(), 4003);
    }

    #[test]
    fn test_invariant_violation_is_fatal() {
        let err = AppError::invariant("doc-1", "chunk spans two sections");
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
        assert_eq!(err.code(), ErrorCode::InvariantViolation);
        assert!(err.to_string().contains("doc-1"));
    }

    #[test]
    fn test_embedding_failure_is_recoverable() {
        let err = AppError::EmbeddingUnavailable {
            entity: "image img-3".into(),
            message: "provider returned 503".into(),
        };
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
        assert!(!err.is_transient());

        let timeout = AppError::EmbeddingTimeout { timeout_ms: 30_000 };
        assert!(timeout.is_transient());

        let throttled = AppError::Upstream { status: 429, message: "slow down".into() };
        assert!(throttled.is_transient());
        let rejected = AppError::Upstream { status: 400, message: "bad image".into() };
        assert!(!rejected.is_transient());
    }
}
