//! Linker error types

use paperlink_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkerError {
    #[error("Invariant violated in document {doc_id}: {message}")]
    InvariantViolation { doc_id: String, message: String },

    #[error("Invalid document graph {path}: {message}")]
    InvalidGraph { path: String, message: String },

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LinkerError {
    /// The document must not be persisted
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkerError::InvariantViolation { .. })
    }
}

impl From<AppError> for LinkerError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::InvariantViolation { doc_id, message } => {
                LinkerError::InvariantViolation { doc_id, message }
            }
            AppError::InvalidFormat { message } => LinkerError::InvalidGraph {
                path: String::new(),
                message,
            },
            AppError::Configuration { message } => LinkerError::ConfigError(message),
            e if e.is_recoverable() => LinkerError::EmbeddingFailed(e.to_string()),
            other => LinkerError::StorageError(other.to_string()),
        }
    }
}
