//! Ingestion stage error types

use paperlink_common::errors::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Invalid input {path}: {message}")]
    InvalidInput { path: String, message: String },

    #[error("Chunk in section {section_id} resolved block {block_id} it does not own")]
    ContainmentViolation { section_id: Uuid, block_id: String },

    #[error("Invariant violated in document {doc_id}: {message}")]
    InvariantViolation { doc_id: String, message: String },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IngestionError {
    /// The document's graph is inconsistent and must not be persisted
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestionError::ContainmentViolation { .. } | IngestionError::InvariantViolation { .. }
        )
    }
}

impl From<AppError> for IngestionError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::InvariantViolation { doc_id, message } => {
                IngestionError::InvariantViolation { doc_id, message }
            }
            AppError::InvalidFormat { message } => IngestionError::InvalidInput {
                path: String::new(),
                message,
            },
            AppError::Configuration { message } => IngestionError::ConfigError(message),
            AppError::NotFound { id, .. } => IngestionError::FileNotFound(id),
            other => IngestionError::StorageError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_violation_stays_fatal() {
        let err: IngestionError = AppError::invariant("doc-1", "duplicate chunk id").into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("doc-1"));

        let err: IngestionError = AppError::Storage {
            path: "out/doc-1/graph.json".into(),
            message: "disk full".into(),
        }
        .into();
        assert!(!err.is_fatal());
    }
}
