//! On-disk persistence for pipeline artifacts
//!
//! Layout under the output directory:
//! ```text
//! <output_dir>/<doc_id>/graph.json
//! <output_dir>/<doc_id>/multimodal_summary.json
//! ```
//! Every write goes to a temporary sibling first and is renamed into place.

use crate::errors::{AppError, Result};
use crate::models::{DocumentGraph, ParsedDocument};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const GRAPH_FILE: &str = "graph.json";
pub const SUMMARY_FILE: &str = "multimodal_summary.json";

/// Per-document artifact store rooted at an output directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_dir(&self, doc_id: &str) -> Result<PathBuf> {
        if doc_id.is_empty()
            || doc_id == "."
            || doc_id == ".."
            || doc_id.contains(|c: char| c == '/' || c == '\\')
        {
            return Err(AppError::Validation {
                message: format!("document id '{}' cannot be used as a directory name", doc_id),
                field: Some("doc_id".to_string()),
            });
        }
        Ok(self.root.join(doc_id))
    }

    pub async fn save_graph(&self, graph: &DocumentGraph) -> Result<PathBuf> {
        let path = self.document_dir(&graph.doc_id)?.join(GRAPH_FILE);
        write_json_atomic(&path, graph).await?;
        Ok(path)
    }

    pub async fn load_graph(&self, doc_id: &str) -> Result<DocumentGraph> {
        let path = self.document_dir(doc_id)?.join(GRAPH_FILE);
        read_json(&path).await
    }

    pub async fn save_summary<T: Serialize>(&self, doc_id: &str, summary: &T) -> Result<PathBuf> {
        let path = self.document_dir(doc_id)?.join(SUMMARY_FILE);
        write_json_atomic(&path, summary).await?;
        Ok(path)
    }
}

/// Read a parser output file, keeping the raw bytes for content hashing
pub async fn load_parsed_document(path: &Path) -> Result<(Vec<u8>, ParsedDocument)> {
    let bytes = tokio::fs::read(path).await.map_err(|e| storage_error(path, e))?;
    let document = decode_json(path, &bytes)?;
    Ok((bytes, document))
}

/// Read a graph from an explicit path
pub async fn load_graph_file(path: &Path) -> Result<DocumentGraph> {
    read_json(path).await
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await.map_err(|e| storage_error(path, e))?;
    decode_json(path, &bytes)
}

fn decode_json<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| AppError::InvalidFormat {
        message: format!("{}: {}", path.display(), e),
    })
}

/// Serialize `value` and atomically replace `path` with it
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| storage_error(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| storage_error(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(storage_error(path, e));
    }

    debug!(path = %path.display(), bytes = bytes.len(), "Wrote artifact");
    Ok(())
}

fn storage_error(path: &Path, err: std::io::Error) -> AppError {
    AppError::Storage {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SectionNode, SectionTree};
    use chrono::Utc;

    fn empty_graph(doc_id: &str) -> DocumentGraph {
        DocumentGraph {
            doc_id: doc_id.to_string(),
            filename: Some("paper.pdf".into()),
            content_hash: None,
            num_pages: 0,
            processed_at: Utc::now(),
            tree: SectionTree::new(SectionNode::root()),
            chunks: Vec::new(),
            images: Vec::new(),
            anomalies: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_save_and_load_graph() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let path = store.save_graph(&empty_graph("doc-7")).await.unwrap();
        assert!(path.ends_with("doc-7/graph.json"));
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = store.load_graph("doc-7").await.unwrap();
        assert_eq!(loaded.filename.as_deref(), Some("paper.pdf"));
    }

    #[tokio::test]
    async fn test_rejects_path_like_doc_ids() {
        let store = ArtifactStore::new("unused");
        assert!(store.document_dir("../escape").is_err());
        assert!(store.document_dir("").is_err());
        assert!(store.document_dir("2401.00001").is_ok());
    }

    #[tokio::test]
    async fn test_malformed_input_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let err = load_parsed_document(&path).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidFormat { .. }));
    }

    #[tokio::test]
    async fn test_parsed_document_keeps_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.json");
        let raw = br#"{"doc_id": "paper", "blocks": []}"#;
        tokio::fs::write(&path, raw).await.unwrap();

        let (bytes, document) = load_parsed_document(&path).await.unwrap();
        assert_eq!(bytes, raw.to_vec());
        assert_eq!(document.doc_id.as_deref(), Some("paper"));
        assert!(document.blocks.is_empty());
    }
}
