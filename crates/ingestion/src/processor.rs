//! Ingestion processor
//!
//! Per-document pipeline: parsed blocks → section tree → chunks → image
//! sections → validated document graph → persisted artifact.

use crate::chunker::create_chunks;
use crate::errors::IngestionError;
use crate::tree::{build_tree, TreeBuild};
use futures::stream::{self, StreamExt};
use paperlink_common::config::AppConfig;
use paperlink_common::metrics;
use paperlink_common::models::{DocumentGraph, ImageAsset, ParsedDocument, SectionId, SectionTree};
use paperlink_common::errors::AppError;
use paperlink_common::storage::{load_parsed_document, ArtifactStore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// What one processed document produced
#[derive(Debug, Clone)]
pub struct IngestionSummary {
    pub doc_id: String,
    pub graph_path: PathBuf,
    pub sections: usize,
    pub chunks: usize,
    pub images: usize,
    pub anomalies: usize,
}

/// Outcome of a directory run; failures do not stop other documents
#[derive(Debug, Default)]
pub struct DirectoryReport {
    pub succeeded: Vec<IngestionSummary>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Ingestion processor
pub struct IngestionProcessor {
    config: AppConfig,
    store: ArtifactStore,
}

impl IngestionProcessor {
    pub fn new(config: AppConfig) -> Self {
        let store = ArtifactStore::new(&config.storage.output_dir);
        Self { config, store }
    }

    pub fn with_store(config: AppConfig, store: ArtifactStore) -> Self {
        Self { config, store }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Build and validate a document graph without touching the filesystem
    #[instrument(skip(self, document, content_hash), fields(blocks = document.blocks.len()))]
    pub fn build_graph(
        &self,
        doc_id: &str,
        document: ParsedDocument,
        content_hash: Option<String>,
    ) -> Result<DocumentGraph, IngestionError> {
        let start = Instant::now();
        let ParsedDocument {
            filename,
            num_pages,
            blocks,
            mut images,
            ..
        } = document;

        let TreeBuild { tree, anomalies } = build_tree(blocks, &self.config.tree);
        for anomaly in &anomalies {
            warn!(doc_id = %doc_id, kind = anomaly.kind_name(), "Structural anomaly: {}", anomaly);
            metrics::record_anomaly(anomaly.kind_name());
        }

        let chunks = create_chunks(&tree, &self.config.chunking)?;
        assign_image_sections(&tree, &mut images);

        let last_image_page = images.iter().map(|i| i.page_number).max().unwrap_or(0);
        let num_pages = num_pages.unwrap_or_else(|| tree.last_page().max(last_image_page));

        let graph = DocumentGraph {
            doc_id: doc_id.to_string(),
            filename,
            content_hash,
            num_pages,
            processed_at: chrono::Utc::now(),
            tree,
            chunks,
            images,
            anomalies,
        };

        graph.validate().map_err(|e| {
            error!(doc_id = %doc_id, error = %e, "Document graph failed validation");
            IngestionError::from(e)
        })?;

        let sections = graph.tree.section_count().saturating_sub(1);
        metrics::record_ingestion(start.elapsed().as_secs_f64(), sections, graph.chunks.len());
        info!(
            doc_id = %doc_id,
            sections = sections,
            chunks = graph.chunks.len(),
            images = graph.images.len(),
            anomalies = graph.anomalies.len(),
            "Document graph built"
        );

        Ok(graph)
    }

    /// Process one parsed-document JSON file and persist its graph
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn process_file(&self, path: &Path) -> Result<IngestionSummary, IngestionError> {
        if !path.exists() {
            return Err(IngestionError::FileNotFound(path.display().to_string()));
        }

        let (bytes, mut document) = load_parsed_document(path).await.map_err(|e| match e {
            AppError::InvalidFormat { message } => IngestionError::InvalidInput {
                path: path.display().to_string(),
                message,
            },
            other => other.into(),
        })?;
        let content_hash = hex::encode(Sha256::digest(&bytes));

        let doc_id = document
            .doc_id
            .clone()
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_else(|| content_hash[..16].to_string());
        if document.filename.is_none() {
            document.filename = path.file_name().map(|s| s.to_string_lossy().to_string());
        }

        let graph = self.build_graph(&doc_id, document, Some(content_hash))?;
        let graph_path = self.store.save_graph(&graph).await?;
        info!(doc_id = %doc_id, path = %graph_path.display(), "Document graph saved");

        Ok(IngestionSummary {
            doc_id,
            graph_path,
            sections: graph.tree.section_count().saturating_sub(1),
            chunks: graph.chunks.len(),
            images: graph.images.len(),
            anomalies: graph.anomalies.len(),
        })
    }

    /// Process every `*.json` file in `dir`, several documents at a time
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn process_directory(&self, dir: &Path) -> Result<DirectoryReport, IngestionError> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        info!(documents = paths.len(), "Processing directory");

        let concurrency = self.config.storage.document_concurrency.max(1);
        let results: Vec<(PathBuf, Result<IngestionSummary, IngestionError>)> = stream::iter(paths)
            .map(|path| async move {
                let result = self.process_file(&path).await;
                (path, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = DirectoryReport::default();
        for (path, result) in results {
            match result {
                Ok(summary) => report.succeeded.push(summary),
                Err(e) => {
                    error!(path = %path.display(), error = %e, fatal = e.is_fatal(), "Document failed");
                    report.failed.push((path, e.to_string()));
                }
            }
        }
        report.succeeded.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Directory processed"
        );
        Ok(report)
    }
}

/// Give every image the section owning the first block that references it
pub fn assign_image_sections(tree: &SectionTree, images: &mut [ImageAsset]) {
    let mut owner: HashMap<String, SectionId> = HashMap::new();
    for section in tree.iter() {
        for block in &section.blocks {
            for image_id in block.image_ids() {
                owner.entry(image_id).or_insert(section.id);
            }
        }
    }

    for image in images.iter_mut() {
        image.section_id = owner.get(&image.id).copied();
    }
}
