//! End-to-end: parsed blocks through ingestion and linking

use async_trait::async_trait;
use paperlink_common::config::AppConfig;
use paperlink_common::errors::Result;
use paperlink_common::models::{ContentBlock, DocumentGraph, ImageAsset, ParsedDocument};
use paperlink_common::{ArtifactStore, EmbeddingProvider};
use paperlink_ingestion::IngestionProcessor;
use paperlink_linker::{InMemoryImageSource, LinkStatus, MultimodalLinker, MultimodalSummary};
use std::sync::Arc;

/// Two-topic embedding space: one axis per keyword
struct KeywordProvider;

fn keywords(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    vec![
        if text.contains("loss") { 1.0 } else { 0.0 },
        if text.contains("attention") { 1.0 } else { 0.0 },
        0.1,
    ]
}

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keywords(text))
    }

    async fn embed_matching_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keywords(text))
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        Ok(keywords(&String::from_utf8_lossy(image)))
    }

    async fn caption_for(&self, image: &[u8]) -> Result<String> {
        Ok(format!("Generated view of {}", String::from_utf8_lossy(image)))
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

fn parsed() -> ParsedDocument {
    ParsedDocument {
        doc_id: Some("paper".into()),
        filename: Some("paper.pdf".into()),
        num_pages: Some(4),
        blocks: vec![
            ContentBlock::header("h1", "Training", 1, 2),
            ContentBlock::paragraph("p1", "We train for ten epochs and the loss decreases steadily.", 2),
            ContentBlock::image_ref("i1", "img-loss", 2),
            ContentBlock::header("h2", "Attention", 1, 4),
            ContentBlock::paragraph("p2", "Multi-head attention lets the model attend jointly.", 4),
        ],
        images: vec![
            ImageAsset::new("img-loss", 2).with_caption("Figure 1"),
            ImageAsset::new("img-attn", 4).with_caption("Attention weights for one head"),
        ],
    }
}

fn linker() -> MultimodalLinker {
    let images = InMemoryImageSource::new()
        .with_image("img-loss", b"training loss plot".to_vec())
        .with_image("img-attn", b"attention heatmap".to_vec());
    MultimodalLinker::new(
        Arc::new(KeywordProvider),
        Arc::new(images),
        AppConfig::default().linking,
    )
}

fn ingest() -> DocumentGraph {
    IngestionProcessor::new(AppConfig::default())
        .build_graph("paper", parsed(), None)
        .unwrap()
}

#[tokio::test]
async fn test_ingested_graph_links_every_image() {
    let mut graph = ingest();
    assert_eq!(graph.chunks.len(), 2);

    let report = linker().run(&mut graph).await.unwrap();
    assert!(report.failures.is_empty());
    assert_eq!(report.outcome.confirmed.len(), 2);

    let training = &graph.chunks[0];
    let attention = &graph.chunks[1];
    assert_eq!(graph.image("img-loss").unwrap().linked_chunk_id, Some(training.id));
    assert_eq!(graph.image("img-attn").unwrap().linked_chunk_id, Some(attention.id));

    // Direct reference and confirmed link collapse to one entry
    assert_eq!(training.image_ids, vec!["img-loss"]);
    assert_eq!(training.direct_image_ids, vec!["img-loss"]);
    assert_eq!(attention.image_ids, vec!["img-attn"]);
    assert!(attention.direct_image_ids.is_empty());

    let loss = graph.image("img-loss").unwrap();
    assert!(loss.caption_is_generated);
    assert!(!graph.image("img-attn").unwrap().caption_is_generated);

    assert!(graph.validate().is_ok());
}

#[tokio::test]
async fn test_linking_twice_changes_nothing() {
    let mut graph = ingest();
    let linker = linker();
    linker.run(&mut graph).await.unwrap();
    let chunks = graph.chunks.clone();
    let images = graph.images.clone();

    linker.run(&mut graph).await.unwrap();
    assert_eq!(graph.chunks, chunks);
    assert_eq!(graph.images, images);
}

#[tokio::test]
async fn test_files_on_disk_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());

    let graph_path = store.save_graph(&ingest()).await.unwrap();
    let linked = linker().process_graph_file(&graph_path, &store).await.unwrap();
    assert_eq!(linked.graph_path, graph_path);

    let bytes = tokio::fs::read(&linked.summary_path).await.unwrap();
    let summary: MultimodalSummary = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(summary.doc_id, "paper");
    assert!(summary.entries.iter().all(|e| e.status == LinkStatus::Confirmed));
    assert!(summary.entries.iter().all(|e| e.snippet.as_deref().is_some_and(|s| s.ends_with("..."))));

    let saved = store.load_graph("paper").await.unwrap();
    assert!(saved.images.iter().all(|i| i.is_linked()));
}
