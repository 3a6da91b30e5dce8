//! Human-auditable linking summary (`multimodal_summary.json`)

use crate::linker::LinkOutcome;
use chrono::{DateTime, Utc};
use paperlink_common::config::LinkingConfig;
use paperlink_common::models::{ChunkId, DocumentGraph};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Confirmed,
    Rejected,
    NoCandidates,
    MissingEmbedding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub image_id: String,
    pub page_number: u32,
    pub caption: Option<String>,
    pub caption_is_generated: bool,
    pub status: LinkStatus,
    pub linked_chunk_id: Option<ChunkId>,
    /// Score of the link, or of the best rejected candidate
    pub match_score: Option<f32>,
    /// Opening text of the linked (or best rejected) chunk
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultimodalSummary {
    pub doc_id: String,
    pub generated_at: DateTime<Utc>,
    pub threshold: f32,
    pub entries: Vec<SummaryEntry>,
}

impl MultimodalSummary {
    /// One entry per image, in the graph's image order
    pub fn build(graph: &DocumentGraph, outcome: &LinkOutcome, config: &LinkingConfig) -> Self {
        let entries = graph
            .images
            .iter()
            .map(|image| {
                let (status, scored_chunk, score) = if let Some(link) = outcome.confirmed_for(&image.id) {
                    (LinkStatus::Confirmed, Some(link.chunk_id), Some(link.score))
                } else if let Some(best) = outcome.rejected_for(&image.id) {
                    (LinkStatus::Rejected, Some(best.chunk_id), Some(best.score))
                } else if outcome.no_candidates.contains(&image.id) {
                    (LinkStatus::NoCandidates, None, None)
                } else {
                    (LinkStatus::MissingEmbedding, image.linked_chunk_id, image.match_score)
                };

                let snippet = scored_chunk
                    .and_then(|id| graph.chunk(&id))
                    .map(|chunk| snippet(&chunk.content, config.snippet_chars));

                SummaryEntry {
                    image_id: image.id.clone(),
                    page_number: image.page_number,
                    caption: image.caption.clone(),
                    caption_is_generated: image.caption_is_generated,
                    status,
                    linked_chunk_id: image.linked_chunk_id,
                    match_score: score,
                    snippet,
                }
            })
            .collect();

        Self {
            doc_id: graph.doc_id.clone(),
            generated_at: Utc::now(),
            threshold: config.threshold,
            entries,
        }
    }

    pub fn confirmed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == LinkStatus::Confirmed)
            .count()
    }
}

/// First `max_chars` characters followed by `...`
pub fn snippet(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
