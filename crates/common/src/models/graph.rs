//! Document graph: the serialisable output of one pipeline run

use super::{ChunkId, ContentBlock, FineChunk, ImageAsset, SectionId, SectionTree, StructuralAnomaly};
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Parser output handed to the ingestion stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub num_pages: Option<u32>,
    pub blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub images: Vec<ImageAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentGraph {
    pub doc_id: String,
    #[serde(default)]
    pub filename: Option<String>,
    /// SHA-256 of the parsed input
    #[serde(default)]
    pub content_hash: Option<String>,
    pub num_pages: u32,
    pub processed_at: DateTime<Utc>,
    pub tree: SectionTree,
    pub chunks: Vec<FineChunk>,
    pub images: Vec<ImageAsset>,
    #[serde(default)]
    pub anomalies: Vec<StructuralAnomaly>,
}

impl DocumentGraph {
    pub fn chunk(&self, id: &ChunkId) -> Option<&FineChunk> {
        self.chunks.iter().find(|c| &c.id == id)
    }

    pub fn image(&self, id: &str) -> Option<&ImageAsset> {
        self.images.iter().find(|i| i.id == id)
    }

    /// Title used to contextualise a chunk; `None` for the synthetic root
    pub fn section_title(&self, id: &SectionId) -> Option<&str> {
        self.tree
            .find(id)
            .filter(|s| !s.is_root())
            .map(|s| s.title.as_str())
    }

    /// Check every cross-entity invariant of the document model.
    ///
    /// The first breach is returned as an `InvariantViolation`; nothing is
    /// repaired.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(AppError::invariant(&self.doc_id, message));

        let mut section_blocks: HashMap<SectionId, HashSet<&str>> = HashMap::new();
        let mut seen_blocks: HashSet<&str> = HashSet::new();
        for section in self.tree.iter() {
            let ids = section_blocks.entry(section.id).or_default();
            for block in &section.blocks {
                if !seen_blocks.insert(block.id.as_str()) {
                    return fail(format!("block {} belongs to more than one section", block.id));
                }
                ids.insert(block.id.as_str());
            }
        }

        let mut image_index: HashMap<&str, &ImageAsset> = HashMap::new();
        for image in &self.images {
            if image_index.insert(image.id.as_str(), image).is_some() {
                return fail(format!("duplicate image id {}", image.id));
            }
            if let Some(section_id) = image.section_id {
                if !self.tree.contains(&section_id) {
                    return fail(format!(
                        "image {} references missing section {}",
                        image.id, section_id
                    ));
                }
            }
        }

        let mut chunk_index: HashMap<ChunkId, &FineChunk> = HashMap::new();
        for chunk in &self.chunks {
            if chunk_index.insert(chunk.id, chunk).is_some() {
                return fail(format!("duplicate chunk id {}", chunk.id));
            }
            let Some(blocks) = section_blocks.get(&chunk.section_id) else {
                return fail(format!(
                    "chunk {} references missing section {}",
                    chunk.id, chunk.section_id
                ));
            };
            if let Some(stray) = chunk
                .source_block_ids
                .iter()
                .find(|b| !blocks.contains(b.as_str()))
            {
                return fail(format!(
                    "chunk {} spans block {} outside section {}",
                    chunk.id, stray, chunk.section_id
                ));
            }
            for image_id in &chunk.image_ids {
                if !image_index.contains_key(image_id.as_str()) {
                    return fail(format!(
                        "chunk {} references missing image {}",
                        chunk.id, image_id
                    ));
                }
            }
            let mut expected = chunk.clone();
            expected.refresh_image_ids();
            if expected.image_ids != chunk.image_ids {
                return fail(format!(
                    "chunk {} image ids disagree with its direct and linked references",
                    chunk.id
                ));
            }
            for image_id in &chunk.linked_image_ids {
                let linked_back = image_index
                    .get(image_id.as_str())
                    .and_then(|img| img.linked_chunk_id);
                if linked_back != Some(chunk.id) {
                    return fail(format!(
                        "chunk {} lists linked image {} that does not link back",
                        chunk.id, image_id
                    ));
                }
            }
        }

        for image in &self.images {
            let Some(chunk_id) = image.linked_chunk_id else {
                continue;
            };
            let Some(chunk) = chunk_index.get(&chunk_id) else {
                return fail(format!(
                    "image {} links to missing chunk {}",
                    image.id, chunk_id
                ));
            };
            if !chunk.linked_image_ids.contains(&image.id) {
                return fail(format!(
                    "image {} links to chunk {} which does not list it",
                    image.id, chunk_id
                ));
            }
        }

        Ok(())
    }
}
