//! Fine-grained retrieval chunks

use super::{ChunkId, SectionId};
use serde::{Deserialize, Serialize};

/// A retrieval unit bounded by one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineChunk {
    pub id: ChunkId,
    /// Position in document order
    pub index: usize,
    pub section_id: SectionId,
    pub content: String,
    /// Window start inside the section's working string, in characters
    pub char_start: usize,
    /// Window end (exclusive) inside the section's working string, in characters
    pub char_end: usize,
    /// Blocks whose text intersects the window, in section order
    pub source_block_ids: Vec<String>,
    /// Direct references followed by linker-confirmed images
    pub image_ids: Vec<String>,
    /// Images referenced by the source blocks themselves
    #[serde(default)]
    pub direct_image_ids: Vec<String>,
    /// Images the linker confirmed for this chunk
    #[serde(default)]
    pub linked_image_ids: Vec<String>,
    /// First page among the source blocks
    pub page_number: u32,
    /// Last page among the source blocks
    pub page_end: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_text: Option<Vec<f32>>,
    /// Secondary-space embedding used only for image matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_matching: Option<Vec<f32>>,
}

impl FineChunk {
    /// Record a confirmed link. Returns false when it was already recorded.
    pub fn add_linked_image(&mut self, image_id: &str) -> bool {
        if self.linked_image_ids.iter().any(|id| id == image_id) {
            return false;
        }
        self.linked_image_ids.push(image_id.to_string());
        self.refresh_image_ids();
        true
    }

    /// Drop a stale link. Direct references survive.
    pub fn retract_linked_image(&mut self, image_id: &str) -> bool {
        let before = self.linked_image_ids.len();
        self.linked_image_ids.retain(|id| id != image_id);
        let changed = self.linked_image_ids.len() != before;
        if changed {
            self.refresh_image_ids();
        }
        changed
    }

    /// Recompute `image_ids` as direct references followed by new linked ids
    pub fn refresh_image_ids(&mut self) {
        let mut ids = self.direct_image_ids.clone();
        for id in &self.linked_image_ids {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        self.image_ids = ids;
    }

    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }

    /// Absolute page distance from `page` to this chunk's page range
    pub fn page_distance(&self, page: u32) -> u32 {
        if page < self.page_number {
            self.page_number - page
        } else if page > self.page_end {
            page - self.page_end
        } else {
            0
        }
    }
}
