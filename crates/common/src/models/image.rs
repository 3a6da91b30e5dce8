//! Extracted images

use super::{ChunkId, SectionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub id: String,
    pub page_number: u32,
    /// Section containing the block that referenced this image
    #[serde(default)]
    pub section_id: Option<SectionId>,
    /// Location of the image bytes, relative to the configured image root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// [x, y, width, height] on the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
    /// PDF-native or generated caption
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub caption_is_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_image: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_caption: Option<Vec<f32>>,
    /// Single best-matching chunk, set by the linker
    #[serde(default)]
    pub linked_chunk_id: Option<ChunkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f32>,
}

impl ImageAsset {
    pub fn new(id: impl Into<String>, page_number: u32) -> Self {
        Self {
            id: id.into(),
            page_number,
            section_id: None,
            file_path: None,
            bbox: None,
            caption: None,
            caption_is_generated: false,
            embedding_image: None,
            embedding_caption: None,
            linked_chunk_id: None,
            match_score: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_section(mut self, section_id: SectionId) -> Self {
        self.section_id = Some(section_id);
        self
    }

    pub fn is_linked(&self) -> bool {
        self.linked_chunk_id.is_some()
    }

    pub fn clear_link(&mut self) {
        self.linked_chunk_id = None;
        self.match_score = None;
    }
}
