//! Candidate chunk selection for one image

use paperlink_common::models::{FineChunk, ImageAsset};

/// Chunks worth scoring for an image, as indices in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidates {
    pub indices: Vec<usize>,
    /// Set when the page window had to be used
    pub widened: bool,
}

impl Candidates {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Chunks on the image's page or in its section; failing that, chunks
/// within `page_window` pages of it.
pub fn select_candidates(image: &ImageAsset, chunks: &[FineChunk], page_window: u32) -> Candidates {
    let direct: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, chunk)| {
            chunk.page_distance(image.page_number) == 0
                || image.section_id == Some(chunk.section_id)
        })
        .map(|(i, _)| i)
        .collect();

    if !direct.is_empty() {
        return Candidates {
            indices: direct,
            widened: false,
        };
    }

    let nearby = chunks
        .iter()
        .enumerate()
        .filter(|(_, chunk)| chunk.page_distance(image.page_number) <= page_window)
        .map(|(i, _)| i)
        .collect();

    Candidates {
        indices: nearby,
        widened: true,
    }
}
