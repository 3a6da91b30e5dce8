//! Recoverable structural anomalies found while building a section tree

use super::SectionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reported to the caller and logged, never fatal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralAnomaly {
    /// Header block without a level; treated as a paragraph
    MissingHeaderLevel { block_id: String },
    /// Header block with a level outside 1..=255; treated as a paragraph
    InvalidHeaderLevel { block_id: String, level: i32 },
    /// The block stream was empty
    EmptyDocument,
    /// Content before the first header was discarded by policy
    DroppedPreamble { block_count: usize },
    /// A header with neither content nor subsections
    EmptySection { section_id: SectionId, title: String },
}

impl StructuralAnomaly {
    /// Stable label for metrics
    pub fn kind_name(&self) -> &'static str {
        match self {
            StructuralAnomaly::MissingHeaderLevel { .. } => "missing_header_level",
            StructuralAnomaly::InvalidHeaderLevel { .. } => "invalid_header_level",
            StructuralAnomaly::EmptyDocument => "empty_document",
            StructuralAnomaly::DroppedPreamble { .. } => "dropped_preamble",
            StructuralAnomaly::EmptySection { .. } => "empty_section",
        }
    }
}

impl fmt::Display for StructuralAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralAnomaly::MissingHeaderLevel { block_id } => {
                write!(f, "header block {} has no level, treated as paragraph", block_id)
            }
            StructuralAnomaly::InvalidHeaderLevel { block_id, level } => write!(
                f,
                "header block {} has invalid level {}, treated as paragraph",
                block_id, level
            ),
            StructuralAnomaly::EmptyDocument => write!(f, "document has no blocks"),
            StructuralAnomaly::DroppedPreamble { block_count } => {
                write!(f, "dropped {} block(s) preceding the first header", block_count)
            }
            StructuralAnomaly::EmptySection { title, .. } => {
                write!(f, "section '{}' has no content", title)
            }
        }
    }
}
