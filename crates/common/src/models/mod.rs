//! Document model
//!
//! Entities shared by the ingestion and linking stages. Every cross-entity
//! reference is an identifier; only the section tree owns nested values.

mod anomaly;
mod block;
mod chunk;
mod graph;
mod image;
mod section;

pub use anomaly::StructuralAnomaly;
pub use block::{image_markers, BlockKind, ContentBlock};
pub use chunk::FineChunk;
pub use graph::{DocumentGraph, ParsedDocument};
pub use image::ImageAsset;
pub use section::{SectionIter, SectionNode, SectionTree, ROOT_TITLE};

use uuid::Uuid;

/// Identifier of a section, generated by the tree builder
pub type SectionId = Uuid;

/// Identifier of a fine chunk, generated by the chunker
pub type ChunkId = Uuid;
