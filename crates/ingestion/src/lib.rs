//! PaperLink ingestion stage
//!
//! Builds the section tree of a parsed document and cuts each section into
//! overlapping fine chunks that remember their source blocks.

pub mod chunker;
pub mod errors;
pub mod processor;
pub mod tree;

pub use chunker::{chunk_section, create_chunks};
pub use errors::IngestionError;
pub use processor::{assign_image_sections, DirectoryReport, IngestionProcessor, IngestionSummary};
pub use tree::{build_tree, TreeBuild};
