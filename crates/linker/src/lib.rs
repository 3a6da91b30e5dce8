//! PaperLink linking stage
//!
//! Attaches every extracted image to the chunk whose text describes it,
//! using embeddings from an injected provider.

pub mod candidates;
pub mod caption;
pub mod errors;
pub mod image_source;
pub mod linker;
pub mod report;
pub mod scoring;

pub use caption::is_valid_caption;
pub use errors::LinkerError;
pub use image_source::{FsImageSource, ImageSource, InMemoryImageSource};
pub use linker::{
    link, EmbeddingFailure, EmbeddingStage, EntityRef, LinkOutcome, LinkReport, LinkedDocument,
    MultimodalLinker, ScoredLink,
};
pub use report::{LinkStatus, MultimodalSummary, SummaryEntry};
pub use scoring::{cosine_similarity, exceeds_threshold, ScoreWeights};
