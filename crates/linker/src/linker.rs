//! Multimodal linker
//!
//! Resolves captions, acquires embeddings for every chunk and image, then
//! links each image to the single chunk it describes best:
//! 1. Captions that are missing or bare labels are replaced by generated ones
//! 2. Chunks and images are embedded concurrently; scoring waits for all of them
//! 3. Candidates are chunks on the image's page or in its section (±1 page as fallback)
//! 4. The best weighted score is confirmed only when it exceeds the threshold

use crate::caption::is_valid_caption;
use crate::candidates::select_candidates;
use crate::errors::LinkerError;
use crate::image_source::{FsImageSource, ImageSource};
use crate::report::MultimodalSummary;
use crate::scoring::{exceeds_threshold, ScoreWeights};
use futures::stream::{self, StreamExt};
use paperlink_common::config::{AppConfig, LinkingConfig};
use paperlink_common::embeddings::{create_provider, EmbeddingProvider};
use paperlink_common::errors::{AppError, Result as AppResult};
use paperlink_common::metrics::{self, EmbeddingTimer};
use paperlink_common::models::{ChunkId, DocumentGraph, FineChunk, ImageAsset};
use paperlink_common::storage::{load_graph_file, ArtifactStore};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Entity an embedding request was made for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Chunk(ChunkId),
    Image(String),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Chunk(id) => write!(f, "chunk {}", id),
            EntityRef::Image(id) => write!(f, "image {}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStage {
    LoadImage,
    Caption,
    ImageEmbedding,
    CaptionEmbedding,
    TextEmbedding,
    MatchingEmbedding,
}

impl EmbeddingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingStage::LoadImage => "load_image",
            EmbeddingStage::Caption => "caption",
            EmbeddingStage::ImageEmbedding => "image_embedding",
            EmbeddingStage::CaptionEmbedding => "caption_embedding",
            EmbeddingStage::TextEmbedding => "text_embedding",
            EmbeddingStage::MatchingEmbedding => "matching_embedding",
        }
    }
}

/// A per-entity failure; the entity sits out this run's matching
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingFailure {
    pub entity: EntityRef,
    pub stage: EmbeddingStage,
    pub message: String,
}

impl EmbeddingFailure {
    fn new(entity: EntityRef, stage: EmbeddingStage, error: &AppError) -> Self {
        warn!(entity = %entity, stage = stage.as_str(), error = %error, "Embedding unavailable");
        Self {
            entity,
            stage,
            message: error.to_string(),
        }
    }

    pub fn as_error(&self) -> AppError {
        AppError::EmbeddingUnavailable {
            entity: self.entity.to_string(),
            message: format!("{}: {}", self.stage.as_str(), self.message),
        }
    }
}

/// One scored image/chunk pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredLink {
    pub image_id: String,
    pub chunk_id: ChunkId,
    pub score: f32,
}

/// What happened to every image in one linking pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkOutcome {
    pub confirmed: Vec<ScoredLink>,
    /// Best candidate did not exceed the threshold
    pub rejected: Vec<ScoredLink>,
    pub no_candidates: Vec<String>,
    /// No image embedding, or no candidate with a matching embedding
    pub skipped_missing_embedding: Vec<String>,
}

impl LinkOutcome {
    pub fn confirmed_for(&self, image_id: &str) -> Option<&ScoredLink> {
        self.confirmed.iter().find(|l| l.image_id == image_id)
    }

    pub fn rejected_for(&self, image_id: &str) -> Option<&ScoredLink> {
        self.rejected.iter().find(|l| l.image_id == image_id)
    }
}

#[derive(Debug)]
pub struct LinkReport {
    pub outcome: LinkOutcome,
    pub failures: Vec<EmbeddingFailure>,
}

/// Paths written for one linked document
#[derive(Debug)]
pub struct LinkedDocument {
    pub doc_id: String,
    pub graph_path: PathBuf,
    pub summary_path: PathBuf,
    pub report: LinkReport,
}

enum Decision {
    Confirmed { index: usize, score: f32 },
    Rejected { index: usize, score: f32 },
    NoCandidates,
    MissingEmbedding,
}

/// Link every image to at most one chunk.
///
/// Consumes embeddings already present on the entities. Confirmed links are
/// written to both sides; a stale link from an earlier pass is retracted when
/// the image moves or drops below the threshold. Images lacking embeddings
/// keep whatever link they had.
pub fn link(chunks: &mut [FineChunk], images: &mut [ImageAsset], config: &LinkingConfig) -> LinkOutcome {
    let weights = ScoreWeights::from(config);
    let mut outcome = LinkOutcome::default();

    for image in images.iter_mut() {
        match decide(image, chunks, &weights, config) {
            Decision::Confirmed { index, score } => {
                let chunk_id = chunks[index].id;
                if image.linked_chunk_id.is_some_and(|previous| previous != chunk_id) {
                    retract(image, chunks);
                }
                chunks[index].add_linked_image(&image.id);
                image.linked_chunk_id = Some(chunk_id);
                image.match_score = Some(score);

                debug!(image_id = %image.id, chunk_id = %chunk_id, score, "Link confirmed");
                metrics::record_link("confirmed");
                outcome.confirmed.push(ScoredLink {
                    image_id: image.id.clone(),
                    chunk_id,
                    score,
                });
            }
            Decision::Rejected { index, score } => {
                retract(image, chunks);
                image.clear_link();

                debug!(image_id = %image.id, score, "Best candidate below threshold");
                metrics::record_link("rejected");
                outcome.rejected.push(ScoredLink {
                    image_id: image.id.clone(),
                    chunk_id: chunks[index].id,
                    score,
                });
            }
            Decision::NoCandidates => {
                retract(image, chunks);
                image.clear_link();

                debug!(image_id = %image.id, page = image.page_number, "No candidate chunks");
                metrics::record_link("no_candidates");
                outcome.no_candidates.push(image.id.clone());
            }
            Decision::MissingEmbedding => {
                metrics::record_link("missing_embedding");
                outcome.skipped_missing_embedding.push(image.id.clone());
            }
        }
    }

    outcome
}

fn decide(
    image: &ImageAsset,
    chunks: &[FineChunk],
    weights: &ScoreWeights,
    config: &LinkingConfig,
) -> Decision {
    let Some(image_vec) = image.embedding_image.as_deref() else {
        return Decision::MissingEmbedding;
    };

    let candidates = select_candidates(image, chunks, config.page_window);
    if candidates.is_empty() {
        return Decision::NoCandidates;
    }

    // (index, score, page distance); indices arrive in document order
    let mut best: Option<(usize, f32, u32)> = None;
    for &index in &candidates.indices {
        let chunk = &chunks[index];
        let Some(chunk_vec) = chunk.embedding_matching.as_deref() else {
            continue;
        };
        let Some(score) = weights.score(image_vec, image.embedding_caption.as_deref(), chunk_vec)
        else {
            continue;
        };
        if !score.is_finite() {
            continue;
        }

        let distance = chunk.page_distance(image.page_number);
        let better = match best {
            None => true,
            Some((_, best_score, best_distance)) => {
                score > best_score || (score == best_score && distance < best_distance)
            }
        };
        if better {
            best = Some((index, score, distance));
        }
    }

    match best {
        None => Decision::MissingEmbedding,
        Some((index, score, _)) if exceeds_threshold(score, config.threshold) => {
            Decision::Confirmed { index, score }
        }
        Some((index, score, _)) => Decision::Rejected { index, score },
    }
}

/// Remove the image from the chunk it was previously linked to
fn retract(image: &ImageAsset, chunks: &mut [FineChunk]) {
    let Some(previous) = image.linked_chunk_id else {
        return;
    };
    if let Some(chunk) = chunks.iter_mut().find(|c| c.id == previous) {
        chunk.retract_linked_image(&image.id);
    }
}

async fn timed<T, F>(kind: &'static str, request: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    let timer = EmbeddingTimer::start(kind);
    let result = request.await;
    timer.finish(result.is_ok());
    result
}

/// Text embedded for retrieval: the section title gives the chunk context
fn contextual_text(title: Option<&str>, content: &str) -> String {
    match title {
        Some(title) => format!("{}: {}", title, content),
        None => content.to_string(),
    }
}

/// Multimodal linker
pub struct MultimodalLinker {
    provider: Arc<dyn EmbeddingProvider>,
    images: Arc<dyn ImageSource>,
    config: LinkingConfig,
}

impl MultimodalLinker {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        images: Arc<dyn ImageSource>,
        config: LinkingConfig,
    ) -> Self {
        Self {
            provider,
            images,
            config,
        }
    }

    /// Provider from the embedding section, image bytes from `storage.image_root`
    pub fn from_config(config: &AppConfig) -> Result<Self, LinkerError> {
        let provider = create_provider(&config.embedding)?;
        let images = Arc::new(FsImageSource::new(&config.storage.image_root));
        Ok(Self::new(provider, images, config.linking.clone()))
    }

    pub fn config(&self) -> &LinkingConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Resolve captions and fill in missing embeddings for every entity.
    ///
    /// Embeddings already present are kept. Returns the failures; a failed
    /// entity is left without the embedding it was missing.
    pub async fn prepare(&self, graph: &mut DocumentGraph) -> Vec<EmbeddingFailure> {
        let concurrency = self.config.max_concurrency.max(1);

        let titles: Vec<Option<String>> = graph
            .chunks
            .iter()
            .map(|c| graph.section_title(&c.section_id).map(str::to_string))
            .collect();

        let mut failures: Vec<EmbeddingFailure> = stream::iter(graph.images.iter_mut())
            .map(|image| self.prepare_image(image))
            .buffer_unordered(concurrency)
            .flat_map(stream::iter)
            .collect()
            .await;

        let chunk_failures: Vec<EmbeddingFailure> =
            stream::iter(graph.chunks.iter_mut().zip(titles))
                .map(|(chunk, title)| async move { self.prepare_chunk(chunk, title.as_deref()).await })
                .buffer_unordered(concurrency)
                .flat_map(stream::iter)
                .collect()
                .await;
        failures.extend(chunk_failures);

        if !failures.is_empty() {
            warn!(doc_id = %graph.doc_id, failures = failures.len(), "Some entities are excluded from matching");
        }
        failures
    }

    async fn prepare_image(&self, image: &mut ImageAsset) -> Vec<EmbeddingFailure> {
        let image_id = image.id.clone();
        let entity = || EntityRef::Image(image_id.clone());
        let mut failures = Vec::new();

        // A caption generated on an earlier run is kept as-is
        let caption_ok = (image.caption_is_generated && image.caption.is_some())
            || is_valid_caption(image.caption.as_deref(), self.config.min_caption_words);
        if image.embedding_image.is_some() && caption_ok && image.embedding_caption.is_some() {
            return failures;
        }

        let mut usable_caption = caption_ok;
        let needs_bytes = image.embedding_image.is_none() || !caption_ok;
        let bytes = if needs_bytes {
            match self.images.load(image).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    failures.push(EmbeddingFailure::new(entity(), EmbeddingStage::LoadImage, &e));
                    None
                }
            }
        } else {
            None
        };

        if !caption_ok {
            image.embedding_caption = None;
            if let Some(bytes) = bytes.as_deref() {
                match timed("caption", self.provider.caption_for(bytes)).await {
                    Ok(caption) if !caption.trim().is_empty() => {
                        debug!(image_id = %image.id, "Generated caption");
                        image.caption = Some(caption.trim().to_string());
                        image.caption_is_generated = true;
                        usable_caption = true;
                    }
                    Ok(_) => {
                        let e = AppError::EmbeddingError {
                            message: "empty caption".to_string(),
                        };
                        failures.push(EmbeddingFailure::new(entity(), EmbeddingStage::Caption, &e));
                    }
                    Err(e) => {
                        failures.push(EmbeddingFailure::new(entity(), EmbeddingStage::Caption, &e));
                    }
                }
            }
        }

        if image.embedding_image.is_none() {
            if let Some(bytes) = bytes.as_deref() {
                match timed("image", self.provider.embed_image(bytes)).await {
                    Ok(vector) => image.embedding_image = Some(vector),
                    Err(e) => failures.push(EmbeddingFailure::new(
                        entity(),
                        EmbeddingStage::ImageEmbedding,
                        &e,
                    )),
                }
            }
        }

        if usable_caption && image.embedding_caption.is_none() {
            if let Some(caption) = image.caption.clone() {
                match timed("caption_text", self.provider.embed_matching_text(&caption)).await {
                    Ok(vector) => image.embedding_caption = Some(vector),
                    Err(e) => failures.push(EmbeddingFailure::new(
                        entity(),
                        EmbeddingStage::CaptionEmbedding,
                        &e,
                    )),
                }
            }
        }

        failures
    }

    async fn prepare_chunk(&self, chunk: &mut FineChunk, title: Option<&str>) -> Vec<EmbeddingFailure> {
        let mut failures = Vec::new();

        if chunk.embedding_text.is_none() {
            let text = contextual_text(title, &chunk.content);
            match timed("text", self.provider.embed_text(&text)).await {
                Ok(vector) => chunk.embedding_text = Some(vector),
                Err(e) => failures.push(EmbeddingFailure::new(
                    EntityRef::Chunk(chunk.id),
                    EmbeddingStage::TextEmbedding,
                    &e,
                )),
            }
        }

        if chunk.embedding_matching.is_none() {
            match timed("matching", self.provider.embed_matching_text(&chunk.content)).await {
                Ok(vector) => chunk.embedding_matching = Some(vector),
                Err(e) => failures.push(EmbeddingFailure::new(
                    EntityRef::Chunk(chunk.id),
                    EmbeddingStage::MatchingEmbedding,
                    &e,
                )),
            }
        }

        failures
    }

    /// Validate, embed, link and re-validate one document graph in place
    #[instrument(skip(self, graph), fields(doc_id = %graph.doc_id, chunks = graph.chunks.len(), images = graph.images.len()))]
    pub async fn run(&self, graph: &mut DocumentGraph) -> Result<LinkReport, LinkerError> {
        let start = Instant::now();
        graph.validate()?;

        let failures = self.prepare(graph).await;
        let outcome = link(&mut graph.chunks, &mut graph.images, &self.config);

        graph.validate().map_err(|e| {
            error!(doc_id = %graph.doc_id, error = %e, "Linking produced an inconsistent graph");
            LinkerError::from(e)
        })?;

        metrics::record_linking_duration(start.elapsed().as_secs_f64());
        info!(
            doc_id = %graph.doc_id,
            confirmed = outcome.confirmed.len(),
            rejected = outcome.rejected.len(),
            no_candidates = outcome.no_candidates.len(),
            missing_embedding = outcome.skipped_missing_embedding.len(),
            failures = failures.len(),
            "Linking complete"
        );

        Ok(LinkReport { outcome, failures })
    }

    /// Link a persisted graph and write the graph and audit summary to `store`
    #[instrument(skip(self, store), fields(path = %path.display()))]
    pub async fn process_graph_file(
        &self,
        path: &Path,
        store: &ArtifactStore,
    ) -> Result<LinkedDocument, LinkerError> {
        let mut graph = load_graph_file(path).await.map_err(|e| match e {
            AppError::InvalidFormat { message } => LinkerError::InvalidGraph {
                path: path.display().to_string(),
                message,
            },
            other => LinkerError::from(other),
        })?;

        let report = self.run(&mut graph).await?;

        let graph_path = store.save_graph(&graph).await?;
        let summary = MultimodalSummary::build(&graph, &report.outcome, &self.config);
        let summary_path = store.save_summary(&graph.doc_id, &summary).await?;
        info!(doc_id = %graph.doc_id, summary = %summary_path.display(), "Linked graph saved");

        Ok(LinkedDocument {
            doc_id: graph.doc_id,
            graph_path,
            summary_path,
            report,
        })
    }
}
