//! Similarity scoring between images and chunks

use paperlink_common::config::LinkingConfig;

/// Cosine similarity; `None` for empty, mismatched or zero-norm vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Weights of the two similarity terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub image: f32,
    pub caption: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            image: 0.7,
            caption: 0.3,
        }
    }
}

impl From<&LinkingConfig> for ScoreWeights {
    fn from(config: &LinkingConfig) -> Self {
        Self {
            image: config.image_weight,
            caption: config.caption_weight,
        }
    }
}

impl ScoreWeights {
    /// Weighted similarity of one image to one chunk's matching embedding.
    ///
    /// Without a caption embedding the image term is used alone.
    pub fn score(&self, image: &[f32], caption: Option<&[f32]>, chunk: &[f32]) -> Option<f32> {
        let image_sim = cosine_similarity(image, chunk)?;
        match caption.and_then(|c| cosine_similarity(c, chunk)) {
            Some(caption_sim) => Some(self.image * image_sim + self.caption * caption_sim),
            None => Some(image_sim),
        }
    }
}

/// Links are confirmed only strictly above the threshold
pub fn exceeds_threshold(score: f32, threshold: f32) -> bool {
    score > threshold
}
