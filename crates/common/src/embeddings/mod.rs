//! Embedding provider abstraction
//!
//! The linker needs four model capabilities:
//! - contextual text embeddings (retrieval space)
//! - matching-space text embeddings (shared with images)
//! - matching-space image embeddings
//! - generated captions for images that lack a usable one
//!
//! `HttpProvider` talks to an inference service exposing one endpoint per
//! capability. `MockProvider` derives deterministic vectors from input hashes.

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoffBuilder};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Model capabilities used by the linker
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed text in the retrieval space
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed text in the space shared with images
    async fn embed_matching_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed raw image bytes in the matching space
    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>>;

    /// Describe an image in natural language
    async fn caption_for(&self, image: &[u8]) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Provider-wide request limiter
pub type ProviderRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Arc<ProviderRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);
    Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)))
}

/// Client for an HTTP inference service
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    text_model: String,
    matching_model: String,
    caption_model: String,
    timeout: Duration,
    max_retries: u32,
    limiter: Arc<ProviderRateLimiter>,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct CaptionResponse {
    caption: String,
}

impl HttpProvider {
    pub fn new(config: &EmbeddingConfig, base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            text_model: config.text_model.clone(),
            matching_model: config.matching_model.clone(),
            caption_model: config.caption_model.clone(),
            timeout: config.timeout(),
            max_retries: config.max_retries,
            limiter: create_rate_limiter(config.requests_per_second, config.burst),
        })
    }

    /// Run `op` with exponential backoff. Only transient failures are
    /// retried, at most `max_retries` times.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_max_elapsed_time(Some(self.timeout * (self.max_retries + 1)))
            .build();
        let max_retries = self.max_retries;
        let mut attempt = 0u32;

        retry(policy, || {
            attempt += 1;
            let current = attempt;
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_transient() && current <= max_retries => {
                        tracing::warn!(
                            operation = operation,
                            attempt = current,
                            max_retries = max_retries,
                            error = %e,
                            "Embedding request failed, retrying"
                        );
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.limiter.until_ready().await;

        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::EmbeddingTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                AppError::HttpClient(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(response)
    }

    async fn post_text(&self, path: &str, model: &str, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.post(&url).json(&TextRequest { model, input: text });
        let response = self.send(request).await?;

        let body: EmbeddingResponse = response.json().await.map_err(|e| AppError::EmbeddingError {
            message: format!("Failed to parse response from {}: {}", path, e),
        })?;
        non_empty(body.embedding, path)
    }

    async fn post_image<T>(&self, path: &str, model: &str, image: &[u8]) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let request = self
            .client
            .post(&url)
            .query(&[("model", model)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec());
        let response = self.send(request).await?;

        response.json().await.map_err(|e| AppError::EmbeddingError {
            message: format!("Failed to parse response from {}: {}", path, e),
        })
    }
}

fn non_empty(vector: Vec<f32>, path: &str) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(AppError::EmbeddingError {
            message: format!("{} returned an empty vector", path),
        });
    }
    Ok(vector)
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.with_retry("embed_text", || {
            self.post_text("/embed/text", &self.text_model, text)
        })
        .await
    }

    async fn embed_matching_text(&self, text: &str) -> Result<Vec<f32>> {
        self.with_retry("embed_matching_text", || {
            self.post_text("/embed/matching", &self.matching_model, text)
        })
        .await
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        let response: EmbeddingResponse = self
            .with_retry("embed_image", || {
                self.post_image("/embed/image", &self.matching_model, image)
            })
            .await?;
        non_empty(response.embedding, "/embed/image")
    }

    async fn caption_for(&self, image: &[u8]) -> Result<String> {
        let response: CaptionResponse = self
            .with_retry("caption_for", || {
                self.post_image("/caption", &self.caption_model, image)
            })
            .await?;

        let caption = response.caption.trim().to_string();
        if caption.is_empty() {
            return Err(AppError::EmbeddingError {
                message: "caption model returned an empty caption".to_string(),
            });
        }
        Ok(caption)
    }

    fn model_name(&self) -> &str {
        &self.matching_model
    }
}

/// Deterministic provider for tests and offline runs.
///
/// Equal inputs always map to equal unit vectors.
pub struct MockProvider {
    dimension: usize,
}

impl MockProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn vector_for(&self, space: &str, input: &[u8]) -> Vec<f32> {
        let mut hasher = Sha256::new();
        hasher.update(space.as_bytes());
        hasher.update(input);
        let digest = hasher.finalize();

        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed));

        let raw: Vec<f32> = (0..self.dimension)
            .map(|_| rng.gen::<f32>() * 2.0 - 1.0)
            .collect();
        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return raw;
        }
        raw.into_iter().map(|x| x / norm).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for("text", text.as_bytes()))
    }

    async fn embed_matching_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for("matching", text.as_bytes()))
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        Ok(self.vector_for("image", image))
    }

    async fn caption_for(&self, image: &[u8]) -> Result<String> {
        let digest = hex::encode(Sha256::digest(image));
        Ok(format!("generated description of image {}", &digest[..8]))
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

/// Create a provider based on configuration
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "http" => {
            let base_url = config.api_base.clone().ok_or_else(|| AppError::Configuration {
                message: "embedding.api_base is required for the http provider".to_string(),
            })?;
            Ok(Arc::new(HttpProvider::new(config, base_url)?))
        }
        "mock" => Ok(Arc::new(MockProvider::new(config.dimension))),
        other => {
            tracing::warn!(provider = other, "Unknown embedding provider, using mock");
            Ok(Arc::new(MockProvider::new(config.dimension)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_is_deterministic() {
        let provider = MockProvider::new(64);
        let a = provider.embed_text("attention is all you need").await.unwrap();
        let b = provider.embed_text("attention is all you need").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_mock_spaces_differ() {
        let provider = MockProvider::new(16);
        let text = provider.embed_text("loss curve").await.unwrap();
        let matching = provider.embed_matching_text("loss curve").await.unwrap();
        assert_ne!(text, matching);
    }

    #[tokio::test]
    async fn test_mock_caption_has_enough_words() {
        let provider = MockProvider::new(8);
        let caption = provider.caption_for(b"\x89PNG").await.unwrap();
        assert!(caption.split_whitespace().count() >= 3);
    }

    #[test]
    fn test_http_provider_requires_base_url() {
        let config = EmbeddingConfig {
            provider: "http".into(),
            api_base: None,
            ..EmbeddingConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = create_rate_limiter(10, 0);
        assert!(limiter.check().is_ok());
    }
}
