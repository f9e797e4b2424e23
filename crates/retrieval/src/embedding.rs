//! Embedding client for the vector index
//!
//! Wraps the Gemini embedding REST API with retries, bounded backoff, and a
//! read-through vector cache in the store. The serving path treats the
//! embedder as fallible: similarity falls back to its text strategies and
//! personalization to general articles when embedding fails.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use newsflow_core::Sentiment;

use crate::cache::{keys, CacheLayer};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Gemini,
    /// Deterministic local vectors; used by tests and offline environments
    Stub,
}

impl EmbeddingProvider {
    pub fn from_env() -> Self {
        match std::env::var("EMBEDDING_PROVIDER")
            .unwrap_or_else(|_| "gemini".to_string())
            .to_lowercase()
            .as_str()
        {
            "stub" | "local" => Self::Stub,
            _ => Self::Gemini,
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone)]
pub enum EmbeddingModel {
    /// text-embedding-004 (768 dims)
    Small,
    /// gemini-embedding-001 (3072 dims)
    Large,
}

impl EmbeddingModel {
    pub fn name(&self) -> &str {
        match self {
            Self::Small => "text-embedding-004",
            Self::Large => "gemini-embedding-001",
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::Small => 768,
            Self::Large => 3072,
        }
    }

    pub fn from_selector(selector: &str) -> Self {
        match selector.to_lowercase().as_str() {
            "large" => Self::Large,
            _ => Self::Small,
        }
    }

    pub fn from_env() -> Self {
        Self::from_selector(&std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "small".into()))
    }
}

/// Gemini embedContent request
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

/// Gemini embedContent response
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Embedding client with caching and retry support
#[derive(Clone)]
pub struct EmbeddingClient {
    http_client: Client,
    api_url: String,
    api_key: String,
    provider: EmbeddingProvider,
    model: EmbeddingModel,
    cache: Option<Arc<CacheLayer>>,
}

impl EmbeddingClient {
    /// Create a new embedding client
    pub fn new(
        api_url: String,
        api_key: String,
        provider: EmbeddingProvider,
        model: EmbeddingModel,
        timeout: Duration,
        cache: Option<Arc<CacheLayer>>,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        info!(
            provider = ?provider,
            model = model.name(),
            dimension = model.dimension(),
            cache_enabled = cache.is_some(),
            "Initialized embedding client"
        );

        Self {
            http_client,
            api_url,
            api_key,
            provider,
            model,
            cache,
        }
    }

    /// Embedding dimension of the active model
    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    /// Generate an embedding, consulting the vector cache first
    ///
    /// # Errors
    /// Fails after [`MAX_RETRIES`] attempts against the provider; callers
    /// degrade to non-vector strategies.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow!("cannot embed empty text"));
        }

        let cache_key = keys::embedding(&text_hash(text));
        if let Some(cache) = &self.cache {
            if let Ok(Some(vector)) = cache.get_json::<Vec<f32>>(&cache_key).await {
                debug!(key = %cache_key, "Embedding cache hit");
                return Ok(vector);
            }
        }

        let vector = match self.provider {
            EmbeddingProvider::Gemini => self.embed_remote(text).await?,
            EmbeddingProvider::Stub => stub_vector(text, self.model.dimension()),
        };

        if let Some(cache) = &self.cache {
            let ttl = cache.config().embedding_ttl_sec;
            if let Err(e) = cache.set_json(&cache_key, &vector, ttl).await {
                debug!(error = %e, "Failed to cache embedding");
            }
        }

        Ok(vector)
    }

    async fn embed_remote(&self, text: &str) -> Result<Vec<f32>> {
        if self.api_key.is_empty() {
            return Err(anyhow!("embedding API key not configured"));
        }

        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.api_url.trim_end_matches('/'),
            self.model.name(),
            self.api_key
        );
        let request = EmbedRequest {
            model: format!("models/{}", self.model.name()),
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
        };

        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.http_client.post(&url).json(&request).send().await {
                Ok(response) if response.status().is_success() => {
                    let body: EmbedResponse = response.json().await?;
                    let vector = body.embedding.values;
                    if vector.len() != self.model.dimension() {
                        return Err(anyhow!(
                            "provider returned dimension {} for model {}",
                            vector.len(),
                            self.model.name()
                        ));
                    }
                    return Ok(vector);
                }
                Ok(response) => {
                    let status = response.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    let body = response.text().await.unwrap_or_default();
                    warn!(
                        attempt,
                        status = %status,
                        "Embedding request rejected"
                    );
                    last_error = Some(anyhow!("embedding API {status}: {body}"));
                    if !retryable {
                        break;
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Embedding request failed");
                    last_error = Some(e.into());
                }
            }

            if attempt < MAX_RETRIES {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("embedding failed")))
    }
}

/// Output of the upstream summarizer for a single article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleAnalysis {
    pub summary: String,
    pub sentiment: Sentiment,
    pub keywords: Vec<String>,
}

/// Abstract capability of the ingestion-side LLM
///
/// The serving core never calls this; it is the seam the ingestion pipeline
/// implements against.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize_and_analyze(&self, title: &str, body: &str) -> Result<ArticleAnalysis>;
}

fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic pseudo-embedding derived from the text hash
///
/// Not semantically meaningful, but stable across processes, which is what
/// the offline pipeline tests need.
fn stub_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut seed = Sha256::digest(text.as_bytes()).to_vec();
    let mut vector = Vec::with_capacity(dimension);

    while vector.len() < dimension {
        for byte in &seed {
            if vector.len() == dimension {
                break;
            }
            vector.push((*byte as f32 / 127.5) - 1.0);
        }
        seed = Sha256::digest(&seed).to_vec();
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_dimensions() {
        assert_eq!(EmbeddingModel::Small.dimension(), 768);
        assert_eq!(EmbeddingModel::Large.dimension(), 3072);
        assert_eq!(EmbeddingModel::from_selector("large").dimension(), 3072);
        assert_eq!(EmbeddingModel::from_selector("anything").dimension(), 768);
    }

    #[test]
    fn test_stub_vector_deterministic() {
        let a = stub_vector("ai chips", 768);
        let b = stub_vector("ai chips", 768);
        let c = stub_vector("gardening", 768);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 768);
    }

    #[test]
    fn test_stub_vector_is_normalized() {
        let v = stub_vector("ai chips", 64);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_text() {
        let client = EmbeddingClient::new(
            "https://example.invalid".to_string(),
            String::new(),
            EmbeddingProvider::Stub,
            EmbeddingModel::Small,
            Duration::from_secs(1),
            None,
        );
        assert!(client.embed("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_stub_provider_embeds_offline() {
        let client = EmbeddingClient::new(
            "https://example.invalid".to_string(),
            String::new(),
            EmbeddingProvider::Stub,
            EmbeddingModel::Small,
            Duration::from_secs(1),
            None,
        );
        let vector = client.embed("ai chips").await.unwrap();
        assert_eq!(vector.len(), client.dimension());
    }
}
