//! Gateway configuration
//!
//! Layered loading: coded defaults, then an optional `config/newsflow.*`
//! file, then `NEWSFLOW_*` environment variables. The store URL and port
//! also honor the bare `REDIS_URL` / `PORT` variables for container
//! deployments.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the gateway
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Backing store configuration
    pub store: StoreConfig,

    /// Cache TTLs and bounds
    pub cache: CacheConfig,

    /// Vector index configuration
    pub vector: VectorConfig,

    /// Embedding API configuration
    pub embedding: EmbeddingConfig,

    /// Similarity fallback strategy weights and windows
    #[serde(default)]
    pub similarity: SimilarityConfig,

    /// Personalized feed configuration
    #[serde(default)]
    pub personalization: PersonalizationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,

    /// Server port (default: 3001)
    pub port: u16,

    /// Worker threads
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Redis connection URL
    pub url: String,

    /// Connection timeout in seconds
    pub connect_timeout_sec: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// TTL for similar-article caches (seconds)
    pub similar_ttl_sec: u64,

    /// TTL for personalized feed caches (seconds)
    pub personalized_ttl_sec: u64,

    /// TTL for personalized search caches (seconds)
    pub personalized_search_ttl_sec: u64,

    /// TTL for the article list cache (seconds)
    pub all_articles_ttl_sec: u64,

    /// TTL for read-history records (seconds)
    pub read_ttl_sec: u64,

    /// TTL for cached embeddings (seconds)
    pub embedding_ttl_sec: u64,

    /// TTL for hit/miss counters (seconds)
    pub stats_ttl_sec: u64,

    /// Maximum members kept in each LRU set
    pub lru_max_entries: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorConfig {
    /// Name of the composite search index
    pub index_name: String,

    /// Embedding dimension; `put_doc` rejects vectors of any other length
    pub dimension: usize,

    /// Extra candidates requested beyond the page window
    pub knn_overfetch: usize,

    /// Minimum cosine similarity for similar-article results
    pub similarity_threshold: f32,

    /// Minimum cosine similarity for preference matches
    pub preference_threshold: f32,

    /// Minimum similarity for personalized search re-ranking
    pub search_threshold: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// API base URL
    pub api_url: String,

    /// API key (falls back to GEMINI_API_KEY)
    pub api_key: String,

    /// Model name selector: "small" (768) or "large" (3072)
    pub model: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

/// Weights for the fallback rank fusion and its time windows
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimilarityConfig {
    /// Text strategy weight
    pub text_weight: f32,

    /// Semantic strategy weight
    pub semantic_weight: f32,

    /// Category strategy weight
    pub category_weight: f32,

    /// Temporal strategy weight
    pub temporal_weight: f32,

    /// Candidate window for the temporal strategy (days around target)
    pub temporal_window_days: i64,

    /// Decay horizon for temporal scores (days)
    pub temporal_decay_days: i64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            text_weight: 0.4,
            semantic_weight: 0.3,
            category_weight: 0.2,
            temporal_weight: 0.1,
            temporal_window_days: 7,
            temporal_decay_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonalizationConfig {
    /// Per-position weight decay across ordered preferences
    pub preference_decay: f32,

    /// Extra results kept beyond the page window before topping up
    pub topup_margin: usize,

    /// Score assigned to general (non-preference) top-up articles
    pub general_score: f32,

    /// Fraction of the page that may be read-filtered from a cache hit
    /// before the hit is discarded and recomputed
    pub refilter_ratio: f32,

    /// Minimum candidate buffer for personalized search
    pub search_buffer_min: usize,

    /// Buffer multiplier over the requested limit for personalized search
    pub search_buffer_factor: usize,
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            preference_decay: 0.1,
            topup_margin: 10,
            general_score: 0.1,
            refilter_ratio: 0.3,
            search_buffer_min: 100,
            search_buffer_factor: 8,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3001,
                workers: None,
            },
            store: StoreConfig {
                url: "redis://localhost:6379".to_string(),
                connect_timeout_sec: 10,
            },
            cache: CacheConfig {
                similar_ttl_sec: 3600,
                personalized_ttl_sec: 1800,
                personalized_search_ttl_sec: 900,
                all_articles_ttl_sec: 300,
                read_ttl_sec: 7200,
                embedding_ttl_sec: 86400,
                stats_ttl_sec: 3600,
                lru_max_entries: 1000,
            },
            vector: VectorConfig {
                index_name: "news_idx".to_string(),
                dimension: 768,
                knn_overfetch: 20,
                similarity_threshold: 0.5,
                preference_threshold: 0.4,
                search_threshold: 0.3,
            },
            embedding: EmbeddingConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                api_key: String::new(),
                model: "small".to_string(),
                timeout_ms: 5000,
            },
            similarity: SimilarityConfig::default(),
            personalization: PersonalizationConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from defaults, config file, and environment
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&GatewayConfig::default())?)
            .add_source(config::File::with_name("config/newsflow").required(false))
            .add_source(config::Environment::with_prefix("NEWSFLOW").separator("__"))
            .build()?;

        let mut cfg: GatewayConfig = settings.try_deserialize()?;

        // Bare container-style variables take precedence over file values
        if let Ok(url) = std::env::var("REDIS_URL") {
            cfg.store.url = url;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                cfg.server.port = port;
            }
        }
        if cfg.embedding.api_key.is_empty() {
            cfg.embedding.api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        }

        Ok(cfg)
    }

    /// Connection timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.store.connect_timeout_sec)
    }

    /// Embedding request timeout as a Duration
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding.timeout_ms)
    }

    /// TTL applied to LRU sets: a day's worth of the similar cache TTL
    pub fn lru_ttl_sec(&self) -> u64 {
        self.cache.similar_ttl_sec * 24
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_namespace_table() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.cache.similar_ttl_sec, 3600);
        assert_eq!(cfg.cache.personalized_ttl_sec, 1800);
        assert_eq!(cfg.cache.personalized_search_ttl_sec, 900);
        assert_eq!(cfg.cache.all_articles_ttl_sec, 300);
        assert_eq!(cfg.cache.read_ttl_sec, 7200);
        assert_eq!(cfg.cache.lru_max_entries, 1000);
        assert_eq!(cfg.lru_ttl_sec(), 86400);
    }

    #[test]
    fn test_default_thresholds() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.vector.similarity_threshold, 0.5);
        assert_eq!(cfg.vector.preference_threshold, 0.4);
        assert_eq!(cfg.vector.search_threshold, 0.3);
        assert_eq!(cfg.vector.dimension, 768);
    }

    #[test]
    fn test_default_fusion_weights_sum_to_one() {
        let w = SimilarityConfig::default();
        let sum = w.text_weight + w.semantic_weight + w.category_weight + w.temporal_weight;
        assert!((sum - 1.0).abs() < 1e-6);
    }
}
