//! # Newsflow Retrieval
//!
//! Retrieval, ranking, and caching core of the Newsflow Gateway: the index
//! gateway over the composite search index, the similarity and
//! personalization engines, the cache substrate, view metrics, and read
//! history.

pub mod admin;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod index;
pub mod metrics;
pub mod personalization;
pub mod read_history;
pub mod similarity;
pub mod store;

pub use admin::{CacheAdmin, CacheStatistics, CacheType, ClearReport, NuclearReport, NUCLEAR_TOKEN};
pub use cache::{CacheCounters, CacheEnvelope, CacheLayer, CacheSidecar};
pub use config::GatewayConfig;
pub use embedding::{ArticleAnalysis, EmbeddingClient, EmbeddingModel, EmbeddingProvider, Summarizer};
pub use index::{CompositeQuery, IndexGateway, SearchOptions, SearchPage, SortBy, SourceCount};
pub use metrics::{
    ArticleMetricsSnapshot, MetricsReport, MetricsTracker, TrendPeriod, TrendingArticle,
    UserHistoryEntry, ViewContext,
};
pub use personalization::{FeedArticle, FeedOptions, FeedResponse, PersonalizationEngine};
pub use read_history::ReadHistory;
pub use similarity::{MatchMethod, RankedArticle, SimilarOptions, SimilarResponse, SimilarityEngine};

use std::sync::Arc;

/// Fully wired retrieval core
pub struct RetrievalService {
    pub config: Arc<GatewayConfig>,
    pub index: Arc<IndexGateway>,
    pub cache: Arc<CacheLayer>,
    pub embedder: Arc<EmbeddingClient>,
    pub similarity: Arc<SimilarityEngine>,
    pub personalization: Arc<PersonalizationEngine>,
    pub metrics: Arc<MetricsTracker>,
    pub read_history: ReadHistory,
    pub admin: Arc<CacheAdmin>,
}

/// Initialize every retrieval component against the configured store
///
/// Creates the composite index when absent; an index left over from a
/// previous run is accepted as-is.
pub async fn init_service(config: Arc<GatewayConfig>) -> anyhow::Result<Arc<RetrievalService>> {
    let conn = store::connect(&config.store.url).await?;

    let cache = Arc::new(CacheLayer::new(conn.clone(), config.cache.clone()));
    let index = Arc::new(IndexGateway::new(conn.clone(), config.vector.clone()));
    index.ensure_index().await?;

    let embedder = Arc::new(EmbeddingClient::new(
        config.embedding.api_url.clone(),
        config.embedding.api_key.clone(),
        EmbeddingProvider::from_env(),
        EmbeddingModel::from_selector(&config.embedding.model),
        config.embedding_timeout(),
        Some(cache.clone()),
    ));

    let read_history = ReadHistory::new(conn.clone(), config.cache.read_ttl_sec);

    let similarity = Arc::new(SimilarityEngine::new(
        index.clone(),
        cache.clone(),
        embedder.clone(),
        config.clone(),
        conn.clone(),
    ));

    let personalization = Arc::new(PersonalizationEngine::new(
        index.clone(),
        cache.clone(),
        embedder.clone(),
        read_history.clone(),
        config.clone(),
    ));

    let metrics = Arc::new(MetricsTracker::new(conn.clone(), index.clone()));
    let admin = Arc::new(CacheAdmin::new((*cache).clone()));

    Ok(Arc::new(RetrievalService {
        config,
        index,
        cache,
        embedder,
        similarity,
        personalization,
        metrics,
        read_history,
        admin,
    }))
}
