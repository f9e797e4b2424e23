//! Similar-article retrieval
//!
//! Primary path: embed the target's keywords (or title) and ask the vector
//! index for nearest neighbors. Fallback path: blend four text/metadata
//! strategies with weighted rank fusion. Results are cached per
//! `(article, limit, offset)` with a metadata sidecar, hit/miss counters,
//! an LRU set bounding cache population, and a last-known-good tombstone
//! for catastrophic failures.

pub mod strategies;
pub mod terms;

use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use newsflow_core::{Article, NewsflowError};

use crate::cache::{keys, CacheCounters, CacheEnvelope, CacheLayer, CacheSidecar};
use crate::config::GatewayConfig;
use crate::embedding::EmbeddingClient;
use crate::index::IndexGateway;

/// How a result was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Vector,
    Text,
    Semantic,
    Category,
    Temporal,
    Combined,
    General,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Vector => "vector",
            MatchMethod::Text => "text",
            MatchMethod::Semantic => "semantic",
            MatchMethod::Category => "category",
            MatchMethod::Temporal => "temporal",
            MatchMethod::Combined => "combined",
            MatchMethod::General => "general",
        }
    }
}

impl FromStr for MatchMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "vector" => MatchMethod::Vector,
            "text" => MatchMethod::Text,
            "semantic" => MatchMethod::Semantic,
            "category" => MatchMethod::Category,
            "temporal" => MatchMethod::Temporal,
            "general" => MatchMethod::General,
            _ => MatchMethod::Combined,
        })
    }
}

/// An article annotated with its similarity score and match method
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedArticle {
    #[serde(flatten)]
    pub article: Article,
    pub score: f32,
    pub method: MatchMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords_used: Option<Vec<String>>,
}

/// Options for a similar-articles request
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarOptions {
    /// Bypass the cache probe and recompute
    pub force_refresh: bool,
}

/// Response of [`SimilarityEngine::similar`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarResponse {
    pub articles: Vec<RankedArticle>,
    pub total: usize,
    pub cached: bool,
    pub method: MatchMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_ms: Option<i64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SimilarResponse {
    fn empty(method: MatchMethod) -> Self {
        Self {
            articles: Vec::new(),
            total: 0,
            cached: false,
            method,
            cache_age_ms: None,
            fallback: false,
            error: None,
        }
    }
}

/// Computes "articles similar to X"
pub struct SimilarityEngine {
    index: Arc<IndexGateway>,
    cache: Arc<CacheLayer>,
    embedder: Arc<EmbeddingClient>,
    config: Arc<GatewayConfig>,
    conn: ConnectionManager,
}

impl SimilarityEngine {
    pub fn new(
        index: Arc<IndexGateway>,
        cache: Arc<CacheLayer>,
        embedder: Arc<EmbeddingClient>,
        config: Arc<GatewayConfig>,
        conn: ConnectionManager,
    ) -> Self {
        Self {
            index,
            cache,
            embedder,
            config,
            conn,
        }
    }

    /// Similar articles for a target, with caching
    ///
    /// Never fails outright: a full-pipeline failure serves the tombstone
    /// fallback when one exists, else an empty response with `error` set.
    #[instrument(skip(self, opts), fields(article_id = %article_id, limit, offset))]
    pub async fn similar(
        &self,
        article_id: &str,
        limit: usize,
        offset: usize,
        opts: SimilarOptions,
    ) -> SimilarResponse {
        match self.similar_inner(article_id, limit, offset, opts).await {
            Ok(response) => response,
            Err(e) => {
                warn!(article_id = %article_id, error = %e, "Similarity pipeline failed, serving tombstone");
                self.serve_tombstone(article_id, limit, offset, e).await
            }
        }
    }

    async fn similar_inner(
        &self,
        article_id: &str,
        limit: usize,
        offset: usize,
        opts: SimilarOptions,
    ) -> Result<SimilarResponse, NewsflowError> {
        let payload_key = keys::similar(article_id, limit, offset);
        let meta_key = keys::similar_meta(article_id);
        let stats_key = keys::similar_stats(article_id);

        // Cache probe: payload and sidecar in one round trip
        if !opts.force_refresh {
            let (envelope, sidecar) = self
                .cache
                .probe::<RankedArticle>(&payload_key, &meta_key)
                .await
                .map_err(|e| NewsflowError::StoreUnavailable(e.to_string()))?;

            if let Some(envelope) = envelope {
                if let Err(e) = self.cache.stats_bump(&stats_key, true).await {
                    debug!(error = %e, "Stats bump failed");
                }

                let reference_ts = sidecar
                    .as_ref()
                    .map(|s| s.timestamp)
                    .unwrap_or(envelope.timestamp);
                let cache_age_ms = chrono::Utc::now().timestamp_millis() - reference_ts;
                let method = MatchMethod::from_str(&envelope.method).unwrap_or(MatchMethod::Combined);
                let total = sidecar
                    .map(|s| s.total_count)
                    .unwrap_or(envelope.results.len());

                return Ok(SimilarResponse {
                    articles: slice_window(envelope.results, offset, limit),
                    total,
                    cached: true,
                    method,
                    cache_age_ms: Some(cache_age_ms),
                    fallback: false,
                    error: None,
                });
            }
        }

        // Miss accounting; bloom hint is best-effort
        if let Err(e) = self.cache.stats_bump(&stats_key, false).await {
            debug!(error = %e, "Stats bump failed");
        }
        self.cache
            .bloom_mark(&keys::similar_bloom(article_id), article_id)
            .await;

        // Target load
        let Some(target) = self.index.get_doc(article_id).await? else {
            debug!(article_id = %article_id, "Similarity target not found");
            return Ok(SimilarResponse::empty(MatchMethod::Vector));
        };

        let search_text = target.similarity_text();
        let keywords_used =
            (!target.keywords.is_empty()).then(|| target.keywords.clone());
        let fetch = limit + offset + self.config.vector.knn_overfetch;

        // Primary vector path, falling back to the strategy blender
        let (results, method) = match self.vector_path(&target, &search_text, fetch).await {
            Ok(mut ranked) => {
                for r in &mut ranked {
                    r.keywords_used = keywords_used.clone();
                }
                (ranked, MatchMethod::Vector)
            }
            Err(e) => {
                warn!(article_id = %article_id, error = %e, "Vector path failed, blending fallback strategies");
                (self.fallback_path(&target, fetch).await?, MatchMethod::Combined)
            }
        };

        let total = results.len();
        self.write_back(article_id, &payload_key, &meta_key, &results, total, method)
            .await;

        Ok(SimilarResponse {
            articles: slice_window(results, offset, limit),
            total,
            cached: false,
            method,
            cache_age_ms: None,
            fallback: false,
            error: None,
        })
    }

    /// Vector KNN over the embedded search text, thresholded by cosine
    /// similarity
    async fn vector_path(
        &self,
        target: &Article,
        search_text: &str,
        fetch: usize,
    ) -> anyhow::Result<Vec<RankedArticle>> {
        let vector = self.embedder.embed(search_text).await?;
        let hits = self
            .index
            .vector_knn(&vector, fetch, Some(&target.id))
            .await?;

        let threshold = self.config.vector.similarity_threshold;
        let ranked = hits
            .into_iter()
            .filter_map(|(article, distance)| {
                let similarity = 1.0 - distance;
                (similarity >= threshold).then(|| RankedArticle {
                    article: article.without_vector(),
                    score: similarity,
                    method: MatchMethod::Vector,
                    keywords_used: None,
                })
            })
            .collect();
        Ok(ranked)
    }

    /// Multi-strategy blend with weighted rank fusion
    async fn fallback_path(
        &self,
        target: &Article,
        fetch: usize,
    ) -> Result<Vec<RankedArticle>, NewsflowError> {
        let outcomes =
            strategies::run_all(&self.index, target, fetch, &self.config.similarity).await;
        if outcomes.is_empty() {
            return Err(NewsflowError::IndexUnavailable(
                "every fallback strategy failed".to_string(),
            ));
        }

        let temp_key =
            keys::temp_similarity(&target.id, chrono::Utc::now().timestamp_millis());
        let mut conn = self.conn.clone();
        let (ranked_ids, _total) =
            strategies::fuse_ranked(&mut conn, &temp_key, &outcomes, fetch, 0)
                .await
                .map_err(|e| NewsflowError::StoreUnavailable(e.to_string()))?;

        // Hydrate fused ids back into documents
        let docs = join_all(
            ranked_ids
                .iter()
                .map(|(id, _)| self.index.get_doc(id)),
        )
        .await;

        let mut results = Vec::with_capacity(ranked_ids.len());
        for ((_, score), doc) in ranked_ids.iter().zip(docs) {
            if let Ok(Some(article)) = doc {
                results.push(RankedArticle {
                    article: article.without_vector(),
                    score: *score,
                    method: MatchMethod::Combined,
                    keywords_used: None,
                });
            }
        }
        Ok(results)
    }

    /// Best-effort write-back: payload, sidecar, tombstone, LRU, daily HLL
    async fn write_back(
        &self,
        article_id: &str,
        payload_key: &str,
        meta_key: &str,
        results: &[RankedArticle],
        total: usize,
        method: MatchMethod,
    ) {
        let envelope = CacheEnvelope {
            results: results.to_vec(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            method: method.as_str().to_string(),
            version: None,
        };
        let sidecar = CacheSidecar::new(total, method.as_str());
        let ttl = self.config.cache.similar_ttl_sec;

        if let Err(e) = self
            .cache
            .put_with_sidecar(payload_key, meta_key, &envelope, &sidecar, ttl)
            .await
        {
            warn!(error = %e, key = %payload_key, "Similarity write-back failed");
            return;
        }

        // Last-known-good tombstone, kept well past the main TTL
        if let Err(e) = self
            .cache
            .set_json(
                &keys::similar_fallback(article_id),
                &envelope,
                self.config.lru_ttl_sec(),
            )
            .await
        {
            debug!(error = %e, "Tombstone write failed");
        }

        if let Err(e) = self.cache.lru_touch(keys::SIMILAR_LRU, payload_key).await {
            debug!(error = %e, "LRU touch failed");
        }

        let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
        self.cache
            .hll_add(&keys::similar_unique(&date), article_id)
            .await;

        info!(
            article_id = %article_id,
            total,
            method = method.as_str(),
            "Cached similar articles"
        );
    }

    /// Catastrophic-failure path: serve the tombstone when one exists
    async fn serve_tombstone(
        &self,
        article_id: &str,
        limit: usize,
        offset: usize,
        error: NewsflowError,
    ) -> SimilarResponse {
        let fallback_key = keys::similar_fallback(article_id);
        match self
            .cache
            .get_json::<CacheEnvelope<RankedArticle>>(&fallback_key)
            .await
        {
            Ok(Some(envelope)) => {
                let method =
                    MatchMethod::from_str(&envelope.method).unwrap_or(MatchMethod::Combined);
                let total = envelope.results.len();
                SimilarResponse {
                    articles: slice_window(envelope.results, offset, limit),
                    total,
                    cached: true,
                    method,
                    cache_age_ms: None,
                    fallback: true,
                    error: None,
                }
            }
            _ => SimilarResponse {
                error: Some(error.to_string()),
                ..SimilarResponse::empty(MatchMethod::Combined)
            },
        }
    }

    /// Hit/miss counters for one article's similarity cache
    pub async fn stats(&self, article_id: &str) -> Result<CacheCounters, NewsflowError> {
        self.cache
            .stats(&keys::similar_stats(article_id))
            .await
            .map_err(|e| NewsflowError::StoreUnavailable(e.to_string()))
    }

    /// Drop every cached similarity entry for one article
    pub async fn invalidate(&self, article_id: &str) -> Result<u64, NewsflowError> {
        self.cache
            .invalidate_similar(article_id)
            .await
            .map_err(|e| NewsflowError::StoreUnavailable(e.to_string()))
    }
}

fn slice_window<T>(results: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    results.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_method_round_trip() {
        for method in [
            MatchMethod::Vector,
            MatchMethod::Text,
            MatchMethod::Semantic,
            MatchMethod::Category,
            MatchMethod::Temporal,
            MatchMethod::Combined,
            MatchMethod::General,
        ] {
            assert_eq!(MatchMethod::from_str(method.as_str()), Ok(method));
        }
        assert_eq!(MatchMethod::from_str("unknown"), Ok(MatchMethod::Combined));
    }

    #[test]
    fn test_slice_window() {
        let items: Vec<i32> = (0..10).collect();
        assert_eq!(slice_window(items.clone(), 0, 3), vec![0, 1, 2]);
        assert_eq!(slice_window(items.clone(), 8, 5), vec![8, 9]);
        assert!(slice_window(items, 20, 5).is_empty());
    }

    #[test]
    fn test_empty_response_shape() {
        let response = SimilarResponse::empty(MatchMethod::Vector);
        assert!(!response.cached);
        assert_eq!(response.total, 0);
        let json = serde_json::to_value(&response).unwrap();
        // fallback=false and absent options are omitted from the wire shape
        assert!(json.get("fallback").is_none());
        assert!(json.get("error").is_none());
        assert_eq!(json.get("method").unwrap(), "vector");
    }

    #[test]
    fn test_ranked_article_flattens() {
        use chrono::{TimeZone, Utc};
        use newsflow_core::Source;

        let article = Article::new(
            "T".to_string(),
            Source {
                id: None,
                name: "Wire".to_string(),
            },
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        let ranked = RankedArticle {
            article,
            score: 0.75,
            method: MatchMethod::Vector,
            keywords_used: Some(vec!["ai".to_string()]),
        };

        let json = serde_json::to_value(&ranked).unwrap();
        assert!(json.get("title").is_some());
        assert_eq!(json.get("score").unwrap().as_f64().unwrap(), 0.75);
        assert_eq!(json.get("method").unwrap(), "vector");
        assert!(json.get("keywordsUsed").is_some());
    }
}
