//! Personalized feed construction and per-user filtered search
//!
//! Feeds are assembled by running a vector search per stored preference,
//! weighting matches by preference position, deduplicating, read-filtering,
//! and topping up with general articles. Cached feeds are guarded by a
//! preference-version hash so a preference update invalidates every stale
//! entry without an event bus.

use std::collections::HashSet;
use std::sync::Arc;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use newsflow_core::validation::validate_preferences;
use newsflow_core::{cosine_similarity, Article, NewsflowError, Sentiment, UserPreferences};

use crate::cache::{keys, CacheCounters, CacheEnvelope, CacheLayer};
use crate::config::GatewayConfig;
use crate::embedding::EmbeddingClient;
use crate::index::IndexGateway;
use crate::read_history::ReadHistory;
use crate::similarity::terms;

/// Marker preference for general (non-preference) articles
pub const GENERAL: &str = "general";

/// A feed entry: an article with its personalization scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedArticle {
    #[serde(flatten)]
    pub article: Article,
    pub final_score: f32,
    pub matched_preference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference_order: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_similarity: Option<f32>,
}

impl FeedArticle {
    fn general(article: Article, score: f32) -> Self {
        Self {
            article,
            final_score: score,
            matched_preference: GENERAL.to_string(),
            preference_order: None,
            similarity: None,
            search_similarity: None,
        }
    }

    pub fn is_personalized(&self) -> bool {
        self.matched_preference != GENERAL
    }
}

/// Options for feed and search requests
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedOptions {
    /// Bypass the cache probe and recompute
    pub force_refresh: bool,
}

/// Response of feed and personalized-search requests
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub articles: Vec<FeedArticle>,
    pub total: usize,
    pub personalized_count: usize,
    pub cached: bool,
    pub filtered_read_count: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

/// Preference-version hash: `md5(JSON(preferences))`
pub fn preference_version_hash(preferences: &[String]) -> String {
    let json = serde_json::to_string(preferences).unwrap_or_default();
    hex::encode(Md5::digest(json.as_bytes()))
}

fn search_cache_hash(query: &str, sentiment: Option<Sentiment>, source: Option<&str>) -> String {
    let material = format!(
        "{}|{}|{}",
        query,
        sentiment.map(|s| s.as_str()).unwrap_or_default(),
        source.unwrap_or_default()
    );
    hex::encode(Md5::digest(material.as_bytes()))
}

/// Assembles per-user feeds and filtered search results
pub struct PersonalizationEngine {
    index: Arc<IndexGateway>,
    cache: Arc<CacheLayer>,
    embedder: Arc<EmbeddingClient>,
    read_history: ReadHistory,
    config: Arc<GatewayConfig>,
}

impl PersonalizationEngine {
    pub fn new(
        index: Arc<IndexGateway>,
        cache: Arc<CacheLayer>,
        embedder: Arc<EmbeddingClient>,
        read_history: ReadHistory,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            index,
            cache,
            embedder,
            read_history,
            config,
        }
    }

    /// Load stored preferences for a user
    pub async fn get_user_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<UserPreferences>, NewsflowError> {
        self.cache
            .get_json(&keys::user_preferences(user_id))
            .await
            .map_err(store_err)
    }

    /// Create or replace a user's preferences and cascade-invalidate every
    /// personalization cache for that user
    ///
    /// Topics are normalized (trimmed, lowercased, deduplicated, capped at
    /// ten); an empty surviving set is a `BadInput` failure. After this
    /// returns, any later personalized read re-validates the version hash
    /// and recomputes.
    #[instrument(skip(self, topics), fields(user_id = %user_id))]
    pub async fn update_user_preferences(
        &self,
        user_id: &str,
        topics: &[String],
    ) -> Result<UserPreferences, NewsflowError> {
        let normalized = validate_preferences(topics)?;

        let prefs = match self.get_user_preferences(user_id).await? {
            Some(mut existing) => {
                existing.replace(normalized);
                existing
            }
            None => UserPreferences::new(user_id.to_string(), normalized),
        };

        // User-owned record: no TTL
        self.cache
            .set_json(&keys::user_preferences(user_id), &prefs, 0)
            .await
            .map_err(store_err)?;

        self.invalidate_user_caches(user_id).await?;

        info!(user_id = %user_id, count = prefs.preferences.len(), "Stored user preferences");
        Ok(prefs)
    }

    /// Drop every personalized cache entry for a user: feed pages, search
    /// pages, stats, and the preference-version guard
    pub async fn invalidate_user_caches(&self, user_id: &str) -> Result<u64, NewsflowError> {
        let mut cleared = 0;
        for pattern in [
            format!("personalized_simple:{user_id}:*"),
            format!("personalized_search_simple:{user_id}:*"),
        ] {
            cleared += self
                .cache
                .delete_pattern(&pattern)
                .await
                .map_err(store_err)?;
        }
        cleared += self
            .cache
            .delete(&keys::personalized_stats(user_id))
            .await
            .map_err(store_err)?;
        cleared += self
            .cache
            .delete(&keys::prefs_version(user_id))
            .await
            .map_err(store_err)?;

        debug!(user_id = %user_id, cleared, "Invalidated personalization caches");
        Ok(cleared)
    }

    /// Personalized feed for a user
    #[instrument(skip(self, opts), fields(user_id = %user_id, limit, offset))]
    pub async fn personalized_feed(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
        opts: FeedOptions,
    ) -> Result<FeedResponse, NewsflowError> {
        let prefs = self.get_user_preferences(user_id).await?;
        let stats_key = keys::personalized_stats(user_id);

        // Cache probe with the preference-version guard
        if let (false, Some(prefs)) = (opts.force_refresh, prefs.as_ref()) {
            let expected = preference_version_hash(&prefs.preferences);
            let payload_key = keys::personalized(user_id, limit, offset);
            let version_key = keys::prefs_version(user_id);

            let (envelope, stored_version) = self
                .cache
                .probe_versioned::<FeedArticle>(&payload_key, &version_key)
                .await
                .map_err(store_err)?;

            if let Some(envelope) = envelope {
                if stored_version.as_deref() == Some(expected.as_str()) {
                    // Cached results are pre-filter; re-apply read history
                    let (filtered, removed) =
                        self.filter_read(user_id, envelope.results).await?;

                    let refilter_cap =
                        (self.config.personalization.refilter_ratio * limit as f32) as usize;
                    if removed <= refilter_cap {
                        let _ = self.cache.stats_bump(&stats_key, true).await;
                        return Ok(page_response(filtered, limit, offset, true, removed, false));
                    }
                    debug!(
                        user_id = %user_id,
                        removed,
                        "Cache hit over-filtered by read history, recomputing"
                    );
                } else {
                    debug!(user_id = %user_id, "Preference version mismatch, recomputing");
                }
            }
        }

        let _ = self.cache.stats_bump(&stats_key, false).await;

        // No stored preferences: newest general articles
        let Some(prefs) = prefs else {
            let fetch = limit + offset + self.config.personalization.topup_margin;
            let page = self.index.newest(fetch, 0).await?;
            let general: Vec<FeedArticle> = page
                .articles
                .into_iter()
                .map(|a| {
                    FeedArticle::general(
                        a.without_vector(),
                        self.config.personalization.general_score,
                    )
                })
                .collect();
            let (filtered, removed) = self.filter_read(user_id, general).await?;
            return Ok(page_response(filtered, limit, offset, false, removed, true));
        };

        // Compute, write back, then filter
        let ranked = self.compute_feed(&prefs, limit, offset).await?;
        self.write_back_feed(user_id, &prefs, limit, offset, &ranked)
            .await;

        let (filtered, removed) = self.filter_read(user_id, ranked).await?;
        Ok(page_response(filtered, limit, offset, false, removed, false))
    }

    /// One vector search per ordered preference, first-seen wins
    async fn compute_feed(
        &self,
        prefs: &UserPreferences,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FeedArticle>, NewsflowError> {
        let fetch = limit + offset + self.config.vector.knn_overfetch;
        let threshold = self.config.vector.preference_threshold;
        let decay = self.config.personalization.preference_decay;

        let mut seen: HashSet<String> = HashSet::new();
        let mut ranked: Vec<FeedArticle> = Vec::new();

        for (order, preference) in prefs.preferences.iter().enumerate() {
            let weight = (1.0 - decay * order as f32).max(0.0);
            if weight == 0.0 {
                break;
            }

            let hits = match self.embedder.embed(preference).await {
                Ok(vector) => match self.index.vector_knn(&vector, fetch, None).await {
                    Ok(hits) => hits,
                    Err(e) => {
                        warn!(preference = %preference, error = %e, "Preference search failed, skipping");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(preference = %preference, error = %e, "Preference embedding failed, skipping");
                    continue;
                }
            };

            for (article, distance) in hits {
                let similarity = 1.0 - distance;
                if similarity < threshold || !seen.insert(article.id.clone()) {
                    continue;
                }
                ranked.push(FeedArticle {
                    article,
                    final_score: similarity * weight,
                    matched_preference: preference.clone(),
                    preference_order: Some(order),
                    similarity: Some(similarity),
                    search_similarity: None,
                });
            }
        }

        ranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Top up with newest general articles
        let target = limit + offset + self.config.personalization.topup_margin;
        if ranked.len() < target {
            let need = target - ranked.len();
            match self.index.newest(need + seen.len(), 0).await {
                Ok(page) => {
                    for article in page.articles {
                        if ranked.len() >= target {
                            break;
                        }
                        if seen.insert(article.id.clone()) {
                            ranked.push(FeedArticle::general(
                                article,
                                self.config.personalization.general_score,
                            ));
                        }
                    }
                }
                Err(e) => warn!(error = %e, "General top-up failed, serving preference matches only"),
            }
        }

        Ok(ranked)
    }

    /// Write back the pre-filter ranked list and the version guard
    async fn write_back_feed(
        &self,
        user_id: &str,
        prefs: &UserPreferences,
        limit: usize,
        offset: usize,
        ranked: &[FeedArticle],
    ) {
        let version = preference_version_hash(&prefs.preferences);
        let envelope = CacheEnvelope {
            results: ranked.to_vec(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            method: "vector".to_string(),
            version: Some(version.clone()),
        };
        let ttl = self.config.cache.personalized_ttl_sec;

        if let Err(e) = self
            .cache
            .set_json(&keys::personalized(user_id, limit, offset), &envelope, ttl)
            .await
        {
            warn!(error = %e, user_id = %user_id, "Feed write-back failed");
            return;
        }
        if let Err(e) = self
            .cache
            .set_string(&keys::prefs_version(user_id), &version, ttl)
            .await
        {
            warn!(error = %e, user_id = %user_id, "Version guard write failed");
        }
    }

    /// Personalized search: the feed as candidate pool, re-ranked by query
    /// relevance and filtered by sentiment/source
    #[instrument(skip(self, opts), fields(user_id = %user_id, query = %query, limit, offset))]
    pub async fn personalized_search(
        &self,
        user_id: &str,
        query: &str,
        sentiment: Option<Sentiment>,
        source: Option<&str>,
        limit: usize,
        offset: usize,
        opts: FeedOptions,
    ) -> Result<FeedResponse, NewsflowError> {
        let hash = search_cache_hash(query, sentiment, source);
        let cache_key = keys::personalized_search(user_id, &hash, limit, offset);

        if !opts.force_refresh {
            if let Some(envelope) = self
                .cache
                .get_json::<CacheEnvelope<FeedArticle>>(&cache_key)
                .await
                .map_err(store_err)?
            {
                return Ok(page_response(envelope.results, limit, offset, true, 0, false));
            }
        }

        // Larger candidate pool than the page itself
        let buffer = std::cmp::max(
            self.config.personalization.search_buffer_min,
            self.config.personalization.search_buffer_factor * limit,
        );
        let feed = self
            .personalized_feed(user_id, buffer, 0, opts)
            .await?;
        let filtered_read_count = feed.filtered_read_count;
        let fallback = feed.fallback;
        let mut candidates = feed.articles;

        // Query re-ranking
        if !query.trim().is_empty() {
            let threshold = self.config.vector.search_threshold;
            let query_vector = match self.embedder.embed(query).await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(error = %e, "Query embedding failed, ranking by word overlap");
                    None
                }
            };

            let mut scored: Vec<FeedArticle> = candidates
                .into_iter()
                .filter_map(|mut candidate| {
                    let score = match (&query_vector, &candidate.article.vector) {
                        (Some(qv), Some(av)) => cosine_similarity(qv, av),
                        _ => terms::word_overlap(query, &terms::searchable_text(&candidate.article)),
                    };
                    if score < threshold {
                        return None;
                    }
                    candidate.search_similarity = Some(score);
                    Some(candidate)
                })
                .collect();

            scored.sort_by(|a, b| {
                let primary = b
                    .search_similarity
                    .partial_cmp(&a.search_similarity)
                    .unwrap_or(std::cmp::Ordering::Equal);
                primary.then(
                    b.final_score
                        .partial_cmp(&a.final_score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
            });
            candidates = scored;
        }

        // Tag filters
        if let Some(wanted) = sentiment {
            candidates.retain(|c| c.article.sentiment == Some(wanted));
        }
        if let Some(wanted) = source.map(str::trim).filter(|s| !s.is_empty()) {
            candidates.retain(|c| c.article.source.name.eq_ignore_ascii_case(wanted));
        }

        // Vectors served their purpose; keep the cached payload lean
        for candidate in &mut candidates {
            candidate.article.vector = None;
        }

        let envelope = CacheEnvelope {
            results: candidates.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            method: "vector".to_string(),
            version: None,
        };
        if let Err(e) = self
            .cache
            .set_json(
                &cache_key,
                &envelope,
                self.config.cache.personalized_search_ttl_sec,
            )
            .await
        {
            warn!(error = %e, "Search write-back failed");
        }

        Ok(page_response(
            candidates,
            limit,
            offset,
            false,
            filtered_read_count,
            fallback,
        ))
    }

    /// Hit/miss counters for a user's personalization cache
    pub async fn stats(&self, user_id: &str) -> Result<CacheCounters, NewsflowError> {
        self.cache
            .stats(&keys::personalized_stats(user_id))
            .await
            .map_err(store_err)
    }

    async fn filter_read(
        &self,
        user_id: &str,
        candidates: Vec<FeedArticle>,
    ) -> Result<(Vec<FeedArticle>, usize), NewsflowError> {
        let read = self.read_history.read_set(user_id).await?;
        let before = candidates.len();
        let kept: Vec<FeedArticle> = candidates
            .into_iter()
            .filter(|c| !read.contains(&c.article.id))
            .collect();
        let removed = before - kept.len();
        Ok((kept, removed))
    }
}

/// Slice the requested window out of a filtered result list and assemble
/// the response envelope
fn page_response(
    filtered: Vec<FeedArticle>,
    limit: usize,
    offset: usize,
    cached: bool,
    filtered_read_count: usize,
    fallback: bool,
) -> FeedResponse {
    let total = filtered.len();
    let window: Vec<FeedArticle> = filtered
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|mut f| {
            f.article.vector = None;
            f
        })
        .collect();
    let personalized_count = window.iter().filter(|f| f.is_personalized()).count();

    FeedResponse {
        articles: window,
        total,
        personalized_count,
        cached,
        filtered_read_count,
        fallback,
    }
}

fn store_err(e: crate::cache::CacheError) -> NewsflowError {
    NewsflowError::StoreUnavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use newsflow_core::Source;

    fn feed_article(id: &str, score: f32, preference: &str) -> FeedArticle {
        let mut article = Article::new(
            format!("Title {id}"),
            Source {
                id: None,
                name: "Wire".to_string(),
            },
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        article.id = id.to_string();
        FeedArticle {
            article,
            final_score: score,
            matched_preference: preference.to_string(),
            preference_order: (preference != GENERAL).then_some(0),
            similarity: None,
            search_similarity: None,
        }
    }

    #[test]
    fn test_preference_version_hash_is_stable() {
        let prefs = vec!["technology".to_string(), "sports".to_string()];
        assert_eq!(preference_version_hash(&prefs), preference_version_hash(&prefs));
        assert_eq!(preference_version_hash(&prefs).len(), 32); // MD5 = 32 hex chars
    }

    #[test]
    fn test_preference_version_hash_is_order_sensitive() {
        let a = vec!["technology".to_string(), "sports".to_string()];
        let b = vec!["sports".to_string(), "technology".to_string()];
        assert_ne!(preference_version_hash(&a), preference_version_hash(&b));
    }

    #[test]
    fn test_search_cache_hash_varies_by_filters() {
        let base = search_cache_hash("rocket", None, None);
        assert_ne!(base, search_cache_hash("rocket", Some(Sentiment::Positive), None));
        assert_ne!(base, search_cache_hash("rocket", None, Some("Wire")));
        assert_eq!(base, search_cache_hash("rocket", None, None));
    }

    #[test]
    fn test_page_response_counts_personalized() {
        let filtered = vec![
            feed_article("a", 0.9, "technology"),
            feed_article("b", 0.5, GENERAL),
            feed_article("c", 0.4, "sports"),
        ];
        let response = page_response(filtered, 10, 0, false, 1, false);

        assert_eq!(response.total, 3);
        assert_eq!(response.personalized_count, 2);
        assert_eq!(response.filtered_read_count, 1);
        assert!(response.articles.iter().all(|a| a.article.vector.is_none()));
    }

    #[test]
    fn test_page_response_windows() {
        let filtered: Vec<FeedArticle> = (0..7)
            .map(|i| feed_article(&format!("a{i}"), 1.0 - i as f32 * 0.1, GENERAL))
            .collect();
        let response = page_response(filtered, 3, 3, true, 0, false);

        assert_eq!(response.articles.len(), 3);
        assert_eq!(response.articles[0].article.id, "a3");
        assert!(response.cached);
    }

    #[test]
    fn test_general_marker() {
        assert!(!feed_article("a", 0.1, GENERAL).is_personalized());
        assert!(feed_article("a", 0.9, "technology").is_personalized());
    }
}
