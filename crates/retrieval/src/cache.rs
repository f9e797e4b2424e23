//! Cache layer over the backing store
//!
//! Read-through/write-through caches keyed by (namespace, subject, params)
//! with:
//! - JSON envelope payloads plus metadata sidecars
//! - one pipelined round trip for probe operations
//! - hit/miss statistics per subject
//! - LRU sorted sets bounding cache population
//! - bloom-filter membership hints with graceful degradation
//! - hyper-log-log daily uniques

use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::store;

/// Error types for cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("store connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache operation failed: {0}")]
    Operation(String),
}

/// Cache payload envelope
///
/// `results` is the full (pre-pagination, pre-filter) result list; callers
/// slice their window out of it so one entry serves every page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    pub results: Vec<T>,
    /// Epoch milliseconds at write time
    pub timestamp: i64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Metadata sidecar stored alongside a payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSidecar {
    pub total_count: usize,
    pub timestamp: i64,
    pub method: String,
    pub last_updated: String,
}

impl CacheSidecar {
    pub fn new(total_count: usize, method: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            total_count,
            timestamp: now.timestamp_millis(),
            method: method.to_string(),
            last_updated: now.to_rfc3339(),
        }
    }
}

/// Hit/miss counters for one cache subject
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheCounters {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
}

/// Persisted key layout
///
/// Builders for every key the platform stores; engines never format keys
/// inline.
pub mod keys {
    /// Authoritative article document
    pub fn article(id: &str) -> String {
        format!("news:{id}")
    }

    pub fn all_articles(limit: usize, offset: usize) -> String {
        format!("all_articles:{limit}:{offset}")
    }

    pub fn similar(id: &str, limit: usize, offset: usize) -> String {
        format!("similar:{id}:{limit}:{offset}")
    }

    pub fn similar_meta(id: &str) -> String {
        format!("similar_meta:{id}")
    }

    /// Last-known-good tombstone, served only on catastrophic failure
    pub fn similar_fallback(id: &str) -> String {
        format!("similar:{id}:fallback")
    }

    pub fn similar_stats(id: &str) -> String {
        format!("similar_stats:{id}")
    }

    pub fn similar_bloom(id: &str) -> String {
        format!("similar_bloom:{id}")
    }

    pub const SIMILAR_LRU: &str = "similar_lru";

    pub fn similar_unique(date: &str) -> String {
        format!("similar_unique_articles:{date}")
    }

    pub fn temp_similarity(target_id: &str, epoch_ms: i64) -> String {
        format!("temp:similarity:{target_id}:{epoch_ms}")
    }

    pub fn personalized(user_id: &str, limit: usize, offset: usize) -> String {
        format!("personalized_simple:{user_id}:{limit}:{offset}")
    }

    pub fn personalized_search(user_id: &str, hash: &str, limit: usize, offset: usize) -> String {
        format!("personalized_search_simple:{user_id}:{hash}:{limit}:{offset}")
    }

    pub fn personalized_stats(user_id: &str) -> String {
        format!("personalized_stats_simple:{user_id}")
    }

    pub fn prefs_version(user_id: &str) -> String {
        format!("prefs_version_simple:{user_id}")
    }

    pub fn user_preferences(user_id: &str) -> String {
        format!("user:{user_id}:preferences")
    }

    pub fn read(user_id: &str, article_id: &str) -> String {
        format!("user:{user_id}:read:{article_id}")
    }

    pub fn read_set(user_id: &str) -> String {
        format!("user:{user_id}:read_set")
    }

    pub fn article_views(id: &str) -> String {
        format!("article_views:{id}")
    }

    pub fn article_unique_views(id: &str) -> String {
        format!("article_unique_views:{id}")
    }

    pub fn article_user_views(id: &str) -> String {
        format!("article_user_views:{id}")
    }

    pub fn user_article_views(user_id: &str) -> String {
        format!("user_article_views:{user_id}")
    }

    pub fn article_daily_views(id: &str, date: &str) -> String {
        format!("article_daily_views:{id}:{date}")
    }

    pub fn article_engagement(id: &str) -> String {
        format!("article_engagement:{id}")
    }

    pub fn article_last_viewed(id: &str) -> String {
        format!("article_last_viewed:{id}")
    }

    pub fn embedding(text_hash: &str) -> String {
        format!("embedding:{text_hash}")
    }
}

/// Cache layer with a multiplexed store connection
#[derive(Clone)]
pub struct CacheLayer {
    conn: ConnectionManager,
    config: CacheConfig,
}

impl CacheLayer {
    pub fn new(conn: ConnectionManager, config: CacheConfig) -> Self {
        Self { conn, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Clone of the underlying connection, for raw store commands
    pub fn clone_connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Fetch payload and sidecar in a single pipelined round trip
    pub async fn probe<T: DeserializeOwned>(
        &self,
        payload_key: &str,
        meta_key: &str,
    ) -> Result<(Option<CacheEnvelope<T>>, Option<CacheSidecar>), CacheError> {
        let mut conn = self.conn.clone();

        let (payload, meta): (Option<String>, Option<String>) = redis::pipe()
            .cmd("GET")
            .arg(payload_key)
            .cmd("GET")
            .arg(meta_key)
            .query_async(&mut conn)
            .await?;

        let envelope = match payload {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        let sidecar = match meta {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        debug!(
            key = %payload_key,
            hit = envelope.is_some(),
            "Cache probe"
        );

        Ok((envelope, sidecar))
    }

    /// Fetch a payload and its guard value (a plain string key) in a single
    /// pipelined round trip
    pub async fn probe_versioned<T: DeserializeOwned>(
        &self,
        payload_key: &str,
        version_key: &str,
    ) -> Result<(Option<CacheEnvelope<T>>, Option<String>), CacheError> {
        let mut conn = self.conn.clone();

        let (payload, version): (Option<String>, Option<String>) = redis::pipe()
            .cmd("GET")
            .arg(payload_key)
            .cmd("GET")
            .arg(version_key)
            .query_async(&mut conn)
            .await?;

        let envelope = match payload {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        Ok((envelope, version))
    }

    /// Store a plain string value with TTL
    pub async fn set_string(&self, key: &str, value: &str, ttl_sec: u64) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_sec)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Write an envelope and its sidecar with a shared TTL
    pub async fn put_with_sidecar<T: Serialize>(
        &self,
        payload_key: &str,
        meta_key: &str,
        envelope: &CacheEnvelope<T>,
        sidecar: &CacheSidecar,
        ttl_sec: u64,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(envelope)?;
        let meta = serde_json::to_string(sidecar)?;
        let mut conn = self.conn.clone();

        redis::pipe()
            .cmd("SET")
            .arg(payload_key)
            .arg(payload)
            .arg("EX")
            .arg(ttl_sec)
            .ignore()
            .cmd("SET")
            .arg(meta_key)
            .arg(meta)
            .arg("EX")
            .arg(ttl_sec)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!(key = %payload_key, ttl = ttl_sec, "Cache write-back");
        Ok(())
    }

    /// Get a JSON value
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Set a JSON value with TTL; `ttl_sec == 0` stores without expiry
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_sec: u64,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.conn.clone();

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(json);
        if ttl_sec > 0 {
            cmd.arg("EX").arg(ttl_sec);
        }
        cmd.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// Delete a single key; returns the number removed (0 or 1)
    pub async fn delete(&self, key: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let count: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(count)
    }

    /// Record a hit or miss against a subject's counter hash
    pub async fn stats_bump(&self, stats_key: &str, hit: bool) -> Result<(), CacheError> {
        let field = if hit { "cache_hits" } else { "cache_misses" };
        let mut conn = self.conn.clone();

        redis::pipe()
            .cmd("HINCRBY")
            .arg(stats_key)
            .arg("total_requests")
            .arg(1)
            .ignore()
            .cmd("HINCRBY")
            .arg(stats_key)
            .arg(field)
            .arg(1)
            .ignore()
            .cmd("EXPIRE")
            .arg(stats_key)
            .arg(self.config.stats_ttl_sec)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    /// Read a subject's counters and derive the hit rate
    pub async fn stats(&self, stats_key: &str) -> Result<CacheCounters, CacheError> {
        let mut conn = self.conn.clone();
        let fields: std::collections::HashMap<String, u64> = redis::cmd("HGETALL")
            .arg(stats_key)
            .query_async(&mut conn)
            .await?;

        let mut counters = CacheCounters {
            cache_hits: fields.get("cache_hits").copied().unwrap_or(0),
            cache_misses: fields.get("cache_misses").copied().unwrap_or(0),
            total_requests: fields.get("total_requests").copied().unwrap_or(0),
            hit_rate: 0.0,
        };
        if counters.total_requests > 0 {
            counters.hit_rate = counters.cache_hits as f64 / counters.total_requests as f64;
        }
        Ok(counters)
    }

    /// Register a cache key in an LRU set and trim it to the configured cap
    pub async fn lru_touch(&self, lru_key: &str, member: &str) -> Result<(), CacheError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let max = self.config.lru_max_entries as i64;
        let mut conn = self.conn.clone();

        redis::pipe()
            .cmd("ZADD")
            .arg(lru_key)
            .arg(now_ms)
            .arg(member)
            .ignore()
            .cmd("ZREMRANGEBYRANK")
            .arg(lru_key)
            .arg(0)
            .arg(-(max + 1))
            .ignore()
            .cmd("EXPIRE")
            .arg(lru_key)
            .arg(self.config.similar_ttl_sec * 24)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    /// Members of an LRU set, most recent first
    pub async fn lru_members(&self, lru_key: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(lru_key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    /// Set a bloom membership bit, degrading to a marker key when the
    /// bloom module is unavailable. Best-effort: failures are logged.
    pub async fn bloom_mark(&self, bloom_key: &str, member: &str) {
        let mut conn = self.conn.clone();

        let result: Result<i64, _> = redis::cmd("BF.ADD")
            .arg(bloom_key)
            .arg(member)
            .query_async(&mut conn)
            .await;

        if result.is_err() {
            // Module absent; a marker key with the same TTL is hint enough
            let marker = format!("{bloom_key}:{member}");
            if let Err(e) = redis::cmd("SET")
                .arg(&marker)
                .arg(1)
                .arg("EX")
                .arg(self.config.similar_ttl_sec)
                .query_async::<_, ()>(&mut conn)
                .await
            {
                debug!(error = %e, key = %bloom_key, "Bloom hint write failed");
            }
        }
    }

    /// Probe a bloom membership bit (or its marker-key fallback)
    pub async fn bloom_seen(&self, bloom_key: &str, member: &str) -> bool {
        let mut conn = self.conn.clone();

        match redis::cmd("BF.EXISTS")
            .arg(bloom_key)
            .arg(member)
            .query_async::<_, i64>(&mut conn)
            .await
        {
            Ok(n) => n > 0,
            Err(_) => {
                let marker = format!("{bloom_key}:{member}");
                redis::cmd("EXISTS")
                    .arg(&marker)
                    .query_async::<_, i64>(&mut conn)
                    .await
                    .map(|n| n > 0)
                    .unwrap_or(false)
            }
        }
    }

    /// Add a member to a daily hyper-log-log; best-effort
    pub async fn hll_add(&self, hll_key: &str, member: &str) {
        let mut conn = self.conn.clone();
        let result = redis::pipe()
            .cmd("PFADD")
            .arg(hll_key)
            .arg(member)
            .ignore()
            .cmd("EXPIRE")
            .arg(hll_key)
            .arg(86400 * 2)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await;

        if let Err(e) = result {
            debug!(error = %e, key = %hll_key, "HLL add failed");
        }
    }

    /// Estimated cardinality of a hyper-log-log key
    pub async fn hll_count(&self, hll_key: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let count: u64 = redis::cmd("PFCOUNT")
            .arg(hll_key)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    /// Remove every similar-article cache entry for one article:
    /// payloads (including the tombstone), sidecar, stats, bloom hints,
    /// and the corresponding LRU members.
    pub async fn invalidate_similar(&self, article_id: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();

        let payload_keys = store::scan_keys(&mut conn, &format!("similar:{article_id}:*"))
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))?;

        let mut pipe = redis::pipe();
        for key in &payload_keys {
            pipe.cmd("ZREM").arg(keys::SIMILAR_LRU).arg(key).ignore();
            pipe.cmd("DEL").arg(key).ignore();
        }
        pipe.cmd("DEL").arg(keys::similar_meta(article_id)).ignore();
        pipe.cmd("DEL")
            .arg(keys::similar_stats(article_id))
            .ignore();
        pipe.cmd("DEL")
            .arg(keys::similar_bloom(article_id))
            .ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;

        // Marker-key bloom fallbacks, if any
        let bloom_markers = store::delete_matching(
            &mut conn,
            &format!("{}:*", keys::similar_bloom(article_id)),
        )
        .await
        .unwrap_or(0);

        let cleared = payload_keys.len() as u64 + 3 + bloom_markers;
        debug!(article_id = %article_id, cleared, "Invalidated similar caches");
        Ok(cleared)
    }

    /// All keys matching a pattern (SCAN-based)
    pub async fn scan_pattern(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        store::scan_keys(&mut conn, pattern)
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))
    }

    /// Delete all keys matching a pattern; returns the number deleted
    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let deleted = store::delete_matching(&mut conn, pattern)
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))?;

        if deleted > 0 {
            warn!(pattern = %pattern, deleted, "Deleted keys by pattern");
        }
        Ok(deleted)
    }

    /// Store memory usage, for admin byte-freed reporting
    pub async fn memory_used_bytes(&self) -> Option<u64> {
        let mut conn = self.conn.clone();
        store::memory_used_bytes(&mut conn).await
    }

    /// Check that the store answers PING
    pub async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        store::health_check(&mut conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(keys::article("abc"), "news:abc");
        assert_eq!(keys::similar("abc", 10, 0), "similar:abc:10:0");
        assert_eq!(keys::similar_fallback("abc"), "similar:abc:fallback");
        assert_eq!(keys::personalized("u1", 10, 0), "personalized_simple:u1:10:0");
        assert_eq!(
            keys::personalized_search("u1", "h", 10, 0),
            "personalized_search_simple:u1:h:10:0"
        );
        assert_eq!(keys::prefs_version("u1"), "prefs_version_simple:u1");
        assert_eq!(keys::read("u1", "a1"), "user:u1:read:a1");
        assert_eq!(keys::read_set("u1"), "user:u1:read_set");
        assert_eq!(
            keys::article_daily_views("a1", "2024-01-01"),
            "article_daily_views:a1:2024-01-01"
        );
        assert_eq!(
            keys::temp_similarity("a1", 1700000000000),
            "temp:similarity:a1:1700000000000"
        );
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = CacheEnvelope {
            results: vec!["x".to_string(), "y".to_string()],
            timestamp: 1_700_000_000_000,
            method: "vector".to_string(),
            version: Some("abc".to_string()),
        };

        let json = serde_json::to_string(&envelope).unwrap();
        let back: CacheEnvelope<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.results, envelope.results);
        assert_eq!(back.method, "vector");
        assert_eq!(back.version.as_deref(), Some("abc"));
    }

    #[test]
    fn test_sidecar_serializes_camel_case() {
        let sidecar = CacheSidecar::new(7, "vector");
        let json = serde_json::to_value(&sidecar).unwrap();
        assert_eq!(json.get("totalCount").unwrap(), 7);
        assert!(json.get("lastUpdated").is_some());
    }

    #[test]
    fn test_counters_hit_rate() {
        let counters = CacheCounters {
            cache_hits: 3,
            cache_misses: 1,
            total_requests: 4,
            hit_rate: 0.75,
        };
        assert!((counters.hit_rate - 0.75).abs() < f64::EPSILON);
    }
}
