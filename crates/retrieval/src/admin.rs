//! Administrative cache operations
//!
//! Sweeping clears for operators: everything-but-user-data, named cache
//! families, and the nuclear option. Every sweep reports per-pattern counts,
//! bytes freed, and elapsed time; user-owned keys (`user:*`) are preserved
//! by everything short of nuclear.

use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use newsflow_core::NewsflowError;

use crate::cache::CacheLayer;

/// Literal confirmation token required by [`CacheAdmin::nuclear_clear`]
pub const NUCLEAR_TOKEN: &str = "NUCLEAR";

/// Pattern sweep outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternReport {
    pub pattern: String,
    pub description: String,
    pub keys_cleared: u64,
    pub time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of a clearing sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub patterns: Vec<PatternReport>,
    pub total_keys_cleared: u64,
    /// Memory delta measured around the sweep; negative when the store
    /// allocated in between
    pub bytes_freed: i64,
    pub elapsed_ms: u64,
    pub errors: Vec<String>,
}

/// One step of the nuclear clear
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NuclearStep {
    pub step: String,
    pub ok: bool,
    pub detail: String,
}

/// Result of a nuclear clear
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NuclearReport {
    pub keys_deleted: u64,
    pub indexes_dropped: u64,
    pub steps: Vec<NuclearStep>,
    pub elapsed_ms: u64,
}

/// Per-pattern population counts plus store-level numbers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub patterns: Vec<PatternCount>,
    pub total_keys: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternCount {
    pub pattern: String,
    pub description: String,
    pub count: u64,
}

/// Named cache families for targeted clears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    Articles,
    ArticleMetrics,
    Search,
    SimilarArticles,
    Personalized,
    Versions,
    Fallbacks,
    Temp,
    Vectors,
    SearchIndex,
}

impl FromStr for CacheType {
    type Err = NewsflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "articles" => Ok(Self::Articles),
            "article_metrics" => Ok(Self::ArticleMetrics),
            "search" => Ok(Self::Search),
            "similar_articles" => Ok(Self::SimilarArticles),
            "personalized" => Ok(Self::Personalized),
            "versions" => Ok(Self::Versions),
            "fallbacks" => Ok(Self::Fallbacks),
            "temp" => Ok(Self::Temp),
            "vectors" => Ok(Self::Vectors),
            "search_index" => Ok(Self::SearchIndex),
            other => Err(NewsflowError::BadInput(format!(
                "unknown cache type: {other}"
            ))),
        }
    }
}

impl CacheType {
    /// Patterns swept by this cache family
    pub fn patterns(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Articles => &[
                ("news:*", "article documents"),
                ("all_articles:*", "article list cache"),
            ],
            Self::ArticleMetrics => &[
                ("article_views:*", "view counters"),
                ("article_unique_views:*", "unique viewer sets"),
                ("article_user_views:*", "user viewer sets"),
                ("user_article_views:*", "per-user view maps"),
                ("article_daily_views:*", "daily view counters"),
                ("article_engagement:*", "engagement ring buffers"),
                ("article_last_viewed:*", "last-viewed markers"),
            ],
            Self::Search => &[("all_articles:*", "article list cache")],
            Self::SimilarArticles => &[
                ("similar:*", "similar-article payloads"),
                ("similar_meta:*", "similar-article sidecars"),
                ("similar_lru", "similar LRU set"),
                ("similar_bloom:*", "similar bloom hints"),
                ("similar_stats:*", "similar hit/miss counters"),
                ("similar_unique_articles:*", "daily unique HLLs"),
            ],
            Self::Personalized => &[
                ("personalized_simple:*", "personalized feed payloads"),
                ("personalized_search_simple:*", "personalized search payloads"),
                ("personalized_stats_simple:*", "personalization counters"),
            ],
            Self::Versions => &[("prefs_version_simple:*", "preference version guards")],
            Self::Fallbacks => &[("similar:*:fallback", "similarity tombstones")],
            Self::Temp => &[("temp:*", "temporary fusion sets")],
            Self::Vectors => &[("embedding:*", "cached embeddings")],
            Self::SearchIndex => &[("news:*", "indexed article documents")],
        }
    }

    /// Every family swept by the full clear, user data excluded
    pub const ALL: [CacheType; 9] = [
        Self::Articles,
        Self::ArticleMetrics,
        Self::Search,
        Self::SimilarArticles,
        Self::Personalized,
        Self::Versions,
        Self::Fallbacks,
        Self::Temp,
        Self::Vectors,
    ];
}

/// Administrative cache operations
pub struct CacheAdmin {
    cache: CacheLayer,
}

impl CacheAdmin {
    pub fn new(cache: CacheLayer) -> Self {
        Self { cache }
    }

    /// Clear every cache family while preserving all `user:*` keys
    #[instrument(skip(self))]
    pub async fn clear_all_except_user(&self) -> Result<ClearReport, NewsflowError> {
        self.sweep(&CacheType::ALL).await
    }

    /// Clear only the named cache families (still preserving `user:*`)
    #[instrument(skip(self))]
    pub async fn clear_specific_types(
        &self,
        types: &[CacheType],
    ) -> Result<ClearReport, NewsflowError> {
        if types.is_empty() {
            return Err(NewsflowError::BadInput(
                "at least one cache type is required".to_string(),
            ));
        }
        self.sweep(types).await
    }

    async fn sweep(&self, types: &[CacheType]) -> Result<ClearReport, NewsflowError> {
        let started = Instant::now();
        let memory_before = self.cache.memory_used_bytes().await;

        let mut reports = Vec::new();
        let mut errors = Vec::new();
        let mut total = 0u64;
        let mut seen_patterns = std::collections::HashSet::new();

        for cache_type in types {
            for (pattern, description) in cache_type.patterns() {
                if !seen_patterns.insert(*pattern) {
                    continue;
                }
                let pattern_start = Instant::now();
                match self.clear_pattern_preserving_user(pattern).await {
                    Ok(cleared) => {
                        total += cleared;
                        reports.push(PatternReport {
                            pattern: pattern.to_string(),
                            description: description.to_string(),
                            keys_cleared: cleared,
                            time_ms: pattern_start.elapsed().as_millis() as u64,
                            error: None,
                        });
                    }
                    Err(e) => {
                        warn!(pattern = %pattern, error = %e, "Pattern sweep failed");
                        errors.push(format!("{pattern}: {e}"));
                        reports.push(PatternReport {
                            pattern: pattern.to_string(),
                            description: description.to_string(),
                            keys_cleared: 0,
                            time_ms: pattern_start.elapsed().as_millis() as u64,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        }

        let memory_after = self.cache.memory_used_bytes().await;
        let bytes_freed = match (memory_before, memory_after) {
            (Some(before), Some(after)) => before as i64 - after as i64,
            _ => 0,
        };

        let report = ClearReport {
            patterns: reports,
            total_keys_cleared: total,
            bytes_freed,
            elapsed_ms: started.elapsed().as_millis() as u64,
            errors,
        };

        info!(
            keys = report.total_keys_cleared,
            bytes_freed = report.bytes_freed,
            elapsed_ms = report.elapsed_ms,
            "Cache sweep complete"
        );
        Ok(report)
    }

    /// Delete a pattern's keys, skipping anything under the user namespace
    async fn clear_pattern_preserving_user(&self, pattern: &str) -> Result<u64, NewsflowError> {
        let keys = self
            .cache
            .scan_pattern(pattern)
            .await
            .map_err(|e| NewsflowError::FatalCache(e.to_string()))?;

        let mut cleared = 0u64;
        for key in keys {
            if key.starts_with("user:") {
                continue;
            }
            cleared += self
                .cache
                .delete(&key)
                .await
                .map_err(|e| NewsflowError::FatalCache(e.to_string()))?;
        }
        Ok(cleared)
    }

    /// Delete every key and drop every search index
    ///
    /// Refuses to run unless `confirmation` equals the literal
    /// [`NUCLEAR_TOKEN`]. Missing store capabilities are reported per step
    /// rather than aborting the sweep.
    #[instrument(skip(self, confirmation))]
    pub async fn nuclear_clear(&self, confirmation: &str) -> Result<NuclearReport, NewsflowError> {
        if confirmation != NUCLEAR_TOKEN {
            return Err(NewsflowError::BadInput(format!(
                "confirmation token mismatch; type {NUCLEAR_TOKEN} to proceed"
            )));
        }

        let started = Instant::now();
        let mut steps = Vec::new();
        let mut keys_deleted = 0u64;
        let mut indexes_dropped = 0u64;

        match self.cache.delete_pattern("*").await {
            Ok(deleted) => {
                keys_deleted = deleted;
                steps.push(NuclearStep {
                    step: "delete_all_keys".to_string(),
                    ok: true,
                    detail: format!("{deleted} keys deleted"),
                });
            }
            Err(e) => steps.push(NuclearStep {
                step: "delete_all_keys".to_string(),
                ok: false,
                detail: e.to_string(),
            }),
        }

        match self.list_indexes().await {
            Ok(indexes) => {
                for index in indexes {
                    match self.drop_index(&index).await {
                        Ok(()) => {
                            indexes_dropped += 1;
                            steps.push(NuclearStep {
                                step: format!("drop_index:{index}"),
                                ok: true,
                                detail: "dropped".to_string(),
                            });
                        }
                        Err(e) => steps.push(NuclearStep {
                            step: format!("drop_index:{index}"),
                            ok: false,
                            detail: e,
                        }),
                    }
                }
            }
            Err(e) => steps.push(NuclearStep {
                step: "list_indexes".to_string(),
                ok: false,
                detail: e,
            }),
        }

        let report = NuclearReport {
            keys_deleted,
            indexes_dropped,
            steps,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        warn!(
            keys = report.keys_deleted,
            indexes = report.indexes_dropped,
            "Nuclear clear executed"
        );
        Ok(report)
    }

    async fn list_indexes(&self) -> Result<Vec<String>, String> {
        let mut conn = self.cache.clone_connection();
        redis::cmd("FT._LIST")
            .query_async::<_, Vec<String>>(&mut conn)
            .await
            .map_err(|e| e.to_string())
    }

    async fn drop_index(&self, index: &str) -> Result<(), String> {
        let mut conn = self.cache.clone_connection();
        redis::cmd("FT.DROPINDEX")
            .arg(index)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| e.to_string())
    }

    /// Per-pattern population counts and store memory
    pub async fn statistics(&self) -> Result<CacheStatistics, NewsflowError> {
        let mut patterns = Vec::new();
        let mut total = 0u64;
        let mut seen = std::collections::HashSet::new();

        for cache_type in CacheType::ALL {
            for (pattern, description) in cache_type.patterns() {
                if !seen.insert(*pattern) {
                    continue;
                }
                let count = self
                    .cache
                    .scan_pattern(pattern)
                    .await
                    .map_err(|e| NewsflowError::FatalCache(e.to_string()))?
                    .len() as u64;
                total += count;
                patterns.push(PatternCount {
                    pattern: pattern.to_string(),
                    description: description.to_string(),
                    count,
                });
            }
        }

        // User-owned keys are counted but never cleared
        let user_keys = self
            .cache
            .scan_pattern("user:*")
            .await
            .map_err(|e| NewsflowError::FatalCache(e.to_string()))?
            .len() as u64;
        total += user_keys;
        patterns.push(PatternCount {
            pattern: "user:*".to_string(),
            description: "user data (preserved by clears)".to_string(),
            count: user_keys,
        });

        Ok(CacheStatistics {
            patterns,
            total_keys: total,
            memory_used_bytes: self.cache.memory_used_bytes().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_type_parsing() {
        assert_eq!(
            "similar_articles".parse::<CacheType>().unwrap(),
            CacheType::SimilarArticles
        );
        assert_eq!(
            " ARTICLES ".parse::<CacheType>().unwrap(),
            CacheType::Articles
        );
        assert!("bogus".parse::<CacheType>().is_err());
    }

    #[test]
    fn test_no_sweep_pattern_touches_user_namespace() {
        for cache_type in CacheType::ALL {
            for (pattern, _) in cache_type.patterns() {
                assert!(
                    !pattern.starts_with("user:"),
                    "pattern {pattern} would sweep user data"
                );
            }
        }
    }

    #[test]
    fn test_all_families_have_patterns() {
        for cache_type in CacheType::ALL {
            assert!(!cache_type.patterns().is_empty());
        }
    }

    #[test]
    fn test_report_serialization() {
        let report = ClearReport {
            patterns: vec![PatternReport {
                pattern: "similar:*".to_string(),
                description: "similar-article payloads".to_string(),
                keys_cleared: 12,
                time_ms: 3,
                error: None,
            }],
            total_keys_cleared: 12,
            bytes_freed: 4096,
            elapsed_ms: 5,
            errors: vec![],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["totalKeysCleared"], 12);
        assert_eq!(json["patterns"][0]["keysCleared"], 12);
        assert!(json["patterns"][0].get("error").is_none());
    }
}
