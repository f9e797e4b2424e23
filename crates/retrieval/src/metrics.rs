//! Per-article view metrics and trending
//!
//! The total and daily counters are written synchronously (their store
//! return values are authoritative); everything else rides one best-effort
//! pipeline whose failure is logged and swallowed. Counters are best-effort
//! under concurrent writers by design.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;
use md5::{Digest, Md5};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use newsflow_core::{Article, NewsflowError, Source};

use crate::cache::keys;
use crate::index::IndexGateway;
use crate::store;

/// Engagement ring buffer bound per article
const ENGAGEMENT_CAP: isize = 1000;

/// Engagement record retention
const ENGAGEMENT_TTL_SEC: u64 = 86400 * 7;

/// Daily view counter retention
const DAILY_TTL_SEC: u64 = 86400 * 30;

/// Engagement entries folded into the grouped report
const REPORT_WINDOW: isize = 50;

/// Request context captured with a view
#[derive(Debug, Clone, Default)]
pub struct ViewContext {
    pub ip: Option<String>,
    pub user_id: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub language: Option<String>,
}

/// One engagement record in the ring buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementRecord {
    /// Epoch milliseconds of the view
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Counter snapshot for one article
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleMetricsSnapshot {
    pub total_views: u64,
    pub unique_viewers: u64,
    pub user_viewers: u64,
    pub today_views: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_viewed: Option<i64>,
}

/// Snapshot plus engagement groupings over the recent window
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    #[serde(flatten)]
    pub snapshot: ArticleMetricsSnapshot,
    pub views_by_hour: HashMap<String, u64>,
    pub views_by_referrer: HashMap<String, u64>,
    pub views_by_language: HashMap<String, u64>,
}

/// One entry of a user's view history
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserHistoryEntry {
    pub article_id: String,
    pub title: String,
    pub viewed_at: i64,
    pub source: Source,
}

/// A trending article with its growth factors
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingArticle {
    #[serde(flatten)]
    pub article: Article,
    pub today_views: u64,
    pub yesterday_views: u64,
    pub growth: f64,
}

/// Trending comparison window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendPeriod {
    #[default]
    Day,
    Week,
}

impl TrendPeriod {
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::to_lowercase).as_deref() {
            Some("week") => TrendPeriod::Week,
            _ => TrendPeriod::Day,
        }
    }

    fn days(&self) -> i64 {
        match self {
            TrendPeriod::Day => 1,
            TrendPeriod::Week => 7,
        }
    }
}

/// Records views and derives trending articles
#[derive(Clone)]
pub struct MetricsTracker {
    conn: ConnectionManager,
    index: Arc<IndexGateway>,
}

impl MetricsTracker {
    pub fn new(conn: ConnectionManager, index: Arc<IndexGateway>) -> Self {
        Self { conn, index }
    }

    /// Record one view of an article
    ///
    /// Counter increments return authoritative values; the rest of the
    /// bookkeeping is one pipelined best-effort step.
    #[instrument(skip(self, ctx), fields(article_id = %article_id))]
    pub async fn record_view(
        &self,
        article_id: &str,
        ctx: &ViewContext,
    ) -> Result<ArticleMetricsSnapshot, NewsflowError> {
        let now = Utc::now();
        let date = now.format("%Y-%m-%d").to_string();
        let mut conn = self.conn.clone();

        // Authoritative counters
        let (total_views, today_views): (u64, u64) = redis::pipe()
            .cmd("INCR")
            .arg(keys::article_views(article_id))
            .cmd("HINCRBY")
            .arg(keys::article_daily_views(article_id, &date))
            .arg("views")
            .arg(1)
            .cmd("EXPIRE")
            .arg(keys::article_daily_views(article_id, &date))
            .arg(DAILY_TTL_SEC)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        // Best-effort bookkeeping
        let record = EngagementRecord {
            ts: now.timestamp_millis(),
            ua: ctx.user_agent.clone(),
            referrer: ctx.referrer.clone(),
            lang: ctx.language.clone(),
            user_id: ctx.user_id.clone(),
        };

        let mut pipe = redis::pipe();
        if let Some(ip) = &ctx.ip {
            pipe.cmd("SADD")
                .arg(keys::article_unique_views(article_id))
                .arg(hash_ip(ip))
                .ignore();
        }
        if let Some(user_id) = &ctx.user_id {
            pipe.cmd("SADD")
                .arg(keys::article_user_views(article_id))
                .arg(user_id)
                .ignore();
            pipe.cmd("HSET")
                .arg(keys::user_article_views(user_id))
                .arg(article_id)
                .arg(now.timestamp_millis())
                .ignore();
        }
        if let Ok(json) = serde_json::to_string(&record) {
            pipe.cmd("LPUSH")
                .arg(keys::article_engagement(article_id))
                .arg(json)
                .ignore();
            pipe.cmd("LTRIM")
                .arg(keys::article_engagement(article_id))
                .arg(0)
                .arg(ENGAGEMENT_CAP - 1)
                .ignore();
            pipe.cmd("EXPIRE")
                .arg(keys::article_engagement(article_id))
                .arg(ENGAGEMENT_TTL_SEC)
                .ignore();
        }
        pipe.cmd("SET")
            .arg(keys::article_last_viewed(article_id))
            .arg(now.timestamp_millis())
            .ignore();

        if let Err(e) = pipe.query_async::<_, ()>(&mut conn).await {
            warn!(article_id = %article_id, error = %e, "Metrics bookkeeping failed");
        }

        // Cardinalities after the pipeline
        let (unique_viewers, user_viewers): (u64, u64) = redis::pipe()
            .cmd("SCARD")
            .arg(keys::article_unique_views(article_id))
            .cmd("SCARD")
            .arg(keys::article_user_views(article_id))
            .query_async(&mut conn)
            .await
            .unwrap_or((0, 0));

        Ok(ArticleMetricsSnapshot {
            total_views,
            unique_viewers,
            user_viewers,
            today_views,
            last_viewed: Some(now.timestamp_millis()),
        })
    }

    /// Full metrics report for an article
    pub async fn metrics(&self, article_id: &str) -> Result<MetricsReport, NewsflowError> {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let mut conn = self.conn.clone();

        let (total, unique, users, today, last, recent): (
            Option<u64>,
            u64,
            u64,
            Option<u64>,
            Option<i64>,
            Vec<String>,
        ) = redis::pipe()
            .cmd("GET")
            .arg(keys::article_views(article_id))
            .cmd("SCARD")
            .arg(keys::article_unique_views(article_id))
            .cmd("SCARD")
            .arg(keys::article_user_views(article_id))
            .cmd("HGET")
            .arg(keys::article_daily_views(article_id, &date))
            .arg("views")
            .cmd("GET")
            .arg(keys::article_last_viewed(article_id))
            .cmd("LRANGE")
            .arg(keys::article_engagement(article_id))
            .arg(0)
            .arg(REPORT_WINDOW - 1)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        let mut views_by_hour: HashMap<String, u64> = HashMap::new();
        let mut views_by_referrer: HashMap<String, u64> = HashMap::new();
        let mut views_by_language: HashMap<String, u64> = HashMap::new();

        for json in recent {
            let Ok(record) = serde_json::from_str::<EngagementRecord>(&json) else {
                continue;
            };
            if let Some(dt) = chrono::DateTime::from_timestamp_millis(record.ts) {
                *views_by_hour
                    .entry(dt.format("%H:00").to_string())
                    .or_default() += 1;
            }
            *views_by_referrer
                .entry(record.referrer.unwrap_or_else(|| "direct".to_string()))
                .or_default() += 1;
            *views_by_language
                .entry(record.lang.unwrap_or_else(|| "unknown".to_string()))
                .or_default() += 1;
        }

        Ok(MetricsReport {
            snapshot: ArticleMetricsSnapshot {
                total_views: total.unwrap_or(0),
                unique_viewers: unique,
                user_viewers: users,
                today_views: today.unwrap_or(0),
                last_viewed: last,
            },
            views_by_hour,
            views_by_referrer,
            views_by_language,
        })
    }

    /// A user's view history, hydrated and sorted newest first
    pub async fn user_history(&self, user_id: &str) -> Result<Vec<UserHistoryEntry>, NewsflowError> {
        let mut conn = self.conn.clone();
        let viewed: HashMap<String, i64> = redis::cmd("HGETALL")
            .arg(keys::user_article_views(user_id))
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        let ids: Vec<String> = viewed.keys().cloned().collect();
        let docs = join_all(ids.iter().map(|id| self.index.get_doc(id))).await;

        let mut entries: Vec<UserHistoryEntry> = ids
            .iter()
            .zip(docs)
            .filter_map(|(id, doc)| {
                let article = doc.ok().flatten()?;
                Some(UserHistoryEntry {
                    article_id: id.clone(),
                    title: article.title,
                    viewed_at: viewed.get(id).copied().unwrap_or(0),
                    source: article.source,
                })
            })
            .collect();

        entries.sort_by(|a, b| b.viewed_at.cmp(&a.viewed_at));
        Ok(entries)
    }

    /// Trending articles over a comparison window
    ///
    /// Articles with views in the current window are ranked by view count
    /// descending; growth compares against the preceding window of equal
    /// length.
    #[instrument(skip(self))]
    pub async fn trending(
        &self,
        limit: usize,
        period: TrendPeriod,
    ) -> Result<Vec<TrendingArticle>, NewsflowError> {
        let days = period.days();
        let current = self.window_views(0, days).await?;
        let previous = self.window_views(days, days).await?;

        let mut ranked: Vec<(String, u64, u64)> = current
            .into_iter()
            .filter(|(_, views)| *views > 0)
            .map(|(id, views)| {
                let prev = previous.get(&id).copied().unwrap_or(0);
                (id, views, prev)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(limit);

        let docs = join_all(ranked.iter().map(|(id, _, _)| self.index.get_doc(id))).await;

        let trending = ranked
            .into_iter()
            .zip(docs)
            .filter_map(|((_, today, yesterday), doc)| {
                let article = doc.ok().flatten()?;
                let growth = (today as f64 - yesterday as f64) / (yesterday.max(1) as f64);
                Some(TrendingArticle {
                    article: article.without_vector(),
                    today_views: today,
                    yesterday_views: yesterday,
                    growth,
                })
            })
            .collect();

        debug!(period_days = days, "Computed trending articles");
        Ok(trending)
    }

    /// Per-article view sums across `[start_offset, start_offset + days)`
    /// days back from today
    async fn window_views(
        &self,
        start_offset: i64,
        days: i64,
    ) -> Result<HashMap<String, u64>, NewsflowError> {
        let mut conn = self.conn.clone();
        let mut sums: HashMap<String, u64> = HashMap::new();

        for offset in start_offset..start_offset + days {
            let date = (Utc::now() - Duration::days(offset))
                .format("%Y-%m-%d")
                .to_string();
            let pattern = format!("article_daily_views:*:{date}");
            let keys = store::scan_keys(&mut conn, &pattern)
                .await
                .map_err(|e| NewsflowError::StoreUnavailable(e.to_string()))?;

            for key in keys {
                let Some(article_id) = article_id_from_daily_key(&key, &date) else {
                    continue;
                };
                let views: Option<u64> = redis::cmd("HGET")
                    .arg(&key)
                    .arg("views")
                    .query_async(&mut conn)
                    .await
                    .map_err(store_err)?;
                *sums.entry(article_id).or_default() += views.unwrap_or(0);
            }
        }

        Ok(sums)
    }
}

/// Viewer IPs are only ever stored hashed
fn hash_ip(ip: &str) -> String {
    hex::encode(Md5::digest(ip.as_bytes()))
}

fn article_id_from_daily_key(key: &str, date: &str) -> Option<String> {
    key.strip_prefix("article_daily_views:")?
        .strip_suffix(&format!(":{date}"))
        .map(str::to_string)
}

fn store_err(e: redis::RedisError) -> NewsflowError {
    NewsflowError::StoreUnavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_ip_stable_and_opaque() {
        let a = hash_ip("203.0.113.7");
        let b = hash_ip("203.0.113.7");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32); // MD5 = 32 hex chars
        assert!(!a.contains("203"));
    }

    #[test]
    fn test_article_id_from_daily_key() {
        assert_eq!(
            article_id_from_daily_key("article_daily_views:abc123:2024-01-01", "2024-01-01"),
            Some("abc123".to_string())
        );
        assert_eq!(
            article_id_from_daily_key("other_key:abc:2024-01-01", "2024-01-01"),
            None
        );
        // Id containing a colon survives intact
        assert_eq!(
            article_id_from_daily_key("article_daily_views:a:b:2024-01-01", "2024-01-01"),
            Some("a:b".to_string())
        );
    }

    #[test]
    fn test_trend_period_parsing() {
        assert_eq!(TrendPeriod::from_param(None), TrendPeriod::Day);
        assert_eq!(TrendPeriod::from_param(Some("day")), TrendPeriod::Day);
        assert_eq!(TrendPeriod::from_param(Some("WEEK")), TrendPeriod::Week);
        assert_eq!(TrendPeriod::from_param(Some("bogus")), TrendPeriod::Day);
    }

    #[test]
    fn test_engagement_record_round_trip() {
        let record = EngagementRecord {
            ts: 1_700_000_000_000,
            ua: Some("test-agent".to_string()),
            referrer: None,
            lang: Some("en".to_string()),
            user_id: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: EngagementRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ts, record.ts);
        assert_eq!(back.ua.as_deref(), Some("test-agent"));
        assert!(back.referrer.is_none());
    }

    #[test]
    fn test_growth_formula() {
        // (today - yesterday) / max(yesterday, 1)
        let growth = |today: u64, yesterday: u64| {
            (today as f64 - yesterday as f64) / (yesterday.max(1) as f64)
        };
        assert_eq!(growth(10, 5), 1.0);
        assert_eq!(growth(10, 0), 10.0);
        assert_eq!(growth(5, 10), -0.5);
    }
}
