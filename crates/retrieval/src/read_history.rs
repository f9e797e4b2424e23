//! Per-user read history
//!
//! Records "already viewed" article ids with a two-hour TTL: one marker key
//! per view plus a scored set ordered by view time for bulk enumeration.
//! Feed construction filters its candidates through this set so users are
//! not shown articles they just read.

use std::collections::HashSet;

use redis::aio::ConnectionManager;
use tracing::{debug, instrument};

use newsflow_core::NewsflowError;

use crate::cache::keys;

/// Read-history manager over the backing store
#[derive(Clone)]
pub struct ReadHistory {
    conn: ConnectionManager,
    ttl_sec: u64,
}

impl ReadHistory {
    pub fn new(conn: ConnectionManager, ttl_sec: u64) -> Self {
        Self { conn, ttl_sec }
    }

    /// Record that a user viewed an article
    ///
    /// Idempotent apart from the refreshed timestamp: re-marking an article
    /// re-scores it in the read set and extends the TTLs.
    #[instrument(skip(self))]
    pub async fn mark_read(&self, user_id: &str, article_id: &str) -> Result<(), NewsflowError> {
        let now = chrono::Utc::now().timestamp();
        let mut conn = self.conn.clone();

        redis::pipe()
            .cmd("SET")
            .arg(keys::read(user_id, article_id))
            .arg(now)
            .arg("EX")
            .arg(self.ttl_sec)
            .ignore()
            .cmd("ZADD")
            .arg(keys::read_set(user_id))
            .arg(now)
            .arg(article_id)
            .ignore()
            .cmd("EXPIRE")
            .arg(keys::read_set(user_id))
            .arg(self.ttl_sec)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)?;

        debug!(user_id = %user_id, article_id = %article_id, "Marked article read");
        Ok(())
    }

    /// All recently read article ids, oldest first
    pub async fn list_read(&self, user_id: &str) -> Result<Vec<String>, NewsflowError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = redis::cmd("ZRANGE")
            .arg(keys::read_set(user_id))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(ids)
    }

    /// The read set as a lookup structure
    pub async fn read_set(&self, user_id: &str) -> Result<HashSet<String>, NewsflowError> {
        Ok(self.list_read(user_id).await?.into_iter().collect())
    }

    /// Remove already-read ids from a candidate list, preserving order
    ///
    /// Returns the surviving candidates and the number removed.
    pub async fn filter_unread(
        &self,
        user_id: &str,
        candidates: Vec<String>,
    ) -> Result<(Vec<String>, usize), NewsflowError> {
        let read = self.read_set(user_id).await?;
        let before = candidates.len();
        let kept: Vec<String> = candidates
            .into_iter()
            .filter(|id| !read.contains(id))
            .collect();
        let removed = before - kept.len();
        Ok((kept, removed))
    }
}

fn store_err(e: redis::RedisError) -> NewsflowError {
    NewsflowError::StoreUnavailable(e.to_string())
}
