//! Backing store connection bootstrap and shared helpers
//!
//! One [`ConnectionManager`] is created at startup and cloned into every
//! component; the manager multiplexes commands over a single reconnecting
//! connection.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{debug, info};

/// Open a connection manager against the configured store URL
///
/// # Errors
/// Returns an error when the client cannot be created or the initial PING
/// fails.
pub async fn connect(url: &str) -> Result<ConnectionManager> {
    info!(store_url = %url, "Connecting to backing store");

    let client = Client::open(url).context("Failed to create store client")?;
    let manager = ConnectionManager::new(client)
        .await
        .context("Failed to create store connection manager")?;

    // Test connection
    let mut conn = manager.clone();
    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Store ping failed")?;

    info!("Backing store connection established");
    Ok(manager)
}

/// Collect all keys matching a glob pattern via cursor SCAN
///
/// SCAN is used instead of KEYS so admin sweeps do not block the store on
/// large keyspaces.
pub async fn scan_keys(conn: &mut ConnectionManager, pattern: &str) -> Result<Vec<String>> {
    let mut cursor: u64 = 0;
    let mut keys = Vec::new();

    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(500)
            .query_async(conn)
            .await
            .context("SCAN failed")?;

        keys.extend(batch);
        cursor = next;
        if cursor == 0 {
            break;
        }
    }

    debug!(pattern = %pattern, count = keys.len(), "Scanned keys");
    Ok(keys)
}

/// Delete every key matching a glob pattern; returns the number deleted
pub async fn delete_matching(conn: &mut ConnectionManager, pattern: &str) -> Result<u64> {
    let keys = scan_keys(conn, pattern).await?;
    if keys.is_empty() {
        return Ok(0);
    }

    let mut deleted = 0u64;
    for chunk in keys.chunks(500) {
        let n: u64 = redis::cmd("DEL")
            .arg(chunk)
            .query_async(conn)
            .await
            .context("DEL failed")?;
        deleted += n;
    }

    Ok(deleted)
}

/// Current memory usage of the store in bytes, when reported
pub async fn memory_used_bytes(conn: &mut ConnectionManager) -> Option<u64> {
    let info: String = redis::cmd("INFO")
        .arg("memory")
        .query_async(conn)
        .await
        .ok()?;

    for line in info.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key == "used_memory" {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

/// Check that the store answers PING
pub async fn health_check(conn: &mut ConnectionManager) -> bool {
    matches!(
        redis::cmd("PING").query_async::<_, String>(conn).await,
        Ok(ref pong) if pong == "PONG"
    )
}
