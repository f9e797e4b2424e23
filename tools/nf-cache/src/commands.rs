//! Command implementations for the cache administration CLI

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::io::{self, Write};

use newsflow_retrieval::{
    admin::ClearReport, cache::CacheLayer, config::GatewayConfig, store, CacheAdmin, NUCLEAR_TOKEN,
};

async fn connect_admin(redis_url: &str) -> Result<CacheAdmin> {
    let mut config = GatewayConfig::default();
    config.store.url = redis_url.to_string();

    let conn = store::connect(&config.store.url)
        .await
        .context("Could not reach the backing store")?;
    Ok(CacheAdmin::new(CacheLayer::new(conn, config.cache)))
}

fn prompt(question: &str) -> Result<String> {
    print!("{question}");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

/// `nf-cache stats`
pub async fn stats(redis_url: &str) -> Result<()> {
    let admin = connect_admin(redis_url).await?;
    let statistics = admin.statistics().await?;

    println!("{}", "Cache population".bold());
    for entry in &statistics.patterns {
        println!(
            "  {:<36} {:>8}  {}",
            entry.pattern.cyan(),
            entry.count,
            entry.description.dimmed()
        );
    }
    println!("  {:<36} {:>8}", "total".bold(), statistics.total_keys);
    if let Some(bytes) = statistics.memory_used_bytes {
        println!("  {:<36} {:>8}", "memory (bytes)".bold(), bytes);
    }
    Ok(())
}

/// `nf-cache clear` / `nf-cache force`
pub async fn clear(redis_url: &str, force: bool) -> Result<()> {
    if !force {
        let answer = prompt("Clear all caches except user data? (y/N) ")?;
        if !answer.eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let admin = connect_admin(redis_url).await?;
    let report = admin.clear_all_except_user().await?;
    print_clear_report(&report);

    let path = write_metrics_file(&report)?;
    println!("Metrics written to {}", path.green());

    if !report.errors.is_empty() {
        bail!("{} pattern(s) failed to clear", report.errors.len());
    }
    Ok(())
}

/// `nf-cache complete-stats`
pub async fn complete_stats(redis_url: &str) -> Result<()> {
    let admin = connect_admin(redis_url).await?;
    let statistics = admin.statistics().await?;

    println!("{}", serde_json::to_string_pretty(&statistics)?);
    Ok(())
}

/// `nf-cache nuclear`
pub async fn nuclear(redis_url: &str) -> Result<()> {
    println!(
        "{}",
        "This deletes EVERY key and drops EVERY search index."
            .red()
            .bold()
    );
    let answer = prompt(&format!("Type {NUCLEAR_TOKEN} to confirm: "))?;

    let admin = connect_admin(redis_url).await?;
    let report = admin
        .nuclear_clear(&answer)
        .await
        .context("Nuclear clear refused")?;

    println!(
        "{} {} keys deleted, {} indexes dropped in {} ms",
        "Done:".green().bold(),
        report.keys_deleted,
        report.indexes_dropped,
        report.elapsed_ms
    );
    for step in &report.steps {
        let marker = if step.ok { "ok".green() } else { "failed".red() };
        println!("  [{}] {} {}", marker, step.step, step.detail.dimmed());
    }
    Ok(())
}

fn print_clear_report(report: &ClearReport) {
    println!("{}", "Cleared cache patterns".bold());
    for pattern in &report.patterns {
        match &pattern.error {
            None => println!(
                "  {:<36} {:>8} keys in {} ms",
                pattern.pattern.cyan(),
                pattern.keys_cleared,
                pattern.time_ms
            ),
            Some(error) => println!(
                "  {:<36} {}",
                pattern.pattern.cyan(),
                format!("failed: {error}").red()
            ),
        }
    }
    println!(
        "  {} {} keys, {} bytes freed, {} ms",
        "total:".bold(),
        report.total_keys_cleared,
        report.bytes_freed,
        report.elapsed_ms
    );
}

/// Emit the JSON metrics file: per-pattern results plus an aggregate
/// performance block
fn write_metrics_file(report: &ClearReport) -> Result<String> {
    let epoch_ms = chrono::Utc::now().timestamp_millis();
    let path = format!("cache_clear_metrics_{epoch_ms}.json");

    let patterns: Vec<serde_json::Value> = report
        .patterns
        .iter()
        .map(|p| {
            serde_json::json!({
                "keysCleared": p.keys_cleared,
                "description": p.description,
                "pattern": p.pattern,
                "timeMs": p.time_ms,
            })
        })
        .collect();

    let body = serde_json::json!({
        "patterns": patterns,
        "performance": {
            "totalKeysCleared": report.total_keys_cleared,
            "bytesFreed": report.bytes_freed,
            "elapsedMs": report.elapsed_ms,
            "errorCount": report.errors.len(),
        },
        "timestamp": epoch_ms,
    });

    std::fs::write(&path, serde_json::to_string_pretty(&body)?)
        .with_context(|| format!("Failed to write {path}"))?;
    Ok(path)
}
