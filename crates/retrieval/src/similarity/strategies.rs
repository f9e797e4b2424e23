//! Fallback similarity strategies and weighted rank fusion
//!
//! When the vector path is unavailable, four independent strategies run
//! concurrently; any of them may fail without aborting the blend. Fused
//! scores accumulate in a short-lived store-side sorted set so the ranking
//! matches the persisted key layout rather than a process-local structure.

use chrono::Duration;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use newsflow_core::Article;

use crate::config::SimilarityConfig;
use crate::index::{sanitize_term, IndexGateway, SearchOptions, SortBy, TEXT_FIELDS};
use crate::similarity::terms;

/// One candidate produced by a strategy
#[derive(Debug, Clone)]
pub(crate) struct StrategyHit {
    pub id: String,
    pub score: f32,
}

/// Outcome of one strategy run, tagged with its fusion weight
pub(crate) struct StrategyOutcome {
    pub weight: f32,
    pub hits: Vec<StrategyHit>,
}

/// OR a set of extracted terms across the text fields
fn or_terms_query(extracted: &[String]) -> Option<String> {
    let clean: Vec<String> = extracted
        .iter()
        .map(|t| sanitize_term(t))
        .filter(|t| !t.is_empty())
        .collect();
    if clean.is_empty() {
        return None;
    }

    let alternation = clean.join("|");
    let clauses: Vec<String> = TEXT_FIELDS
        .iter()
        .map(|f| format!("(@{f}:({alternation}))"))
        .collect();
    Some(format!("({})", clauses.join("|")))
}

/// Linear rank decay: first hit scores 1.0, last approaches 0
fn rank_score(rank: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (total - rank) as f32 / total as f32
}

fn hits_by_rank(articles: Vec<Article>, exclude_id: &str) -> Vec<StrategyHit> {
    let kept: Vec<Article> = articles
        .into_iter()
        .filter(|a| a.id != exclude_id)
        .collect();
    let total = kept.len();
    kept.into_iter()
        .enumerate()
        .map(|(rank, article)| StrategyHit {
            id: article.id,
            score: rank_score(rank, total),
        })
        .collect()
}

/// Text strategy: unigram/bigram expansion over the target's prose
pub(crate) async fn text_strategy(
    index: &IndexGateway,
    target: &Article,
    fetch: usize,
) -> anyhow::Result<Vec<StrategyHit>> {
    let extracted = terms::unigrams_and_bigrams(&terms::searchable_text(target));
    let Some(query) = or_terms_query(&extracted) else {
        return Ok(Vec::new());
    };

    let page = index
        .run_search(
            &query,
            SearchOptions {
                sort_by: SortBy::Relevance,
                limit: fetch,
                offset: 0,
            },
        )
        .await?;
    Ok(hits_by_rank(page.articles, &target.id))
}

/// Semantic strategy: named entities, quoted phrases, technical tokens
pub(crate) async fn semantic_strategy(
    index: &IndexGateway,
    target: &Article,
    fetch: usize,
) -> anyhow::Result<Vec<StrategyHit>> {
    let extracted = terms::semantic_terms(&terms::searchable_text(target));
    let Some(query) = or_terms_query(&extracted) else {
        return Ok(Vec::new());
    };

    let page = index
        .run_search(
            &query,
            SearchOptions {
                sort_by: SortBy::Relevance,
                limit: fetch,
                offset: 0,
            },
        )
        .await?;
    Ok(hits_by_rank(page.articles, &target.id))
}

/// Per-candidate category score against the target
pub(crate) fn category_score(target: &Article, candidate: &Article) -> f32 {
    let sentiment_match = match (target.sentiment, candidate.sentiment) {
        (Some(a), Some(b)) if a == b => 1.0,
        _ => 0.0,
    };
    let source_match = if !target.source.name.is_empty()
        && target.source.name.eq_ignore_ascii_case(&candidate.source.name)
    {
        1.0
    } else {
        0.0
    };
    let category_match = if target
        .keywords
        .iter()
        .any(|k| candidate.keywords.iter().any(|c| c.eq_ignore_ascii_case(k)))
    {
        1.0
    } else {
        0.0
    };

    0.3 * sentiment_match + 0.2 * source_match + 0.3 * category_match
}

/// Category strategy: candidates sharing the target's sentiment or source
pub(crate) async fn category_strategy(
    index: &IndexGateway,
    target: &Article,
    fetch: usize,
) -> anyhow::Result<Vec<StrategyHit>> {
    let mut clauses = Vec::new();
    if let Some(sentiment) = target.sentiment {
        clauses.push(crate::index::tag_filter("sentiment", sentiment.as_str()));
    }
    if !target.source.name.is_empty() {
        clauses.push(crate::index::tag_filter("source", &target.source.name));
    }
    if clauses.is_empty() {
        return Ok(Vec::new());
    }

    let query = format!("({})", clauses.join("|"));
    let page = index
        .run_search(
            &query,
            SearchOptions {
                sort_by: SortBy::Recency,
                limit: fetch,
                offset: 0,
            },
        )
        .await?;

    Ok(page
        .articles
        .into_iter()
        .filter(|a| a.id != target.id)
        .map(|candidate| StrategyHit {
            score: category_score(target, &candidate),
            id: candidate.id,
        })
        .filter(|hit| hit.score > 0.0)
        .collect())
}

/// Per-candidate temporal score: proximity decay over the configured horizon
pub(crate) fn temporal_score(
    target: &Article,
    candidate: &Article,
    decay_days: i64,
) -> f32 {
    let delta_days = (candidate.published_at - target.published_at)
        .num_days()
        .unsigned_abs() as f32;
    (1.0 - delta_days / decay_days as f32).max(0.0)
}

/// Temporal strategy: candidates published near the target
pub(crate) async fn temporal_strategy(
    index: &IndexGateway,
    target: &Article,
    fetch: usize,
    config: &SimilarityConfig,
) -> anyhow::Result<Vec<StrategyHit>> {
    let window = Duration::days(config.temporal_window_days);
    let min = (target.published_at - window).timestamp();
    let max = (target.published_at + window).timestamp();
    let query = format!("@published_at:[{min} {max}]");

    let page = index
        .run_search(
            &query,
            SearchOptions {
                sort_by: SortBy::Recency,
                limit: fetch,
                offset: 0,
            },
        )
        .await?;

    Ok(page
        .articles
        .into_iter()
        .filter(|a| a.id != target.id)
        .map(|candidate| StrategyHit {
            score: temporal_score(target, &candidate, config.temporal_decay_days),
            id: candidate.id,
        })
        .filter(|hit| hit.score > 0.0)
        .collect())
}

/// Run all four strategies concurrently, tolerating individual failures
pub(crate) async fn run_all(
    index: &IndexGateway,
    target: &Article,
    fetch: usize,
    config: &SimilarityConfig,
) -> Vec<StrategyOutcome> {
    let (text, semantic, category, temporal) = tokio::join!(
        text_strategy(index, target, fetch),
        semantic_strategy(index, target, fetch),
        category_strategy(index, target, fetch),
        temporal_strategy(index, target, fetch, config),
    );

    let mut outcomes = Vec::with_capacity(4);
    for (name, weight, result) in [
        ("text", config.text_weight, text),
        ("semantic", config.semantic_weight, semantic),
        ("category", config.category_weight, category),
        ("temporal", config.temporal_weight, temporal),
    ] {
        match result {
            Ok(hits) => {
                debug!(strategy = name, hits = hits.len(), "Strategy completed");
                outcomes.push(StrategyOutcome { weight, hits });
            }
            Err(e) => {
                warn!(strategy = name, error = %e, "Strategy failed, continuing without it");
            }
        }
    }
    outcomes
}

/// Accumulate weighted scores in a temporary store-side sorted set and read
/// the requested window back in descending fused order.
///
/// Returns `(ranked ids with fused scores, total candidates)`.
pub(crate) async fn fuse_ranked(
    conn: &mut ConnectionManager,
    temp_key: &str,
    outcomes: &[StrategyOutcome],
    limit: usize,
    offset: usize,
) -> anyhow::Result<(Vec<(String, f32)>, u64)> {
    let mut pipe = redis::pipe();
    let mut any = false;
    for outcome in outcomes {
        for hit in &outcome.hits {
            pipe.cmd("ZINCRBY")
                .arg(temp_key)
                .arg((outcome.weight * hit.score) as f64)
                .arg(&hit.id)
                .ignore();
            any = true;
        }
    }
    if !any {
        return Ok((Vec::new(), 0));
    }
    // Safety TTL in case the explicit delete below never runs
    pipe.cmd("EXPIRE").arg(temp_key).arg(60).ignore();
    pipe.query_async::<_, ()>(conn).await?;

    let (total, window): (u64, Vec<(String, f64)>) = redis::pipe()
        .cmd("ZCARD")
        .arg(temp_key)
        .cmd("ZREVRANGE")
        .arg(temp_key)
        .arg(offset)
        .arg((offset + limit).saturating_sub(1))
        .arg("WITHSCORES")
        .query_async(conn)
        .await?;

    redis::cmd("DEL")
        .arg(temp_key)
        .query_async::<_, ()>(conn)
        .await?;

    Ok((
        window
            .into_iter()
            .map(|(id, score)| (id, score as f32))
            .collect(),
        total,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use newsflow_core::{Sentiment, Source};

    fn article(id: &str, title: &str) -> Article {
        let mut a = Article::new(
            title.to_string(),
            Source {
                id: None,
                name: "Wire".to_string(),
            },
            Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
        );
        a.id = id.to_string();
        a
    }

    #[test]
    fn test_rank_score_decays() {
        assert_eq!(rank_score(0, 4), 1.0);
        assert_eq!(rank_score(3, 4), 0.25);
        assert_eq!(rank_score(0, 0), 0.0);
    }

    #[test]
    fn test_or_terms_query_shape() {
        let q = or_terms_query(&["rocket".to_string(), "launch pad".to_string()]).unwrap();
        assert!(q.contains("@title:(rocket|launch pad)"));
        assert!(q.contains("@summary:(rocket|launch pad)"));
        assert!(or_terms_query(&[]).is_none());
    }

    #[test]
    fn test_category_score_components() {
        let mut target = article("t", "Target");
        target.sentiment = Some(Sentiment::Positive);
        target.keywords = vec!["ai".to_string()];

        let mut candidate = article("c", "Candidate");
        candidate.sentiment = Some(Sentiment::Positive);
        candidate.keywords = vec!["AI".to_string(), "chips".to_string()];

        // sentiment (0.3) + source (0.2) + keyword overlap (0.3)
        assert!((category_score(&target, &candidate) - 0.8).abs() < 1e-6);

        candidate.sentiment = Some(Sentiment::Negative);
        candidate.source.name = "Other".to_string();
        candidate.keywords.clear();
        assert_eq!(category_score(&target, &candidate), 0.0);
    }

    #[test]
    fn test_temporal_score_decay() {
        let target = article("t", "Target");
        let mut candidate = article("c", "Candidate");

        candidate.published_at = target.published_at;
        assert!((temporal_score(&target, &candidate, 30) - 1.0).abs() < 1e-6);

        candidate.published_at = target.published_at + Duration::days(15);
        assert!((temporal_score(&target, &candidate, 30) - 0.5).abs() < 1e-6);

        candidate.published_at = target.published_at + Duration::days(45);
        assert_eq!(temporal_score(&target, &candidate, 30), 0.0);
    }

    #[test]
    fn test_hits_by_rank_excludes_target() {
        let hits = hits_by_rank(vec![article("t", "Target"), article("c", "Other")], "t");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c");
    }
}
