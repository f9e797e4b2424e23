//! Index gateway: typed access to the document store and composite index
//!
//! Articles live as hashes under `news:{id}`; a single search index covers
//! full-text fields, tag filters, a sortable publication instant, and an
//! HNSW vector field (cosine metric). This module hides the index query
//! language from the rest of the platform: callers pass plain terms and
//! filters and get typed results back.

use std::collections::HashMap;

use redis::aio::ConnectionManager;
use redis::Value;
use tracing::{debug, info, instrument, warn};

use newsflow_core::{Article, NewsflowError, Sentiment};

use crate::cache::keys;
use crate::config::VectorConfig;

/// Text fields queried by OR expansion
pub const TEXT_FIELDS: [&str; 4] = ["title", "description", "content", "summary"];

/// Cap on each side of a composite (search ∩ topic) query
const INTERSECT_CAP: usize = 1000;

/// Sort order for text searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Index relevance score
    #[default]
    Relevance,
    /// `published_at` descending (newest first)
    Recency,
}

/// Options for text searches
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub sort_by: SortBy,
    pub limit: usize,
    pub offset: usize,
}

/// One page of search results with the total match count
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub articles: Vec<Article>,
    pub total: u64,
}

/// Aggregated source name with its article count
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SourceCount {
    pub name: String,
    pub count: u64,
}

/// Composite search inputs (`/api/news/search` semantics)
#[derive(Debug, Clone, Default)]
pub struct CompositeQuery {
    pub q: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub source: Option<String>,
    pub topic: Option<String>,
}

impl CompositeQuery {
    fn has_search_fields(&self) -> bool {
        self.q.as_deref().map(|q| !q.trim().is_empty()).unwrap_or(false)
            || self.sentiment.is_some()
            || self.source.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
    }
}

/// Typed wrapper over the document store and composite index
#[derive(Clone)]
pub struct IndexGateway {
    conn: ConnectionManager,
    config: VectorConfig,
}

impl IndexGateway {
    pub fn new(conn: ConnectionManager, config: VectorConfig) -> Self {
        Self { conn, config }
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Create the composite index if it does not exist yet
    ///
    /// Returns `true` when the index was created, `false` when a previous
    /// one was already in place (acceptable at startup).
    pub async fn ensure_index(&self) -> Result<bool, NewsflowError> {
        match self.create_index().await {
            Ok(()) => {
                info!(index = %self.config.index_name, dim = self.config.dimension, "Created search index");
                Ok(true)
            }
            Err(e) if e.to_string().contains("already exists") => {
                debug!(index = %self.config.index_name, "Search index already exists");
                Ok(false)
            }
            Err(e) => Err(index_err(e)),
        }
    }

    /// Drop and recreate the composite index
    ///
    /// Existing documents are re-indexed by the store; a missing index is
    /// not an error.
    #[instrument(skip(self))]
    pub async fn recreate_index(&self) -> Result<(), NewsflowError> {
        let mut conn = self.conn.clone();
        let dropped: Result<String, _> = redis::cmd("FT.DROPINDEX")
            .arg(&self.config.index_name)
            .query_async(&mut conn)
            .await;

        match dropped {
            Ok(_) => info!(index = %self.config.index_name, "Dropped search index"),
            Err(e) if e.to_string().contains("Unknown Index") => {
                debug!("No pre-existing index to drop")
            }
            Err(e) => return Err(index_err(e)),
        }

        self.create_index().await.map_err(index_err)?;
        info!(index = %self.config.index_name, dim = self.config.dimension, "Recreated search index");
        Ok(())
    }

    async fn create_index(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("FT.CREATE")
            .arg(&self.config.index_name)
            .arg("ON")
            .arg("HASH")
            .arg("PREFIX")
            .arg(1)
            .arg("news:")
            .arg("SCHEMA")
            .arg("title")
            .arg("TEXT")
            .arg("WEIGHT")
            .arg("5.0")
            .arg("description")
            .arg("TEXT")
            .arg("content")
            .arg("TEXT")
            .arg("summary")
            .arg("TEXT")
            .arg("keywords")
            .arg("TAG")
            .arg("SEPARATOR")
            .arg(",")
            .arg("sentiment")
            .arg("TAG")
            .arg("source")
            .arg("TAG")
            .arg("published_at")
            .arg("NUMERIC")
            .arg("SORTABLE")
            .arg("vector")
            .arg("VECTOR")
            .arg("HNSW")
            .arg("6")
            .arg("TYPE")
            .arg("FLOAT32")
            .arg("DIM")
            .arg(self.config.dimension)
            .arg("DISTANCE_METRIC")
            .arg("COSINE")
            .query_async(&mut conn)
            .await
    }

    /// Fetch one article by id
    pub async fn get_doc(&self, id: &str) -> Result<Option<Article>, NewsflowError> {
        let mut conn = self.conn.clone();
        let (doc, vector): (Option<String>, Option<Vec<u8>>) = redis::cmd("HMGET")
            .arg(keys::article(id))
            .arg("doc")
            .arg("vector")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        let Some(json) = doc else {
            return Ok(None);
        };

        let mut article: Article = serde_json::from_str(&json)
            .map_err(|e| NewsflowError::StoreUnavailable(format!("corrupt document {id}: {e}")))?;
        article.vector = vector.filter(|b| !b.is_empty()).map(|b| decode_vector(&b));
        Ok(Some(article))
    }

    /// Store an article; idempotent on `id`
    ///
    /// # Errors
    /// `BadInput` when the article carries a vector whose length differs
    /// from the configured index dimension. The dimension is configuration;
    /// mismatches are rejected, never coerced.
    #[instrument(skip(self, article), fields(id = %article.id))]
    pub async fn put_doc(&self, article: &Article) -> Result<(), NewsflowError> {
        if let Some(vector) = &article.vector {
            check_dimension(self.config.dimension, vector)?;
        }

        let mut stored = article.clone();
        let vector = stored.vector.take();
        let doc = serde_json::to_string(&stored)
            .map_err(|e| NewsflowError::BadInput(format!("unserializable article: {e}")))?;

        let mut cmd = redis::cmd("HSET");
        cmd.arg(keys::article(&article.id))
            .arg("doc")
            .arg(doc)
            .arg("title")
            .arg(&article.title)
            .arg("description")
            .arg(article.description.as_deref().unwrap_or_default())
            .arg("content")
            .arg(article.content.as_deref().unwrap_or_default())
            .arg("summary")
            .arg(article.summary.as_deref().unwrap_or_default())
            .arg("keywords")
            .arg(article.keywords.join(","))
            .arg("sentiment")
            .arg(article.sentiment.map(|s| s.as_str()).unwrap_or_default())
            .arg("source")
            .arg(&article.source.name)
            .arg("published_at")
            .arg(article.published_at.timestamp());
        if let Some(vector) = &vector {
            cmd.arg("vector").arg(encode_vector(vector));
        }

        let mut conn = self.conn.clone();
        cmd.query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)?;

        debug!(id = %article.id, has_vector = vector.is_some(), "Stored article document");
        Ok(())
    }

    /// Check whether an article document exists
    pub async fn exists(&self, id: &str) -> Result<bool, NewsflowError> {
        let mut conn = self.conn.clone();
        let n: i64 = redis::cmd("EXISTS")
            .arg(keys::article(id))
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(n > 0)
    }

    /// Full-text / tag search with the raw query already built
    pub(crate) async fn run_search(
        &self,
        query: &str,
        opts: SearchOptions,
    ) -> Result<SearchPage, NewsflowError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("FT.SEARCH");
        cmd.arg(&self.config.index_name).arg(query);
        if opts.sort_by == SortBy::Recency {
            cmd.arg("SORTBY").arg("published_at").arg("DESC");
        }
        cmd.arg("RETURN")
            .arg(2)
            .arg("doc")
            .arg("vector")
            .arg("LIMIT")
            .arg(opts.offset)
            .arg(opts.limit)
            .arg("DIALECT")
            .arg(2);

        let reply: Value = cmd.query_async(&mut conn).await.map_err(index_err)?;
        parse_search_reply(reply)
    }

    /// Search the text fields and tag filters of the index
    ///
    /// `query` is a plain user term; expansion across text fields and
    /// escaping happen here.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn text_search(
        &self,
        query: &str,
        opts: SearchOptions,
    ) -> Result<SearchPage, NewsflowError> {
        let q = if query.trim().is_empty() || query == "*" {
            "*".to_string()
        } else {
            or_fields(query, &TEXT_FIELDS)
        };
        self.run_search(&q, opts).await
    }

    /// Newest articles, paginated
    pub async fn newest(&self, limit: usize, offset: usize) -> Result<SearchPage, NewsflowError> {
        self.run_search(
            "*",
            SearchOptions {
                sort_by: SortBy::Recency,
                limit,
                offset,
            },
        )
        .await
    }

    /// K-nearest-neighbor vector search
    ///
    /// Asks the index for `2k` candidates (the caller filters by similarity
    /// threshold afterwards) and returns `(article, cosine_distance)` pairs
    /// with the target itself removed.
    #[instrument(skip(self, vector), fields(k = k))]
    pub async fn vector_knn(
        &self,
        vector: &[f32],
        k: usize,
        exclude_id: Option<&str>,
    ) -> Result<Vec<(Article, f32)>, NewsflowError> {
        check_dimension(self.config.dimension, vector)?;

        let overquery = k * 2;
        let query = format!("(*)=>[KNN {overquery} @vector $vec AS vector_score]");

        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("FT.SEARCH")
            .arg(&self.config.index_name)
            .arg(&query)
            .arg("PARAMS")
            .arg(2)
            .arg("vec")
            .arg(encode_vector(vector))
            .arg("SORTBY")
            .arg("vector_score")
            .arg("ASC")
            .arg("RETURN")
            .arg(3)
            .arg("doc")
            .arg("vector")
            .arg("vector_score")
            .arg("LIMIT")
            .arg(0)
            .arg(overquery)
            .arg("DIALECT")
            .arg(2)
            .query_async(&mut conn)
            .await
            .map_err(index_err)?;

        let hits = parse_knn_reply(reply)?;
        Ok(hits
            .into_iter()
            .filter(|(article, _)| exclude_id != Some(article.id.as_str()))
            .collect())
    }

    /// Composite search dispatch
    ///
    /// - topic only: topic OR-expanded across text fields plus the keyword
    ///   tag, newest first
    /// - search fields only: query OR-expansion ANDed with sentiment/source
    ///   tag filters
    /// - both: intersect the two result sets (each capped at 1000, newest
    ///   first) by id, then paginate
    /// - neither: all articles, newest first
    #[instrument(skip(self))]
    pub async fn composite_search(
        &self,
        query: &CompositeQuery,
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage, NewsflowError> {
        let topic = query
            .topic
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let opts = SearchOptions {
            sort_by: SortBy::Recency,
            limit,
            offset,
        };

        match (query.has_search_fields(), topic) {
            (false, None) => self.run_search("*", opts).await,
            (false, Some(topic)) => self.run_search(&topic_query(topic), opts).await,
            (true, None) => self.run_search(&search_query(query), opts).await,
            (true, Some(topic)) => {
                let cap = SearchOptions {
                    sort_by: SortBy::Recency,
                    limit: INTERSECT_CAP,
                    offset: 0,
                };
                let search_q = search_query(query);
                let topic_q = topic_query(topic);
                let (search_page, topic_page) = tokio::join!(
                    self.run_search(&search_q, cap),
                    self.run_search(&topic_q, cap)
                );
                let search_page = search_page?;
                let topic_page = topic_page?;

                let topic_ids: std::collections::HashSet<&str> =
                    topic_page.articles.iter().map(|a| a.id.as_str()).collect();
                let matched: Vec<Article> = search_page
                    .articles
                    .into_iter()
                    .filter(|a| topic_ids.contains(a.id.as_str()))
                    .collect();

                let total = matched.len() as u64;
                let window = matched
                    .into_iter()
                    .skip(offset)
                    .take(limit)
                    .collect();
                Ok(SearchPage {
                    articles: window,
                    total,
                })
            }
        }
    }

    /// Distinct source names with article counts, via index aggregation
    ///
    /// Degrades to an empty list when the backend lacks aggregation
    /// support.
    pub async fn list_sources(&self) -> Result<Vec<SourceCount>, NewsflowError> {
        let mut conn = self.conn.clone();
        let reply: Result<Value, _> = redis::cmd("FT.AGGREGATE")
            .arg(&self.config.index_name)
            .arg("*")
            .arg("GROUPBY")
            .arg(1)
            .arg("@source")
            .arg("REDUCE")
            .arg("COUNT")
            .arg(0)
            .arg("AS")
            .arg("count")
            .arg("SORTBY")
            .arg(2)
            .arg("@count")
            .arg("DESC")
            .arg("LIMIT")
            .arg(0)
            .arg(100)
            .query_async(&mut conn)
            .await;

        match reply {
            Ok(value) => Ok(parse_aggregate_sources(value)),
            Err(e) => {
                warn!(error = %e, "Source aggregation unsupported, returning empty list");
                Ok(Vec::new())
            }
        }
    }
}

/// Reject vectors whose length differs from the configured dimension
pub fn check_dimension(dimension: usize, vector: &[f32]) -> Result<(), NewsflowError> {
    if vector.len() != dimension {
        return Err(NewsflowError::BadInput(format!(
            "vector dimension {} does not match index dimension {}",
            vector.len(),
            dimension
        )));
    }
    Ok(())
}

/// Pack a vector as little-endian f32 bytes for the index
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Unpack little-endian f32 bytes
pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Strip query-language metacharacters from a user term
pub fn sanitize_term(term: &str) -> String {
    term.chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escape a value for use inside a tag filter
fn escape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.trim().chars() {
        if c.is_alphanumeric() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// OR a term across several text fields: `((@title:(t))|(@summary:(t)))`
pub fn or_fields(term: &str, fields: &[&str]) -> String {
    let clean = sanitize_term(term);
    let clauses: Vec<String> = fields
        .iter()
        .map(|f| format!("(@{f}:({clean}))"))
        .collect();
    format!("({})", clauses.join("|"))
}

/// Tag filter clause: `@sentiment:{positive}`
pub fn tag_filter(field: &str, value: &str) -> String {
    format!("@{field}:{{{}}}", escape_tag(value))
}

/// Topic query: text OR-expansion plus the keyword tag
fn topic_query(topic: &str) -> String {
    format!(
        "({}|{})",
        or_fields(topic, &TEXT_FIELDS),
        tag_filter("keywords", topic)
    )
}

/// Search-fields query: OR-expanded term ANDed with tag filters
fn search_query(query: &CompositeQuery) -> String {
    let mut clauses = Vec::new();
    if let Some(q) = query.q.as_deref() {
        if !q.trim().is_empty() {
            clauses.push(or_fields(q, &TEXT_FIELDS));
        }
    }
    if let Some(sentiment) = query.sentiment {
        clauses.push(tag_filter("sentiment", sentiment.as_str()));
    }
    if let Some(source) = query.source.as_deref() {
        if !source.trim().is_empty() {
            clauses.push(tag_filter("source", source));
        }
    }
    if clauses.is_empty() {
        "*".to_string()
    } else {
        clauses.join(" ")
    }
}

fn index_err(e: impl std::fmt::Display) -> NewsflowError {
    NewsflowError::IndexUnavailable(e.to_string())
}

fn store_err(e: impl std::fmt::Display) -> NewsflowError {
    NewsflowError::StoreUnavailable(e.to_string())
}

fn value_string(v: &Value) -> Option<String> {
    match v {
        Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Status(s) => Some(s.clone()),
        Value::Int(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_bytes(v: &Value) -> Option<Vec<u8>> {
    match v {
        Value::Data(bytes) => Some(bytes.clone()),
        _ => None,
    }
}

/// Flatten a `[field, value, field, value, ...]` reply into a map
fn field_map(value: Value) -> HashMap<String, Value> {
    let mut map = HashMap::new();
    if let Value::Bulk(items) = value {
        let mut iter = items.into_iter();
        while let (Some(field), Some(val)) = (iter.next(), iter.next()) {
            if let Some(name) = value_string(&field) {
                map.insert(name, val);
            }
        }
    }
    map
}

fn article_from_fields(fields: &mut HashMap<String, Value>) -> Option<Article> {
    let doc = fields.get("doc").and_then(value_string)?;
    let mut article: Article = serde_json::from_str(&doc).ok()?;
    if let Some(bytes) = fields.get("vector").and_then(value_bytes) {
        if !bytes.is_empty() {
            article.vector = Some(decode_vector(&bytes));
        }
    }
    Some(article)
}

/// Parse an `FT.SEARCH` reply: `[total, key, fields, key, fields, ...]`
fn parse_search_reply(reply: Value) -> Result<SearchPage, NewsflowError> {
    let Value::Bulk(items) = reply else {
        return Err(NewsflowError::IndexUnavailable(
            "malformed search reply".to_string(),
        ));
    };

    let mut iter = items.into_iter();
    let total = match iter.next() {
        Some(Value::Int(n)) => n.max(0) as u64,
        _ => 0,
    };

    let mut articles = Vec::new();
    while let (Some(_key), Some(fields)) = (iter.next(), iter.next()) {
        let mut map = field_map(fields);
        if let Some(article) = article_from_fields(&mut map) {
            articles.push(article);
        }
    }

    Ok(SearchPage { articles, total })
}

/// Parse a KNN reply, extracting the per-hit cosine distance
fn parse_knn_reply(reply: Value) -> Result<Vec<(Article, f32)>, NewsflowError> {
    let Value::Bulk(items) = reply else {
        return Err(NewsflowError::IndexUnavailable(
            "malformed KNN reply".to_string(),
        ));
    };

    let mut iter = items.into_iter();
    let _total = iter.next();

    let mut hits = Vec::new();
    while let (Some(_key), Some(fields)) = (iter.next(), iter.next()) {
        let mut map = field_map(fields);
        let distance = map
            .get("vector_score")
            .and_then(value_string)
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(1.0);
        if let Some(article) = article_from_fields(&mut map) {
            hits.push((article, distance));
        }
    }

    Ok(hits)
}

/// Parse an `FT.AGGREGATE` grouped-source reply
fn parse_aggregate_sources(reply: Value) -> Vec<SourceCount> {
    let Value::Bulk(items) = reply else {
        return Vec::new();
    };

    items
        .into_iter()
        .skip(1) // leading result count
        .filter_map(|row| {
            let map = field_map(row);
            let name = map.get("source").and_then(value_string)?;
            let count = map
                .get("count")
                .and_then(value_string)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            (!name.is_empty()).then_some(SourceCount { name, count })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_encoding_round_trip() {
        let vector = vec![0.25f32, -1.5, 3.75, 0.0];
        let bytes = encode_vector(&vector);
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode_vector(&bytes), vector);
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(3, &[1.0, 2.0, 3.0]).is_ok());
        let err = check_dimension(768, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, NewsflowError::BadInput(_)));
        assert!(err.to_string().contains("768"));
    }

    #[test]
    fn test_sanitize_strips_metacharacters() {
        assert_eq!(sanitize_term("rocket @launch {now}"), "rocket launch now");
        assert_eq!(sanitize_term("a|b(c)"), "a b c");
        assert_eq!(sanitize_term("  spaced   out  "), "spaced out");
    }

    #[test]
    fn test_or_fields_expansion() {
        let q = or_fields("rocket", &["title", "summary"]);
        assert_eq!(q, "((@title:(rocket))|(@summary:(rocket)))");
    }

    #[test]
    fn test_tag_filter_escaping() {
        assert_eq!(tag_filter("sentiment", "positive"), "@sentiment:{positive}");
        assert_eq!(tag_filter("source", "The Wire"), "@source:{The\\ Wire}");
    }

    #[test]
    fn test_topic_query_includes_keyword_tag() {
        let q = topic_query("technology");
        assert!(q.contains("@title:(technology)"));
        assert!(q.contains("@keywords:{technology}"));
    }

    #[test]
    fn test_search_query_joins_with_and() {
        let q = search_query(&CompositeQuery {
            q: Some("rocket".to_string()),
            sentiment: Some(Sentiment::Positive),
            source: Some("Wire".to_string()),
            topic: None,
        });
        assert!(q.contains("@title:(rocket)"));
        assert!(q.contains("@sentiment:{positive}"));
        assert!(q.contains("@source:{Wire}"));
        // AND is juxtaposition: clauses separated by spaces
        assert_eq!(q.matches(' ').count(), 2);
    }

    #[test]
    fn test_parse_search_reply_shape() {
        let doc = serde_json::json!({
            "id": "a1",
            "title": "T",
            "source": {"name": "Wire"},
            "publishedAt": "2024-01-01T00:00:00Z",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        })
        .to_string();

        let reply = Value::Bulk(vec![
            Value::Int(1),
            Value::Data(b"news:a1".to_vec()),
            Value::Bulk(vec![
                Value::Data(b"doc".to_vec()),
                Value::Data(doc.into_bytes()),
            ]),
        ]);

        let page = parse_search_reply(reply).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.articles.len(), 1);
        assert_eq!(page.articles[0].id, "a1");
    }

    #[test]
    fn test_parse_knn_reply_distance() {
        let doc = serde_json::json!({
            "id": "a1",
            "title": "T",
            "source": {"name": "Wire"},
            "publishedAt": "2024-01-01T00:00:00Z",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        })
        .to_string();

        let reply = Value::Bulk(vec![
            Value::Int(1),
            Value::Data(b"news:a1".to_vec()),
            Value::Bulk(vec![
                Value::Data(b"vector_score".to_vec()),
                Value::Data(b"0.25".to_vec()),
                Value::Data(b"doc".to_vec()),
                Value::Data(doc.into_bytes()),
            ]),
        ]);

        let hits = parse_knn_reply(reply).unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].1 - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_parse_aggregate_sources() {
        let reply = Value::Bulk(vec![
            Value::Int(2),
            Value::Bulk(vec![
                Value::Data(b"source".to_vec()),
                Value::Data(b"Wire".to_vec()),
                Value::Data(b"count".to_vec()),
                Value::Data(b"12".to_vec()),
            ]),
            Value::Bulk(vec![
                Value::Data(b"source".to_vec()),
                Value::Data(b"Daily".to_vec()),
                Value::Data(b"count".to_vec()),
                Value::Data(b"3".to_vec()),
            ]),
        ]);

        let sources = parse_aggregate_sources(reply);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "Wire");
        assert_eq!(sources[0].count, 12);
    }
}
