//! Article models for the Newsflow Gateway platform
//!
//! Articles are produced by the ingestion pipeline and are immutable to the
//! serving core. The identifier is a content address derived from the title
//! and publication instant, so re-ingesting the same story is idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Upper bound on keywords carried by an article (enforced at ingestion)
pub const MAX_KEYWORDS: usize = 15;

/// Sentiment classification produced by the upstream summarizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// All valid sentiment values, in response order
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(format!("unknown sentiment: {other}")),
        }
    }
}

/// Publishing source of an article; `name` doubles as a tag in the index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

/// A news article as stored in the document store
///
/// The `vector` field holds the embedding of the article text. Its length
/// must equal the configured index dimension; the index gateway rejects
/// mismatched vectors at write time rather than coercing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Content address: hex(sha256(title || published_at))
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub source: Source,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_to_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Embedding of the article text; excluded from API responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Compute the content address for a title and publication instant
    ///
    /// Two ingestions of the same story produce the same id, which makes
    /// document writes idempotent.
    pub fn content_address(title: &str, published_at: &DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(published_at.to_rfc3339().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Create an article with a derived id and fresh timestamps
    pub fn new(title: String, source: Source, published_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Self::content_address(&title, &published_at),
            title,
            description: None,
            content: None,
            summary: None,
            sentiment: None,
            keywords: Vec::new(),
            source,
            published_at,
            url: None,
            url_to_image: None,
            author: None,
            vector: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Text used when searching for similar articles: stored keywords when
    /// present, otherwise the title.
    pub fn similarity_text(&self) -> String {
        if self.keywords.is_empty() {
            self.title.clone()
        } else {
            self.keywords.join(" ")
        }
    }

    /// Copy without the embedding, for API responses
    pub fn without_vector(mut self) -> Self {
        self.vector = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_content_address_deterministic() {
        let at = sample_instant();
        let a = Article::content_address("Chips hit record highs", &at);
        let b = Article::content_address("Chips hit record highs", &at);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // SHA256 = 64 hex chars
    }

    #[test]
    fn test_content_address_varies_by_title_and_instant() {
        let at = sample_instant();
        let a = Article::content_address("Chips hit record highs", &at);
        let b = Article::content_address("Chips fall sharply", &at);
        assert_ne!(a, b);

        let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let c = Article::content_address("Chips hit record highs", &later);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sentiment_round_trip() {
        for s in Sentiment::ALL {
            assert_eq!(s.as_str().parse::<Sentiment>().unwrap(), s);
        }
        assert!("upbeat".parse::<Sentiment>().is_err());
    }

    #[test]
    fn test_similarity_text_prefers_keywords() {
        let mut article = Article::new(
            "T".to_string(),
            Source {
                id: None,
                name: "Wire".to_string(),
            },
            sample_instant(),
        );
        assert_eq!(article.similarity_text(), "T");

        article.keywords = vec!["ai".to_string(), "chip".to_string()];
        assert_eq!(article.similarity_text(), "ai chip");
    }

    #[test]
    fn test_serialization_is_camel_case() {
        let article = Article::new(
            "T".to_string(),
            Source {
                id: None,
                name: "Wire".to_string(),
            },
            sample_instant(),
        );
        let json = serde_json::to_value(&article).unwrap();
        assert!(json.get("publishedAt").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("published_at").is_none());
    }
}
