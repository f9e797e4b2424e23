//! Term extraction for the fallback similarity strategies
//!
//! The text strategy expands an article into unigrams and bigrams over its
//! title, summary, and description; the semantic strategy pulls named
//! entities (capitalized runs), quoted phrases, and technical tokens. Stop
//! words never survive extraction on their own.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use newsflow_core::Article;

/// Cap on terms handed to a single strategy query
const MAX_TERMS: usize = 12;

/// English stop words dropped from extracted terms
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did",
        "do", "does", "for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "if",
        "in", "into", "is", "it", "its", "just", "me", "more", "most", "my", "no", "not", "of",
        "on", "or", "our", "out", "over", "said", "she", "so", "some", "than", "that", "the",
        "their", "them", "then", "there", "these", "they", "this", "to", "up", "was", "we",
        "were", "what", "when", "where", "which", "who", "will", "with", "would", "you", "your",
    ]
    .into_iter()
    .collect()
});

static QUOTED_PHRASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]{2,60})"|'([^']{2,60})'"#).expect("quoted phrase regex"));

static CAPITALIZED_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)\b").expect("capitalized run regex")
});

/// True when a lowercase token is a stop word
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(token)
}

/// Lowercased word tokens of a text, punctuation stripped
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Unigrams and bigrams over a text, stop words removed
///
/// Bigrams are built from consecutive surviving tokens, so neither half is
/// ever a stop word.
pub fn unigrams_and_bigrams(text: &str) -> Vec<String> {
    let tokens: Vec<String> = tokenize(text)
        .into_iter()
        .filter(|t| t.len() > 1 && !is_stop_word(t))
        .collect();

    let mut terms = Vec::with_capacity(tokens.len() * 2);
    terms.extend(tokens.iter().cloned());
    for pair in tokens.windows(2) {
        terms.push(format!("{} {}", pair[0], pair[1]));
    }

    dedup_capped(terms)
}

/// Named entities: runs of capitalized words, quoted phrases, and
/// technical tokens (alphanumerics carrying digits or hyphens)
pub fn semantic_terms(text: &str) -> Vec<String> {
    let mut terms = Vec::new();

    for cap in QUOTED_PHRASE.captures_iter(text) {
        if let Some(phrase) = cap.get(1).or_else(|| cap.get(2)) {
            terms.push(phrase.as_str().to_lowercase());
        }
    }

    for cap in CAPITALIZED_RUN.captures_iter(text) {
        let run = cap[1].to_lowercase();
        // A lone capitalized stop word is usually just a sentence start
        if !is_stop_word(&run) {
            terms.push(run);
        }
    }

    for token in text.split_whitespace() {
        let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric());
        if trimmed.len() >= 4
            && trimmed.chars().any(|c| c.is_ascii_digit())
            && trimmed.chars().all(|c| c.is_alphanumeric() || c == '-')
        {
            terms.push(trimmed.to_lowercase());
        }
    }

    dedup_capped(terms)
}

/// Combined searchable text of an article's title, summary, and description
pub fn searchable_text(article: &Article) -> String {
    let mut parts = vec![article.title.clone()];
    if let Some(summary) = &article.summary {
        parts.push(summary.clone());
    }
    if let Some(description) = &article.description {
        parts.push(description.clone());
    }
    parts.join(" ")
}

/// Fraction of query words found in a candidate text, for candidates
/// without stored vectors
pub fn word_overlap(query: &str, text: &str) -> f32 {
    let query_words: Vec<String> = tokenize(query)
        .into_iter()
        .filter(|t| !is_stop_word(t))
        .collect();
    if query_words.is_empty() {
        return 0.0;
    }

    let text_words: HashSet<String> = tokenize(text).into_iter().collect();
    let matched = query_words
        .iter()
        .filter(|w| text_words.contains(*w))
        .count();
    matched as f32 / query_words.len() as f32
}

fn dedup_capped(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .take(MAX_TERMS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unigrams_drop_stop_words() {
        let terms = unigrams_and_bigrams("The rocket is on the launch pad");
        assert!(terms.contains(&"rocket".to_string()));
        assert!(terms.contains(&"launch".to_string()));
        assert!(!terms.iter().any(|t| is_stop_word(t)));
    }

    #[test]
    fn test_bigrams_have_no_stop_word_halves() {
        let terms = unigrams_and_bigrams("The rocket is on the launch pad");
        assert!(terms.contains(&"launch pad".to_string()));
        for term in terms.iter().filter(|t| t.contains(' ')) {
            for word in term.split(' ') {
                assert!(!is_stop_word(word), "bigram {term:?} contains stop word");
            }
        }
    }

    #[test]
    fn test_stop_word_only_text_yields_nothing() {
        assert!(unigrams_and_bigrams("the and of to is").is_empty());
    }

    #[test]
    fn test_semantic_terms_capitalized_runs() {
        let terms = semantic_terms("Reserve Bank cuts rates as Sydney markets rally");
        assert!(terms.contains(&"reserve bank".to_string()));
        assert!(terms.contains(&"sydney".to_string()));
    }

    #[test]
    fn test_semantic_terms_quoted_and_technical() {
        let terms = semantic_terms(r#"Chipmaker unveils "neural engine" with gpt-4 support"#);
        assert!(terms.contains(&"neural engine".to_string()));
        assert!(terms.contains(&"gpt-4".to_string()));
    }

    #[test]
    fn test_word_overlap() {
        assert!((word_overlap("rocket launch", "rocket on the pad") - 0.5).abs() < 1e-6);
        assert_eq!(word_overlap("rocket", "gardening tips"), 0.0);
        assert_eq!(word_overlap("the of", "anything"), 0.0);
    }

    #[test]
    fn test_extraction_is_capped() {
        let long: String = (0..50).map(|i| format!("word{i} ")).collect();
        assert!(unigrams_and_bigrams(&long).len() <= MAX_TERMS);
    }
}
