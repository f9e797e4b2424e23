//! User preference models
//!
//! Preferences are an ordered sequence of lowercased topic tags; earlier
//! entries carry more weight during feed construction. The platform has no
//! account system: user ids are opaque client-generated handles.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maximum number of stored preferences per user
pub const MAX_PREFERENCES: usize = 10;

/// Alphabet for the random segment of generated user ids
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Stored user preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub user_id: String,
    /// Ordered topic tags, earlier = higher weight. Never empty when stored.
    pub preferences: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPreferences {
    /// Build a fresh preference record from already-normalized topics
    pub fn new(user_id: String, preferences: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            preferences,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the topic list, keeping the original creation instant
    pub fn replace(&mut self, preferences: Vec<String>) {
        self.preferences = preferences;
        self.updated_at = Utc::now();
    }
}

/// Normalize raw topic strings: trim, lowercase, drop empties, dedup
/// preserving first occurrence, truncate to [`MAX_PREFERENCES`].
///
/// Returns an empty vector when no valid topic survives; callers treat that
/// as a validation failure.
pub fn normalize_preferences<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for topic in raw {
        let t = topic.as_ref().trim().to_lowercase();
        if t.is_empty() {
            continue;
        }
        if seen.insert(t.clone()) {
            out.push(t);
        }
        if out.len() == MAX_PREFERENCES {
            break;
        }
    }

    out
}

/// Generate an opaque user id: `user_{epoch_ms}_{9 base36 chars}`
pub fn generate_user_id() -> String {
    let epoch_ms = Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("user_{epoch_ms}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_lowercases() {
        let raw = vec!["  Technology ", "SPORTS", "science"];
        assert_eq!(
            normalize_preferences(&raw),
            vec!["technology", "sports", "science"]
        );
    }

    #[test]
    fn test_normalize_dedups_preserving_order() {
        let raw = vec!["tech", "Tech", "sports", "TECH", "sports"];
        assert_eq!(normalize_preferences(&raw), vec!["tech", "sports"]);
    }

    #[test]
    fn test_normalize_drops_empty_and_caps_at_ten() {
        let raw: Vec<String> = std::iter::once("   ".to_string())
            .chain((0..15).map(|i| format!("topic{i}")))
            .collect();
        let normalized = normalize_preferences(&raw);
        assert_eq!(normalized.len(), MAX_PREFERENCES);
        assert_eq!(normalized[0], "topic0");
    }

    #[test]
    fn test_normalize_all_invalid_is_empty() {
        let raw = vec!["", "   ", "\t"];
        assert!(normalize_preferences(&raw).is_empty());
    }

    #[test]
    fn test_generate_user_id_shape() {
        let id = generate_user_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "user");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_generate_user_id_unique() {
        let a = generate_user_id();
        let b = generate_user_id();
        assert_ne!(a, b);
    }
}
