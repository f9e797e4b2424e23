//! Validation utilities for request inputs

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::NewsflowError;
use crate::models::user::normalize_preferences;

/// Generated user id pattern: `user_{epoch_ms}_{9 base36 chars}`
pub static USER_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^user_\d{10,16}_[a-z0-9]{9}$").expect("user id regex"));

/// Validate and normalize a raw preference payload
///
/// Topics are trimmed, lowercased, deduplicated, and capped at ten; an empty
/// surviving set is a `BadInput` failure.
///
/// # Examples
///
/// ```
/// use newsflow_core::validation::validate_preferences;
///
/// let topics = validate_preferences(&["  Tech ".to_string(), "tech".to_string()]).unwrap();
/// assert_eq!(topics, vec!["tech"]);
/// assert!(validate_preferences(&["  ".to_string()]).is_err());
/// ```
pub fn validate_preferences(raw: &[String]) -> Result<Vec<String>, NewsflowError> {
    let normalized = normalize_preferences(raw);
    if normalized.is_empty() {
        return Err(NewsflowError::BadInput(
            "at least one non-empty topic is required".to_string(),
        ));
    }
    Ok(normalized)
}

/// Check that a user id has the generated shape
pub fn validate_user_id(user_id: &str) -> Result<(), NewsflowError> {
    if user_id.trim().is_empty() {
        return Err(NewsflowError::BadInput("user id is required".to_string()));
    }
    Ok(())
}

/// True when the id came from the platform's own generator
pub fn is_generated_user_id(user_id: &str) -> bool {
    USER_ID_REGEX.is_match(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::generate_user_id;

    #[test]
    fn test_validate_preferences_normalizes() {
        let raw = vec!["  Technology ".to_string(), "SPORTS".to_string()];
        let topics = validate_preferences(&raw).unwrap();
        assert_eq!(topics, vec!["technology", "sports"]);
    }

    #[test]
    fn test_validate_preferences_rejects_empty() {
        assert!(validate_preferences(&[]).is_err());
        assert!(validate_preferences(&["   ".to_string()]).is_err());
    }

    #[test]
    fn test_generated_id_matches_pattern() {
        assert!(is_generated_user_id(&generate_user_id()));
        assert!(!is_generated_user_id("user-123"));
        assert!(!is_generated_user_id("user_abc_123456789"));
    }

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("user_1").is_ok());
        assert!(validate_user_id("  ").is_err());
    }
}
