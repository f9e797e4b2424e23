//! Error types for the Newsflow Gateway platform
//!
//! The taxonomy mirrors the propagation policy of the serving path: user
//! endpoints translate these variants to HTTP codes, while internal callers
//! prefer partial success with tagged degradation over failure.

use thiserror::Error;

/// Platform-wide error type
#[derive(Debug, Error)]
pub enum NewsflowError {
    /// Requested article or user record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Request parameters failed validation
    #[error("invalid input: {0}")]
    BadInput(String),

    /// The search index could not be reached or rejected the query
    #[error("search index unavailable: {0}")]
    IndexUnavailable(String),

    /// The backing store could not be reached
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The embedding service failed after retries
    #[error("embedding service error: {0}")]
    Embedding(String),

    /// Unrecoverable cache failure, only reached by admin operations
    #[error("fatal cache error: {0}")]
    FatalCache(String),
}

impl NewsflowError {
    /// True when the error maps to a client-side (4xx) failure
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::BadInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(NewsflowError::NotFound("article".into()).is_client_error());
        assert!(NewsflowError::BadInput("page".into()).is_client_error());
        assert!(!NewsflowError::StoreUnavailable("conn refused".into()).is_client_error());
        assert!(!NewsflowError::IndexUnavailable("timeout".into()).is_client_error());
    }

    #[test]
    fn test_display_messages() {
        let err = NewsflowError::NotFound("article abc".to_string());
        assert_eq!(err.to_string(), "not found: article abc");

        let err = NewsflowError::BadInput("limit must be 1..100".to_string());
        assert!(err.to_string().contains("limit"));
    }
}
