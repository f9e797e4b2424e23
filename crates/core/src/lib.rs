//! # Newsflow Core
//!
//! Core data structures and types for the Newsflow Gateway platform.
//!
//! This crate provides the fundamental building blocks shared by the
//! retrieval engines and the HTTP surface: domain models, pagination,
//! error handling, validation, and vector math.
//!
//! ## Modules
//!
//! - `models`: Domain models for articles, users, and preferences
//! - `error`: Error types and handling
//! - `pagination`: Pagination envelope for list endpoints
//! - `validation`: Validation utilities and functions
//! - `math`: Vector math for similarity scoring
//! - `telemetry`: Structured logging initialization

pub mod error;
pub mod math;
pub mod models;
pub mod pagination;
pub mod telemetry;
pub mod validation;

// Re-export commonly used types
pub use error::NewsflowError;
pub use math::{cosine_similarity, dot_product, vector_norm};
pub use models::article::{Article, Sentiment, Source};
pub use models::user::{generate_user_id, normalize_preferences, UserPreferences, MAX_PREFERENCES};
pub use pagination::{
    PageParams, Paginated, PaginationInfo, PaginationLinks, DEFAULT_LIMIT, MAX_LIMIT,
};
pub use telemetry::init_tracing;

/// Result type alias for Newsflow operations
pub type Result<T> = std::result::Result<T, NewsflowError>;
