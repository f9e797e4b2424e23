//! Domain models for the Newsflow Gateway platform

pub mod article;
pub mod user;

pub use article::{Article, Sentiment, Source};
pub use user::{UserPreferences, MAX_PREFERENCES};
