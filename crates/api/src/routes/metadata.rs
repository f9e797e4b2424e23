//! Metadata routes: topics, sentiments, sources

use actix_web::{web, HttpResponse};

use newsflow_core::Sentiment;

use crate::error::ApiError;
use crate::server::AppState;

/// Curated topic list exposed to clients
pub const TOPICS: [&str; 9] = [
    "India",
    "Technology",
    "Politics",
    "World",
    "Sports",
    "Business",
    "Entertainment",
    "Science",
    "Health",
];

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/metadata")
            .route("/topics", web::get().to(topics))
            .route("/sentiments", web::get().to(sentiments))
            .route("/sources", web::get().to(sources)),
    );
}

/// GET /api/metadata/topics
async fn topics() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "topics": TOPICS }))
}

/// GET /api/metadata/sentiments
async fn sentiments() -> HttpResponse {
    let all: Vec<&str> = Sentiment::ALL.iter().map(|s| s.as_str()).collect();
    HttpResponse::Ok().json(serde_json::json!({ "sentiments": all }))
}

/// GET /api/metadata/sources: distinct source names from the index
async fn sources(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let sources = state.service.index.list_sources().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "sources": sources })))
}
