//! User preference, feed, and history routes

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use newsflow_core::{generate_user_id, NewsflowError, Paginated};
use newsflow_retrieval::FeedOptions;

use crate::error::ApiError;
use crate::routes::{envelope_with_extras, PageQuery};
use crate::server::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/user")
            .route("/generate-id", web::post().to(generate_id))
            .route("/{userId}/preferences", web::post().to(set_preferences))
            .route("/{userId}/preferences", web::put().to(set_preferences))
            .route("/{userId}/preferences", web::get().to(get_preferences))
            .route("/{userId}/personalized-news", web::get().to(personalized_news))
            .route(
                "/{userId}/personalized-news/search",
                web::get().to(personalized_search),
            )
            .route("/{userId}/history", web::get().to(history)),
    );
}

/// POST /api/user/generate-id
async fn generate_id() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "userId": generate_user_id() }))
}

#[derive(Debug, Deserialize)]
struct PreferencesBody {
    topics: Vec<String>,
}

/// POST/PUT /api/user/{userId}/preferences
///
/// Topics are trimmed, lowercased, deduplicated, and capped at ten; a
/// payload with no valid topic is a 400. Storing preferences invalidates
/// every personalized cache for the user.
async fn set_preferences(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PreferencesBody>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let prefs = state
        .service
        .personalization
        .update_user_preferences(&user_id, &body.topics)
        .await?;
    Ok(HttpResponse::Ok().json(prefs))
}

/// GET /api/user/{userId}/preferences
async fn get_preferences(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    match state
        .service
        .personalization
        .get_user_preferences(&user_id)
        .await?
    {
        Some(prefs) => Ok(HttpResponse::Ok().json(prefs)),
        None => Err(ApiError(NewsflowError::NotFound(format!(
            "no preferences stored for {user_id}"
        )))),
    }
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    page: Option<usize>,
    limit: Option<usize>,
    refresh: Option<bool>,
}

/// GET /api/user/{userId}/personalized-news
async fn personalized_news(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let params = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .validate()?;

    let feed = state
        .service
        .personalization
        .personalized_feed(
            &user_id,
            params.limit,
            params.offset(),
            FeedOptions {
                force_refresh: query.refresh.unwrap_or(false),
            },
        )
        .await?;

    let base_url = format!("/api/user/{user_id}/personalized-news");
    let body = feed_envelope(feed, params, &base_url);
    Ok(HttpResponse::Ok().json(body))
}

#[derive(Debug, Deserialize)]
struct PersonalizedSearchQuery {
    q: Option<String>,
    sentiment: Option<String>,
    source: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
    refresh: Option<bool>,
}

/// GET /api/user/{userId}/personalized-news/search
async fn personalized_search(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PersonalizedSearchQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let params = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .validate()?;

    let sentiment = match query.sentiment.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => Some(
            raw.parse()
                .map_err(|e: String| ApiError(NewsflowError::BadInput(e)))?,
        ),
    };

    let feed = state
        .service
        .personalization
        .personalized_search(
            &user_id,
            query.q.as_deref().unwrap_or_default(),
            sentiment,
            query.source.as_deref(),
            params.limit,
            params.offset(),
            FeedOptions {
                force_refresh: query.refresh.unwrap_or(false),
            },
        )
        .await?;

    let base_url = format!("/api/user/{user_id}/personalized-news/search");
    let body = feed_envelope(feed, params, &base_url);
    Ok(HttpResponse::Ok().json(body))
}

/// GET /api/user/{userId}/history
async fn history(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let params = query.into_inner().validate()?;

    let entries = state.service.metrics.user_history(&user_id).await?;
    let base_url = format!("/api/user/{user_id}/history");
    Ok(HttpResponse::Ok().json(Paginated::from_full(entries, params, &base_url)))
}

fn feed_envelope(
    feed: newsflow_retrieval::FeedResponse,
    params: newsflow_core::PageParams,
    base_url: &str,
) -> serde_json::Value {
    let mut extras = vec![
        ("cached", serde_json::json!(feed.cached)),
        (
            "personalizedCount",
            serde_json::json!(feed.personalized_count),
        ),
        (
            "filteredReadCount",
            serde_json::json!(feed.filtered_read_count),
        ),
    ];
    if feed.fallback {
        extras.push(("fallback", serde_json::json!(true)));
    }

    let page = Paginated::new(feed.articles, feed.total, params, base_url);
    envelope_with_extras(page, &extras)
}
