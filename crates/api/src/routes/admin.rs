//! Administrative cache routes

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use newsflow_core::NewsflowError;
use newsflow_retrieval::CacheType;

use crate::error::ApiError;
use crate::server::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/similar-stats/{id}", web::get().to(similar_stats))
            .route("/clear-similar-cache/{id}", web::get().to(clear_similar))
            .route(
                "/clear-all-cache-except-user",
                web::post().to(clear_all_except_user),
            )
            .route(
                "/clear-specific-cache-types",
                web::post().to(clear_specific_types),
            )
            .route("/cache-statistics", web::get().to(cache_statistics)),
    );
}

/// GET /api/admin/similar-stats/{id}
async fn similar_stats(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let article_id = path.into_inner();
    let stats = state.service.similarity.stats(&article_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "articleId": article_id,
        "stats": stats,
    })))
}

/// GET /api/admin/clear-similar-cache/{id}
async fn clear_similar(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let article_id = path.into_inner();
    let cleared = state.service.similarity.invalidate(&article_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "articleId": article_id,
        "keysCleared": cleared,
    })))
}

/// POST /api/admin/clear-all-cache-except-user
async fn clear_all_except_user(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let report = state.service.admin.clear_all_except_user().await?;
    Ok(HttpResponse::Ok().json(report))
}

#[derive(Debug, Deserialize)]
struct ClearTypesQuery {
    types: Option<String>,
}

/// POST /api/admin/clear-specific-cache-types?types=a,b,c
async fn clear_specific_types(
    state: web::Data<AppState>,
    query: web::Query<ClearTypesQuery>,
) -> Result<HttpResponse, ApiError> {
    let raw = query.types.as_deref().unwrap_or_default();
    if raw.trim().is_empty() {
        return Err(ApiError(NewsflowError::BadInput(
            "types query parameter is required".to_string(),
        )));
    }

    let types = raw
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .map(str::parse::<CacheType>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(ApiError)?;

    let report = state.service.admin.clear_specific_types(&types).await?;
    Ok(HttpResponse::Ok().json(report))
}

/// GET /api/admin/cache-statistics
async fn cache_statistics(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let statistics = state.service.admin.statistics().await?;
    Ok(HttpResponse::Ok().json(statistics))
}
