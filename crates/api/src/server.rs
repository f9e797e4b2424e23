//! Application state and route registration

use actix_web::{web, HttpResponse};
use std::sync::Arc;

use newsflow_retrieval::RetrievalService;

use crate::routes;

/// Shared application state
pub struct AppState {
    pub service: Arc<RetrievalService>,
}

/// Register every API route under `/api`
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            .configure(routes::news::configure)
            .configure(routes::user::configure)
            .configure(routes::metadata::configure)
            .configure(routes::admin::configure),
    );
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let store_healthy = state.service.cache.health_check().await;
    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(serde_json::json!({
        "status": status,
        "service": "newsflow-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_healthy,
    }))
}
