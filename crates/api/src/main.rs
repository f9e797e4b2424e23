//! Newsflow Gateway - news retrieval, personalization, and caching API
//!
//! Default port: 3001

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing::info;

use newsflow_retrieval::GatewayConfig;

mod error;
mod routes;
mod server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let production = std::env::var("NODE_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);
    newsflow_core::init_tracing(production);

    let config = Arc::new(GatewayConfig::load()?);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let workers = config.server.workers.unwrap_or_else(num_cpus::get);

    info!("Starting Newsflow Gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", bind_addr);

    let service = newsflow_retrieval::init_service(config.clone()).await?;
    let app_state = web::Data::new(server::AppState { service });

    HttpServer::new(move || {
        // Permissive CORS by default; the platform carries no auth
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(server::configure_routes)
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
