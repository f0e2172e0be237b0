//! # Moodwell API Server
//!
//! The Actix-web host for the traffic-control layer: per-endpoint rate
//! limiting and response caching in front of the API handlers.

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use tracing_actix_web::TracingLogger;

mod background;
mod config;
mod handlers;
mod middleware;
mod policy;
mod state;
mod telemetry;

use config::AppConfig;
use middleware::{CacheMiddleware, RateLimitMiddleware};
use state::AppState;
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();
    let policy = policy::traffic_policy().context("invalid traffic policy")?;

    tracing::info!(
        "Starting Moodwell API Server on {}:{}",
        config.host,
        config.port
    );

    let state = AppState::new(&config, policy).await;
    let sweep = background::start_sweep(state.store.clone(), &config.sweep).await;

    let server_state = state.clone();
    HttpServer::new(move || {
        let state = server_state.clone();
        let cache = CacheMiddleware::new(
            state.cache.clone(),
            state.policy.clone(),
            state.revalidator.clone(),
        );

        App::new()
            .wrap(RateLimitMiddleware::new(
                state.limiter.clone(),
                state.policy.clone(),
            ))
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state))
            .configure(|cfg| handlers::configure_routes(cfg, &cache))
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await?;

    sweep.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}
