//! HTTP handlers and route configuration.

mod cache_admin;
mod config;
mod health;

use actix_web::web;

use crate::middleware::CacheMiddleware;

/// Configure all application routes.
///
/// Cacheable resources are wrapped individually so background revalidation
/// can re-enter the resource without going through the router again.
pub fn configure_routes(cfg: &mut web::ServiceConfig, cache: &CacheMiddleware) {
    cfg.service(
        web::scope("/api")
            .service(
                web::resource("/health")
                    .wrap(cache.clone())
                    .route(web::get().to(health::health_check)),
            )
            .service(
                web::resource("/config")
                    .wrap(cache.clone())
                    .route(web::get().to(config::policy_summary)),
            )
            .service(
                web::scope("/cache")
                    .route("/stats", web::get().to(cache_admin::stats))
                    .route("/invalidate", web::post().to(cache_admin::invalidate)),
            ),
    );
}
