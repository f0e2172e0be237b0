//! Cache admin endpoints, enabled by `CACHE_ADMIN_TOKEN`.

use actix_web::{HttpRequest, HttpResponse, http::header::AUTHORIZATION, web};
use moodwell_shared::dto::{CacheStatsResponse, InvalidateCacheRequest, InvalidateCacheResponse};

use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// Byte comparison whose running time does not depend on where the inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Admin endpoints answer 404 when disabled and 401 without the right token.
fn authorize(req: &HttpRequest, state: &AppState) -> AppResult<()> {
    let Some(expected) = state.cache_admin_token.as_deref() else {
        return Err(AppError::NotFound("Cache admin endpoints are disabled".to_string()));
    };

    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

/// GET /api/cache/stats
pub async fn stats(req: HttpRequest, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    authorize(&req, &state)?;

    let cache = state.cache.stats();
    let revalidation = state.revalidator.stats();

    Ok(HttpResponse::Ok().json(CacheStatsResponse {
        hits: cache.hits,
        stale: cache.stale,
        misses: cache.misses,
        not_modified: cache.not_modified,
        hit_rate: cache.hit_rate,
        revalidations_scheduled: revalidation.scheduled,
        revalidations_failed: revalidation.failed,
    }))
}

/// POST /api/cache/invalidate
pub async fn invalidate(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<InvalidateCacheRequest>,
) -> AppResult<HttpResponse> {
    authorize(&req, &state)?;

    let request = body.into_inner();
    if request.is_empty() {
        return Err(AppError::BadRequest("Provide tags or a pattern".to_string()));
    }

    let mut removed = 0;
    for tag in &request.tags {
        removed += state.cache.invalidate_by_tag(tag).await?;
    }
    if let Some(pattern) = &request.pattern {
        removed += state.cache.invalidate_by_pattern(pattern).await?;
    }

    tracing::info!(tags = ?request.tags, pattern = ?request.pattern, removed, "Cache invalidated");
    Ok(HttpResponse::Ok().json(InvalidateCacheResponse { removed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;
    use actix_web::{App, test};
    use moodwell_core::ports::{Store, SystemClock};
    use moodwell_infra::InMemoryStore;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn state(token: Option<&str>) -> AppState {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let policy = crate::policy::traffic_policy().unwrap();
        AppState::assemble(store, StoreBackend::Memory, Arc::new(SystemClock), policy, token)
    }

    macro_rules! admin_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .route("/api/cache/stats", web::get().to(stats))
                    .route("/api/cache/invalidate", web::post().to(invalidate)),
            )
            .await
        };
    }

    #[::core::prelude::v1::test]
    fn test_token_comparison() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
        assert!(!constant_time_eq(b"s3cret", b"s3cre"));
        assert!(!constant_time_eq(b"", b"x"));
    }

    #[actix_web::test]
    async fn test_disabled_without_token() {
        let app = admin_app!(state(None));
        let req = test::TestRequest::get().uri("/api/cache/stats").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    #[actix_web::test]
    async fn test_wrong_token_is_unauthorized() {
        let app = admin_app!(state(Some("s3cret")));
        let req = test::TestRequest::get()
            .uri("/api/cache/stats")
            .insert_header(("Authorization", "Bearer nope"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }

    #[actix_web::test]
    async fn test_invalidate_by_tag_and_pattern() {
        let state = state(Some("s3cret"));
        let config = state.policy.cache_for("GET", "/api/moods").unwrap().clone();
        for key in ["cache:GET:/api/moods:user:1", "cache:GET:/api/moods:user:2"] {
            state
                .cache
                .store(key, &config, 200, BTreeMap::new(), b"[]".to_vec())
                .await
                .unwrap();
        }
        let app = admin_app!(state.clone());

        let req = test::TestRequest::post()
            .uri("/api/cache/invalidate")
            .insert_header(("Authorization", "Bearer s3cret"))
            .set_json(serde_json::json!({ "pattern": "user:1$" }))
            .to_request();
        let body: InvalidateCacheResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.removed, 1);

        let req = test::TestRequest::post()
            .uri("/api/cache/invalidate")
            .insert_header(("Authorization", "Bearer s3cret"))
            .set_json(serde_json::json!({ "tags": ["moods"] }))
            .to_request();
        let body: InvalidateCacheResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.removed, 1);

        let req = test::TestRequest::post()
            .uri("/api/cache/invalidate")
            .insert_header(("Authorization", "Bearer s3cret"))
            .set_json(serde_json::json!({ "pattern": "(" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::post()
            .uri("/api/cache/invalidate")
            .insert_header(("Authorization", "Bearer s3cret"))
            .set_json(serde_json::json!({}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_stats_reports_counters() {
        let app = admin_app!(state(Some("s3cret")));
        let req = test::TestRequest::get()
            .uri("/api/cache/stats")
            .insert_header(("Authorization", "Bearer s3cret"))
            .to_request();
        let body: CacheStatsResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.hits, 0);
        assert_eq!(body.revalidations_scheduled, 0);
    }
}
