//! Response caching middleware.
//!
//! Attach it to resources (`web::resource(..).wrap(cache.clone())`), not to
//! the `App`. Stale entries are refreshed by dispatching a copy of the request
//! to the wrapped service in the background, which only works below the
//! router.

use std::collections::BTreeMap;
use std::future::{Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    Error, HttpRequest, HttpResponse,
    body::{EitherBody, MessageBody, to_bytes},
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    error::ErrorInternalServerError,
    http::StatusCode,
    http::header::{AGE, CACHE_CONTROL, ETAG, EXPIRES, HeaderMap, HeaderName, HeaderValue, PRAGMA},
};
use futures::future::LocalBoxFuture;

use moodwell_core::domain::key::cache_key;
use moodwell_core::domain::{CacheConfig, CachedResponse, NO_CACHE_DIRECTIVES, TrafficPolicy, etag};
use moodwell_infra::{CacheLookup, ResponseCache, Revalidator};

use crate::middleware::context::request_context;

fn x_cache() -> HeaderName {
    HeaderName::from_static("x-cache")
}

/// Response caching middleware factory.
#[derive(Clone)]
pub struct CacheMiddleware {
    cache: Arc<ResponseCache>,
    policy: Arc<TrafficPolicy>,
    revalidator: Revalidator,
}

impl CacheMiddleware {
    pub fn new(cache: Arc<ResponseCache>, policy: Arc<TrafficPolicy>, revalidator: Revalidator) -> Self {
        Self {
            cache,
            policy,
            revalidator,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for CacheMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = CacheMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CacheMiddlewareService {
            service: Rc::new(service),
            cache: self.cache.clone(),
            policy: self.policy.clone(),
            revalidator: self.revalidator.clone(),
        }))
    }
}

pub struct CacheMiddlewareService<S> {
    service: Rc<S>,
    cache: Arc<ResponseCache>,
    policy: Arc<TrafficPolicy>,
    revalidator: Revalidator,
}

/// Response headers as stored in a snapshot; first value wins.
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected = BTreeMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            collected
                .entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    collected
}

async fn body_bytes<B: MessageBody>(body: B) -> Result<actix_web::web::Bytes, Error> {
    to_bytes(body).await.map_err(|e| {
        let e: Box<dyn std::error::Error> = e.into();
        ErrorInternalServerError(e.to_string())
    })
}

/// Rebuild a response from a snapshot.
fn replay(entry: CachedResponse, label: &'static str, age_secs: u64, cache_control: String) -> HttpResponse {
    let status = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);
    let mut builder = HttpResponse::build(status);
    for (name, value) in &entry.headers {
        builder.insert_header((name.as_str(), value.as_str()));
    }

    builder
        .insert_header((x_cache(), label))
        .insert_header((AGE, age_secs))
        .insert_header((ETAG, entry.etag.as_str()))
        .insert_header((CACHE_CONTROL, cache_control))
        .body(entry.body)
}

/// Re-run the wrapped service for `http_req` and store the fresh response.
fn schedule_refresh<S, B>(
    revalidator: &Revalidator,
    service: Rc<S>,
    cache: Arc<ResponseCache>,
    http_req: HttpRequest,
    key: String,
    config: CacheConfig,
) where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    revalidator.submit(key.clone(), async move {
        let res = service
            .call(ServiceRequest::from_request(http_req))
            .await
            .map_err(|e| e.to_string())?;

        let status = res.status();
        if !status.is_success() {
            return Err(format!("handler returned {}", status));
        }

        let (head, body) = res.into_parts().1.into_parts();
        let bytes = body_bytes(body).await.map_err(|e| e.to_string())?;

        cache
            .store(
                &key,
                &config,
                status.as_u16(),
                collect_headers(head.headers()),
                bytes.to_vec(),
            )
            .await
            .map_err(|e| e.to_string())?;

        Ok(())
    });
}

impl<S, B> Service<ServiceRequest> for CacheMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let cache = self.cache.clone();
        let policy = self.policy.clone();
        let revalidator = self.revalidator.clone();

        Box::pin(async move {
            let ctx = request_context(req.request());

            let Some(config) = policy.cache_for(&ctx.method, &ctx.path) else {
                return Ok(service.call(req).await?.map_into_left_body());
            };

            if config.should_skip(&ctx) {
                return Ok(service.call(req).await?.map_into_left_body());
            }

            if config.bypasses() {
                let mut res = service.call(req).await?;
                let headers = res.headers_mut();
                headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE_DIRECTIVES));
                headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
                headers.insert(EXPIRES, HeaderValue::from_static("0"));
                return Ok(res.map_into_left_body());
            }

            let key = cache_key(&ctx, config);

            let lookup = match cache.lookup(&key, config, ctx.header("if-none-match")).await {
                Ok(lookup) => lookup,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Cache lookup failed, bypassing cache");
                    return Ok(service.call(req).await?.map_into_left_body());
                }
            };

            match lookup {
                CacheLookup::NotModified {
                    etag,
                    age_secs,
                    stale,
                } => {
                    if stale {
                        let http_req = req.request().clone();
                        schedule_refresh(&revalidator, service, cache, http_req, key, config.clone());
                    }

                    let response = HttpResponse::NotModified()
                        .insert_header((ETAG, etag))
                        .insert_header((AGE, age_secs))
                        .finish();
                    Ok(req.into_response(response).map_into_right_body())
                }
                CacheLookup::Hit { entry, age_secs } => {
                    let max_age = config.ttl_seconds.saturating_sub(age_secs);
                    let response = replay(entry, "HIT", age_secs, config.cache_control(max_age));
                    Ok(req.into_response(response).map_into_right_body())
                }
                CacheLookup::Stale { entry, age_secs } => {
                    let http_req = req.request().clone();
                    schedule_refresh(&revalidator, service, cache, http_req, key, config.clone());

                    let response = replay(entry, "STALE", age_secs, config.cache_control(0));
                    Ok(req.into_response(response).map_into_right_body())
                }
                CacheLookup::Miss => {
                    let mut res = service.call(req).await?;
                    res.headers_mut().insert(x_cache(), HeaderValue::from_static("MISS"));

                    if !res.status().is_success() {
                        return Ok(res.map_into_left_body());
                    }

                    let (http_req, res) = res.into_parts();
                    let status = res.status();
                    let (head, body) = res.into_parts();
                    let bytes = body_bytes(body).await?;

                    let stored = cache
                        .store(
                            &key,
                            config,
                            status.as_u16(),
                            collect_headers(head.headers()),
                            bytes.to_vec(),
                        )
                        .await;

                    let tag = match stored {
                        Ok(Some(entry)) => entry.etag,
                        Ok(None) => etag::etag(&bytes),
                        Err(e) => {
                            tracing::warn!(key = %key, error = %e, "Failed to store response in cache");
                            etag::etag(&bytes)
                        }
                    };

                    let mut res = head.set_body(bytes);
                    let headers = res.headers_mut();
                    if let Ok(value) = HeaderValue::from_str(&tag) {
                        headers.insert(ETAG, value);
                    }
                    if let Ok(value) = HeaderValue::from_str(&config.cache_control(config.ttl_seconds)) {
                        headers.insert(CACHE_CONTROL, value);
                    }

                    Ok(ServiceResponse::new(http_req, res.map_into_boxed_body()).map_into_right_body())
                }
            }
        })
    }
}
