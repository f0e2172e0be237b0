//! Rate limiting middleware.

use std::future::{Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER},
};
use futures::future::LocalBoxFuture;

use moodwell_core::domain::TrafficPolicy;
use moodwell_core::domain::key::rate_limit_key;
use moodwell_core::ports::{Admission, RateLimitResult, RateLimiter};
use moodwell_shared::RateLimitExceeded;

use crate::middleware::context::request_context;

/// Rate limiting middleware factory.
///
/// Consults the limiter for every path the policy limits. Throttled requests
/// get a 429 without reaching the handler; limiter failures let the request
/// through.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<dyn RateLimiter>,
    policy: Arc<TrafficPolicy>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<dyn RateLimiter>, policy: Arc<TrafficPolicy>) -> Self {
        Self { limiter, policy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            policy: self.policy.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<dyn RateLimiter>,
    policy: Arc<TrafficPolicy>,
}

fn set_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(result.limit),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(result.remaining),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-reset"),
        HeaderValue::from(result.reset_epoch_secs()),
    );
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();
        let policy = self.policy.clone();

        Box::pin(async move {
            if !policy.is_rate_limited(req.path()) {
                return Ok(service.call(req).await?.map_into_left_body());
            }

            let ctx = request_context(req.request());
            let config = policy.rate_limit_for(&ctx.path);
            let key = rate_limit_key(&ctx, config);

            match Admission::from_check(limiter.check(&key, config).await) {
                Admission::Throttled(result) => {
                    let retry_after = result.retry_after_secs.unwrap_or(1);
                    tracing::warn!(
                        key = %key,
                        path = %ctx.path,
                        limit = result.limit,
                        retry_after,
                        "Rate limit exceeded"
                    );

                    let mut response = HttpResponse::TooManyRequests()
                        .insert_header((RETRY_AFTER, retry_after))
                        .json(RateLimitExceeded::new(
                            retry_after,
                            result.limit,
                            config.window.as_millis() as u64,
                        ));
                    set_rate_limit_headers(response.headers_mut(), &result);

                    Ok(req.into_response(response).map_into_right_body())
                }
                Admission::FailedOpen(e) => {
                    tracing::error!(key = %key, error = %e, "Rate limiter error, failing open");
                    Ok(service.call(req).await?.map_into_left_body())
                }
                Admission::Allowed(result) => {
                    let mut res = service.call(req).await?;
                    set_rate_limit_headers(res.headers_mut(), &result);

                    if config.releases(res.status().as_u16()) {
                        if let Err(e) = limiter.release(&key, result.recorded_at, config).await {
                            tracing::warn!(key = %key, error = %e, "Failed to release rate limit slot");
                        }
                    }

                    Ok(res.map_into_left_body())
                }
            }
        })
    }
}
