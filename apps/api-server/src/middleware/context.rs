//! Extraction of the traffic layer's view of an actix request.

use actix_web::HttpMessage;
use actix_web::HttpRequest;

use moodwell_core::domain::{AuthenticatedUser, RequestContext};

/// Snapshot method, path, query, headers and the authenticated user.
///
/// Headers that are not valid visible ASCII are skipped.
pub fn request_context(req: &HttpRequest) -> RequestContext {
    let mut ctx = RequestContext::new(req.method().as_str(), req.path()).with_query(req.query_string());

    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            ctx = ctx.with_header(name.as_str(), value);
        }
    }

    if let Some(user) = req.extensions().get::<AuthenticatedUser>() {
        ctx = ctx.with_user(user.0.clone());
    }

    ctx
}
