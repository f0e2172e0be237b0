//! Identity and storage key derivation.

use std::collections::HashMap;

use crate::domain::cache::{CacheConfig, CacheStrategy};
use crate::domain::rate_limit::RateLimitConfig;

/// Proxy headers consulted for the client IP, in priority order.
pub const CLIENT_IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"];

pub const RATE_LIMIT_SCOPE: &str = "ratelimit";
pub const CACHE_SCOPE: &str = "cache";

/// Authenticated user id, inserted into request extensions by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// The parts of a request the traffic layer reads.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Lowercased header names; first value wins.
    headers: HashMap<String, String>,
    pub user_id: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| value.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Who is making the request: `user:<id>` when authenticated, otherwise
    /// the first proxy-reported client IP, otherwise `unknown`.
    pub fn identity(&self) -> String {
        if let Some(user_id) = &self.user_id {
            return format!("user:{}", user_id);
        }

        CLIENT_IP_HEADERS
            .iter()
            .filter_map(|name| self.header(name))
            .filter_map(|value| value.split(',').next())
            .map(str::trim)
            .find(|ip| !ip.is_empty())
            .unwrap_or("unknown")
            .to_string()
    }

    /// Query pairs in sorted order, so `b=2&a=1` and `a=1&b=2` share a key.
    fn canonical_query(&self) -> Option<String> {
        let query = self.query.as_deref()?;
        let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
        if pairs.is_empty() {
            return None;
        }
        pairs.sort_unstable();
        Some(pairs.join("&"))
    }
}

/// Builds `scope:method:path[:query][:header:value...][:identity]`.
///
/// Only headers named in `vary_by` are folded in, so key cardinality stays
/// bounded by the declared headers.
pub fn build_key(
    scope: &str,
    ctx: &RequestContext,
    include_query: bool,
    vary_by: &[String],
    include_identity: bool,
) -> String {
    let mut key = format!("{}:{}:{}", scope, ctx.method, ctx.path);

    if include_query {
        if let Some(query) = ctx.canonical_query() {
            key.push(':');
            key.push_str(&query);
        }
    }

    for header in vary_by {
        if let Some(value) = ctx.header(header) {
            key.push_str(&format!(":{}:{}", header, value));
        }
    }

    if include_identity {
        key.push(':');
        key.push_str(&ctx.identity());
    }

    key
}

/// Rate limit key: the config's own key function if set, otherwise
/// `ratelimit:METHOD:path:identity`. Query strings are left out so they
/// cannot be used to mint fresh buckets.
pub fn rate_limit_key(ctx: &RequestContext, config: &RateLimitConfig) -> String {
    match &config.key_fn {
        Some(key_fn) => key_fn(ctx),
        None => build_key(RATE_LIMIT_SCOPE, ctx, false, &[], true),
    }
}

/// Cache key. Private responses are additionally keyed by identity; shared
/// strategies rely on `vary_by` to separate callers.
pub fn cache_key(ctx: &RequestContext, config: &CacheConfig) -> String {
    let per_identity = config.strategy == CacheStrategy::Private;
    build_key(CACHE_SCOPE, ctx, true, &config.vary_by, per_identity)
}
