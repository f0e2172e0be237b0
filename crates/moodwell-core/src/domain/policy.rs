//! The per-endpoint configuration shared by the limiter and the cache.

use crate::domain::cache::CacheConfig;
use crate::domain::rate_limit::RateLimitConfig;
use crate::domain::route::RouteTable;

/// Compiled rate limit and cache tables plus the paths they cover.
#[derive(Debug, Clone)]
pub struct TrafficPolicy {
    rate_limits: RouteTable<RateLimitConfig>,
    cache: RouteTable<CacheConfig>,
    scope_prefix: String,
    exempt_paths: Vec<String>,
    cacheable_methods: Vec<String>,
}

impl TrafficPolicy {
    /// Covers `/api`, exempts `/api/health` from rate limiting, caches `GET`.
    pub fn new(rate_limits: RouteTable<RateLimitConfig>, cache: RouteTable<CacheConfig>) -> Self {
        Self {
            rate_limits,
            cache,
            scope_prefix: "/api".to_string(),
            exempt_paths: vec!["/api/health".to_string()],
            cacheable_methods: vec!["GET".to_string()],
        }
    }

    pub fn with_scope_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scope_prefix = prefix.into();
        self
    }

    pub fn with_exempt_paths(mut self, paths: &[&str]) -> Self {
        self.exempt_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_cacheable_methods(mut self, methods: &[&str]) -> Self {
        self.cacheable_methods = methods.iter().map(|m| m.to_ascii_uppercase()).collect();
        self
    }

    /// Whether the traffic layer looks at `path` at all.
    pub fn covers(&self, path: &str) -> bool {
        path.starts_with(&self.scope_prefix)
    }

    pub fn is_rate_limited(&self, path: &str) -> bool {
        self.covers(path) && !self.exempt_paths.iter().any(|p| p == path)
    }

    pub fn rate_limit_for(&self, path: &str) -> &RateLimitConfig {
        self.rate_limits.resolve(path)
    }

    /// Cache config for a request, or `None` when the method is never cached
    /// or the path is outside the covered prefix.
    pub fn cache_for(&self, method: &str, path: &str) -> Option<&CacheConfig> {
        let cacheable = self
            .cacheable_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method));

        (cacheable && self.covers(path)).then(|| self.cache.resolve(path))
    }

    pub fn scope_prefix(&self) -> &str {
        &self.scope_prefix
    }

    pub fn rate_limits(&self) -> &RouteTable<RateLimitConfig> {
        &self.rate_limits
    }

    pub fn cache_table(&self) -> &RouteTable<CacheConfig> {
        &self.cache
    }
}
