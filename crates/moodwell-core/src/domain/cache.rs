//! Cached response bookkeeping and freshness rules.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::etag;
use crate::domain::key::RequestContext;

/// `Cache-Control` value for bypassed paths.
pub const NO_CACHE_DIRECTIVES: &str = "no-cache, no-store, must-revalidate";

/// Predicate that sends a request straight to the handler.
pub type SkipFn = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// Cache strategy for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    NoCache,
    Private,
    Public,
    StaleWhileRevalidate,
}

impl CacheStrategy {
    /// Leading `Cache-Control` token.
    pub fn directive(&self) -> &'static str {
        match self {
            CacheStrategy::NoCache => "no-cache",
            CacheStrategy::Private => "private",
            CacheStrategy::Public => "public",
            CacheStrategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

/// Per-endpoint cache configuration.
#[derive(Clone)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub strategy: CacheStrategy,
    pub stale_window_seconds: Option<u64>,
    /// Request headers folded into the cache key.
    pub vary_by: Vec<String>,
    pub tags: Vec<String>,
    pub skip: Option<SkipFn>,
}

impl CacheConfig {
    pub fn new(strategy: CacheStrategy, ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds,
            strategy,
            stale_window_seconds: None,
            vary_by: Vec::new(),
            tags: Vec::new(),
            skip: None,
        }
    }

    pub fn no_cache() -> Self {
        Self::new(CacheStrategy::NoCache, 0)
    }

    pub fn public(ttl_seconds: u64) -> Self {
        Self::new(CacheStrategy::Public, ttl_seconds)
    }

    pub fn private(ttl_seconds: u64) -> Self {
        Self::new(CacheStrategy::Private, ttl_seconds)
    }

    pub fn stale_while_revalidate(ttl_seconds: u64, stale_window_seconds: u64) -> Self {
        Self::new(CacheStrategy::StaleWhileRevalidate, ttl_seconds)
            .with_stale_window(stale_window_seconds)
    }

    pub fn with_stale_window(mut self, seconds: u64) -> Self {
        self.stale_window_seconds = Some(seconds);
        self
    }

    pub fn vary_by(mut self, headers: &[&str]) -> Self {
        self.vary_by = headers.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn skip_when(
        mut self,
        predicate: impl Fn(&RequestContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.skip = Some(Arc::new(predicate));
        self
    }

    /// Bypassed entirely: nothing is looked up or stored.
    pub fn bypasses(&self) -> bool {
        self.strategy == CacheStrategy::NoCache || self.ttl_seconds == 0
    }

    pub fn should_skip(&self, ctx: &RequestContext) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(ctx))
    }

    /// Seconds a stale entry may still be served while it is refreshed.
    /// Only the stale-while-revalidate strategy has one.
    pub fn stale_window(&self) -> Option<u64> {
        match self.strategy {
            CacheStrategy::StaleWhileRevalidate => self.stale_window_seconds,
            _ => None,
        }
    }

    /// How long the store keeps an entry.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds + self.stale_window().unwrap_or(0))
    }

    /// `<strategy>, max-age=<n>[, stale-while-revalidate=<n>]`.
    pub fn cache_control(&self, max_age: u64) -> String {
        match self.stale_window() {
            Some(window) => format!(
                "{}, max-age={}, stale-while-revalidate={}",
                self.strategy.directive(),
                max_age,
                window
            ),
            None => format!("{}, max-age={}", self.strategy.directive(), max_age),
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("strategy", &self.strategy)
            .field("stale_window_seconds", &self.stale_window_seconds)
            .field("vary_by", &self.vary_by)
            .field("tags", &self.tags)
            .field("skip", &self.skip.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Where a stored entry sits relative to its config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

/// A stored 2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub etag: String,
    /// Epoch ms.
    pub stored_at: i64,
    pub tags: Vec<String>,
}

impl CachedResponse {
    /// Snapshot a response. Returns `None` for anything but 2xx.
    pub fn capture(
        status: u16,
        headers: BTreeMap<String, String>,
        body: Vec<u8>,
        stored_at: i64,
        tags: Vec<String>,
    ) -> Option<Self> {
        if !(200..300).contains(&status) {
            return None;
        }

        Some(Self {
            status,
            headers,
            etag: etag::etag(&body),
            body,
            stored_at,
            tags,
        })
    }

    /// Whole seconds since the entry was stored.
    pub fn age_secs(&self, now: i64) -> u64 {
        ((now - self.stored_at).max(0) / 1000) as u64
    }

    pub fn freshness(&self, config: &CacheConfig, now: i64) -> Freshness {
        let age = self.age_secs(now);
        if age <= config.ttl_seconds {
            return Freshness::Fresh;
        }

        match config.stale_window() {
            Some(window) if age <= config.ttl_seconds + window => Freshness::Stale,
            _ => Freshness::Expired,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(stored_at: i64) -> CachedResponse {
        CachedResponse::capture(200, BTreeMap::new(), b"{}".to_vec(), stored_at, vec![]).unwrap()
    }

    #[test]
    fn test_only_success_is_captured() {
        for status in [199, 301, 304, 404, 500] {
            assert!(
                CachedResponse::capture(status, BTreeMap::new(), vec![], 0, vec![]).is_none()
            );
        }
        assert_eq!(entry(0).etag, etag::etag(b"{}"));
    }

    #[test]
    fn test_freshness_boundaries() {
        let config = CacheConfig::stale_while_revalidate(60, 300);
        let cached = entry(0);

        assert_eq!(cached.freshness(&config, 60_999), Freshness::Fresh);
        assert_eq!(cached.freshness(&config, 61_000), Freshness::Stale);
        assert_eq!(cached.freshness(&config, 360_999), Freshness::Stale);
        assert_eq!(cached.freshness(&config, 361_000), Freshness::Expired);
    }

    #[test]
    fn test_stale_window_ignored_without_swr_strategy() {
        let config = CacheConfig::public(60).with_stale_window(300);
        assert_eq!(entry(0).freshness(&config, 61_000), Freshness::Expired);
        assert_eq!(config.retention(), Duration::from_secs(60));
        assert_eq!(config.cache_control(60), "public, max-age=60");
    }

    #[test]
    fn test_cache_control_format() {
        assert_eq!(
            CacheConfig::stale_while_revalidate(60, 300).cache_control(42),
            "stale-while-revalidate, max-age=42, stale-while-revalidate=300"
        );
        assert_eq!(CacheConfig::private(300).cache_control(300), "private, max-age=300");
    }

    #[test]
    fn test_bypass_rules() {
        assert!(CacheConfig::no_cache().bypasses());
        assert!(CacheConfig::public(0).bypasses());
        assert!(!CacheConfig::public(1).bypasses());
    }

    #[test]
    fn test_skip_predicate() {
        let config = CacheConfig::private(300)
            .skip_when(|ctx: &RequestContext| ctx.header("authorization").is_none());

        let anonymous = RequestContext::new("GET", "/api/auth/me");
        let signed_in = anonymous.clone().with_header("Authorization", "Bearer t");
        assert!(config.should_skip(&anonymous));
        assert!(!config.should_skip(&signed_in));
    }
}
