//! Data Transfer Objects - request/response types for the introspection and
//! cache admin endpoints.

use serde::{Deserialize, Serialize};

/// Liveness probe payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Active store backend (`memory` or `redis`).
    pub store: String,
    pub timestamp: String,
}

/// Request to drop cached responses, by tag and/or by key pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvalidateCacheRequest {
    #[serde(default)]
    pub tags: Vec<String>,
    /// Regular expression matched against cache keys.
    #[serde(default)]
    pub pattern: Option<String>,
}

impl InvalidateCacheRequest {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.pattern.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateCacheResponse {
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub hits: u64,
    pub stale: u64,
    pub misses: u64,
    pub not_modified: u64,
    pub hit_rate: f64,
    pub revalidations_scheduled: usize,
    pub revalidations_failed: usize,
}

/// One declared rate limit route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub pattern: String,
    pub window_ms: u64,
    pub max_requests: u32,
    pub skip_successful: bool,
    pub skip_failed: bool,
}

/// One declared cache route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRule {
    pub pattern: String,
    pub strategy: String,
    pub ttl_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_window_seconds: Option<u64>,
    pub vary_by: Vec<String>,
    pub tags: Vec<String>,
}

/// The traffic policy as declared at startup. `pattern` is `*` for defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySummary {
    pub scope_prefix: String,
    pub rate_limits: Vec<RateLimitRule>,
    pub cache: Vec<CacheRule>,
}
