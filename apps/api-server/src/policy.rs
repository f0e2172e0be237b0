//! Declared per-endpoint traffic policy.
//!
//! Both tables are resolved exact path first, then patterns in the order they
//! are declared here, then the default. Keep more specific patterns above the
//! broader ones they overlap with.

use std::time::Duration;

use moodwell_core::domain::{CacheConfig, RateLimitConfig, RouteTable, TrafficPolicy};
use moodwell_core::error::ConfigError;

const MINUTE: Duration = Duration::from_secs(60);
const QUARTER_HOUR: Duration = Duration::from_secs(15 * 60);
const HOUR: Duration = Duration::from_secs(60 * 60);

pub fn rate_limits() -> Result<RouteTable<RateLimitConfig>, ConfigError> {
    RouteTable::builder(RateLimitConfig::new(MINUTE, 60))
        // Authentication. Successful logins do not use up attempts.
        .route(
            "/api/auth/login",
            RateLimitConfig::new(QUARTER_HOUR, 5).skip_successful(),
        )
        .route("/api/auth/register", RateLimitConfig::new(HOUR, 3))
        .route("/api/auth/forgot-password", RateLimitConfig::new(HOUR, 3))
        .route("/api/auth/reset-password", RateLimitConfig::new(QUARTER_HOUR, 3))
        .route("/api/auth/verify-email", RateLimitConfig::new(HOUR, 5))
        // Biometrics
        .route("/api/biometrics/register", RateLimitConfig::new(HOUR, 10))
        .route("/api/biometrics/authenticate", RateLimitConfig::new(QUARTER_HOUR, 20))
        // Mood tracking
        .route("/api/moods", RateLimitConfig::new(MINUTE, 30))
        .route("/api/moods/log", RateLimitConfig::new(MINUTE, 20))
        // Social
        .route("/api/friends/request", RateLimitConfig::new(HOUR, 50))
        .route("/api/groups/create", RateLimitConfig::new(HOUR, 10))
        .route("/api/posts/create", RateLimitConfig::new(MINUTE, 10))
        // AI
        .route("/api/ai/chat", RateLimitConfig::new(MINUTE, 10))
        .route("/api/ai/insights", RateLimitConfig::new(HOUR, 30))
        .route("/api/ai/*", RateLimitConfig::new(MINUTE, 20))
        // Uploads and search
        .route("/api/upload", RateLimitConfig::new(HOUR, 20))
        .route("/api/search", RateLimitConfig::new(MINUTE, 30))
        .build()
}

pub fn cache() -> Result<RouteTable<CacheConfig>, ConfigError> {
    RouteTable::builder(CacheConfig::no_cache())
        // Static data
        .route("/api/config", CacheConfig::public(3600).tags(&["config"]))
        .route("/api/features", CacheConfig::public(1800).tags(&["features"]))
        .route("/api/health", CacheConfig::public(60).tags(&["health"]))
        // User data
        .route(
            "/api/auth/me",
            CacheConfig::private(300)
                .vary_by(&["Authorization"])
                .tags(&["user", "auth"])
                .skip_when(|ctx| ctx.header("authorization").is_none()),
        )
        .route(
            "/api/profile",
            CacheConfig::private(300)
                .vary_by(&["Authorization"])
                .tags(&["user", "profile"]),
        )
        // Mood data, refreshed in the background
        .route(
            "/api/moods",
            CacheConfig::stale_while_revalidate(60, 300)
                .vary_by(&["Authorization"])
                .tags(&["moods", "user"]),
        )
        .route(
            "/api/moods/:id",
            CacheConfig::stale_while_revalidate(60, 300)
                .vary_by(&["Authorization"])
                .tags(&["moods", "user"]),
        )
        .route(
            "/api/stats",
            CacheConfig::stale_while_revalidate(300, 600)
                .vary_by(&["Authorization"])
                .tags(&["stats", "user"]),
        )
        .route(
            "/api/insights",
            CacheConfig::stale_while_revalidate(600, 1800)
                .vary_by(&["Authorization"])
                .tags(&["insights", "user"]),
        )
        // Social
        .route(
            "/api/friends",
            CacheConfig::private(120)
                .vary_by(&["Authorization"])
                .tags(&["friends", "social"]),
        )
        .route(
            "/api/feed",
            CacheConfig::private(60)
                .vary_by(&["Authorization"])
                .tags(&["feed", "social"]),
        )
        .route(
            "/api/groups",
            CacheConfig::private(120)
                .vary_by(&["Authorization"])
                .tags(&["groups", "social"]),
        )
        // Shared content
        .route("/api/search", CacheConfig::public(300).tags(&["search"]))
        .route("/api/activities", CacheConfig::public(1800).tags(&["activities"]))
        .route("/api/activities/*", CacheConfig::public(1800).tags(&["activities"]))
        .build()
}

/// Compile the declared tables into the policy the middlewares share.
pub fn traffic_policy() -> Result<TrafficPolicy, ConfigError> {
    Ok(TrafficPolicy::new(rate_limits()?, cache()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodwell_core::domain::CacheStrategy;

    #[test]
    fn test_declared_tables_compile() {
        let policy = traffic_policy().unwrap();
        assert_eq!(policy.rate_limit_for("/api/auth/login").max_requests, 5);
        assert!(policy.rate_limit_for("/api/auth/login").skip_successful);
        assert_eq!(policy.rate_limit_for("/api/unknown").max_requests, 60);
    }

    #[test]
    fn test_exact_route_beats_wildcard() {
        let limits = rate_limits().unwrap();
        assert_eq!(limits.resolve("/api/ai/chat").max_requests, 10);
        assert_eq!(limits.resolve("/api/ai/summaries").max_requests, 20);
    }

    #[test]
    fn test_param_and_wildcard_cache_routes() {
        let policy = traffic_policy().unwrap();
        assert_eq!(
            policy.cache_for("GET", "/api/moods/42").map(|c| c.strategy),
            Some(CacheStrategy::StaleWhileRevalidate)
        );
        assert_eq!(
            policy.cache_for("GET", "/api/activities/breathing/box").map(|c| c.ttl_seconds),
            Some(1800)
        );
        assert!(policy.cache_for("GET", "/api/chat").unwrap().bypasses());
    }
}
