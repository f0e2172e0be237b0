//! Traffic policy introspection.

use actix_web::{HttpResponse, web};
use moodwell_core::domain::{CacheConfig, RateLimitConfig, TrafficPolicy};
use moodwell_shared::dto::{CacheRule, PolicySummary, RateLimitRule};

use crate::state::AppState;

const DEFAULT_PATTERN: &str = "*";

fn rate_limit_rule(pattern: &str, config: &RateLimitConfig) -> RateLimitRule {
    RateLimitRule {
        pattern: pattern.to_string(),
        window_ms: config.window.as_millis() as u64,
        max_requests: config.max_requests,
        skip_successful: config.skip_successful,
        skip_failed: config.skip_failed,
    }
}

fn cache_rule(pattern: &str, config: &CacheConfig) -> CacheRule {
    CacheRule {
        pattern: pattern.to_string(),
        strategy: config.strategy.directive().to_string(),
        ttl_seconds: config.ttl_seconds,
        stale_window_seconds: config.stale_window(),
        vary_by: config.vary_by.clone(),
        tags: config.tags.clone(),
    }
}

/// Declared routes in order, defaults last.
pub fn summarize(policy: &TrafficPolicy) -> PolicySummary {
    let limits = policy.rate_limits();
    let cache = policy.cache_table();

    PolicySummary {
        scope_prefix: policy.scope_prefix().to_string(),
        rate_limits: limits
            .routes()
            .map(|(pattern, config)| rate_limit_rule(pattern, config))
            .chain(std::iter::once(rate_limit_rule(DEFAULT_PATTERN, limits.default_config())))
            .collect(),
        cache: cache
            .routes()
            .map(|(pattern, config)| cache_rule(pattern, config))
            .chain(std::iter::once(cache_rule(DEFAULT_PATTERN, cache.default_config())))
            .collect(),
    }
}

/// GET /api/config
pub async fn policy_summary(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(summarize(&state.policy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lists_routes_then_default() {
        let policy = crate::policy::traffic_policy().unwrap();
        let summary = summarize(&policy);

        assert_eq!(summary.scope_prefix, "/api");

        let login = &summary.rate_limits[0];
        assert_eq!(login.pattern, "/api/auth/login");
        assert_eq!(login.window_ms, 15 * 60 * 1000);
        assert!(login.skip_successful);

        let default = summary.rate_limits.last().unwrap();
        assert_eq!(default.pattern, "*");
        assert_eq!(default.max_requests, 60);

        let moods = summary.cache.iter().find(|r| r.pattern == "/api/moods").unwrap();
        assert_eq!(moods.strategy, "stale-while-revalidate");
        assert_eq!(moods.stale_window_seconds, Some(300));

        let config = summary.cache.iter().find(|r| r.pattern == "/api/config").unwrap();
        assert_eq!(config.stale_window_seconds, None);
        assert_eq!(summary.cache.last().unwrap().strategy, "no-cache");
    }
}
