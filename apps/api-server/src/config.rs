//! Application configuration loaded from environment variables.

use std::env;
use std::time::Duration;

#[cfg(feature = "redis")]
use moodwell_infra::RedisConfig;

/// Which [`Store`](moodwell_core::ports::Store) backs the limiter and the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl StoreBackend {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "redis" => StoreBackend::Redis,
            _ => StoreBackend::Memory,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Redis => "redis",
        }
    }
}

/// Periodic sweep of expired store entries.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Six-field cron expression, used with the `scheduler` feature.
    pub cron: String,
    /// Fallback interval when the scheduler is not compiled in.
    pub interval: Duration,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    #[cfg(feature = "redis")]
    pub redis: RedisConfig,
    pub sweep: SweepConfig,
    /// Bearer token for the cache admin endpoints; unset disables them.
    pub cache_admin_token: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            store: env::var("STORE_BACKEND")
                .map(|v| StoreBackend::parse(&v))
                .unwrap_or(StoreBackend::Memory),
            #[cfg(feature = "redis")]
            redis: RedisConfig::from_env(),
            sweep: SweepConfig {
                cron: env::var("STORE_SWEEP_CRON").unwrap_or_else(|_| "0 * * * * *".to_string()),
                interval: Duration::from_secs(
                    env::var("STORE_SWEEP_INTERVAL_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(60),
                ),
            },
            cache_admin_token: env::var("CACHE_ADMIN_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parse() {
        assert_eq!(StoreBackend::parse("redis"), StoreBackend::Redis);
        assert_eq!(StoreBackend::parse("REDIS"), StoreBackend::Redis);
        assert_eq!(StoreBackend::parse("memory"), StoreBackend::Memory);
        assert_eq!(StoreBackend::parse("anything"), StoreBackend::Memory);
    }
}
