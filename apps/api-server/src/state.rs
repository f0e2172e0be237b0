//! Application state - shared across all handlers and middlewares.

use std::sync::Arc;

use moodwell_core::domain::TrafficPolicy;
use moodwell_core::ports::{Clock, RateLimiter, Store, SystemClock};
use moodwell_infra::{InMemoryStore, ResponseCache, Revalidator, SlidingWindowLimiter};

#[cfg(feature = "redis")]
use moodwell_infra::RedisStore;

use crate::config::{AppConfig, StoreBackend};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub store_backend: StoreBackend,
    pub limiter: Arc<dyn RateLimiter>,
    pub cache: Arc<ResponseCache>,
    pub policy: Arc<TrafficPolicy>,
    pub revalidator: Revalidator,
    pub cache_admin_token: Option<Arc<str>>,
}

impl AppState {
    /// Build the application state with appropriate implementations.
    pub async fn new(config: &AppConfig, policy: TrafficPolicy) -> Self {
        let (store, store_backend) = Self::connect_store(config).await;

        tracing::info!(store = store_backend.as_str(), "Application state initialized");

        Self::assemble(
            store,
            store_backend,
            Arc::new(SystemClock),
            policy,
            config.cache_admin_token.as_deref(),
        )
    }

    /// Wire the limiter and the cache onto one store and one clock.
    pub fn assemble(
        store: Arc<dyn Store>,
        store_backend: StoreBackend,
        clock: Arc<dyn Clock>,
        policy: TrafficPolicy,
        cache_admin_token: Option<&str>,
    ) -> Self {
        Self {
            limiter: Arc::new(SlidingWindowLimiter::with_clock(store.clone(), clock.clone())),
            cache: Arc::new(ResponseCache::with_clock(store.clone(), clock)),
            store,
            store_backend,
            policy: Arc::new(policy),
            revalidator: Revalidator::new(),
            cache_admin_token: cache_admin_token.map(Arc::from),
        }
    }

    #[cfg(feature = "redis")]
    async fn connect_store(config: &AppConfig) -> (Arc<dyn Store>, StoreBackend) {
        if config.store == StoreBackend::Memory {
            return (Arc::new(InMemoryStore::new()), StoreBackend::Memory);
        }

        match RedisStore::new(config.redis.clone()).await {
            Ok(store) => (Arc::new(store), StoreBackend::Redis),
            Err(e) if config.redis.fallback_to_memory => {
                tracing::error!(
                    error = %e,
                    "Failed to connect to Redis. Using in-memory store fallback."
                );
                (Arc::new(InMemoryStore::new()), StoreBackend::Memory)
            }
            Err(e) => {
                // Without fallback the layer still runs: every store call
                // fails and both middlewares fail open.
                tracing::error!(
                    error = %e,
                    "Failed to connect to Redis and fallback is disabled. Traffic control is inactive."
                );
                (Arc::new(UnavailableStore(e.to_string())), StoreBackend::Redis)
            }
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn connect_store(config: &AppConfig) -> (Arc<dyn Store>, StoreBackend) {
        if config.store == StoreBackend::Redis {
            tracing::warn!("STORE_BACKEND=redis but the redis feature is disabled. Using in-memory store.");
        }
        (Arc::new(InMemoryStore::new()), StoreBackend::Memory)
    }
}

/// Stand-in when the configured remote store could not be reached.
#[cfg(feature = "redis")]
struct UnavailableStore(String);

#[cfg(feature = "redis")]
mod unavailable {
    use std::time::Duration;

    use async_trait::async_trait;
    use moodwell_core::ports::{Store, StoreError, UpdateFn};

    use super::UnavailableStore;

    impl UnavailableStore {
        fn error(&self) -> StoreError {
            StoreError::Connection(self.0.clone())
        }
    }

    #[async_trait]
    impl Store for UnavailableStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(self.error())
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), StoreError> {
            Err(self.error())
        }

        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Err(self.error())
        }

        async fn update(&self, _key: &str, _f: UpdateFn) -> Result<Option<String>, StoreError> {
            Err(self.error())
        }

        async fn keys(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
            Err(self.error())
        }

        async fn sweep(&self) -> Result<usize, StoreError> {
            Ok(0)
        }
    }
}
