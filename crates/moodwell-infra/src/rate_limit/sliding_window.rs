//! Sliding-window rate limiter over any [`Store`].

use std::sync::Arc;

use async_trait::async_trait;

use moodwell_core::domain::{RateLimitConfig, RateLimitEntry};
use moodwell_core::ports::{
    Clock, RateLimitError, RateLimitResult, RateLimiter, Store, StoreError, StoreWrite,
    SystemClock,
};

/// Sliding-window limiter keeping one [`RateLimitEntry`] per key.
///
/// Each check is a single [`Store::update`], so with the in-memory store two
/// concurrent requests for one key never both read the same count. With a
/// remote store the guarantee is whatever that store's `update` gives.
pub struct SlidingWindowLimiter {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

/// Decode a stored entry. Unreadable entries are dropped and start over.
fn decode(key: &str, raw: Option<String>) -> Option<RateLimitEntry> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Discarding unreadable rate limit entry");
            None
        }
    }
}

fn encode(entry: &RateLimitEntry, now: i64) -> Result<StoreWrite, StoreError> {
    Ok(StoreWrite::new(
        serde_json::to_string(entry)?,
        Some(entry.retention(now)),
    ))
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn check(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError> {
        let now = self.clock.now_millis();
        let window_ms = config.window_millis();
        let owned_key = key.to_string();

        let written = self
            .store
            .update(
                key,
                Box::new(move |current| {
                    let entry = RateLimitEntry::record(decode(&owned_key, current), now, window_ms);
                    encode(&entry, now).map(Some)
                }),
            )
            .await?
            .ok_or_else(|| RateLimitError::Backend("store declined the write".to_string()))?;

        let entry: RateLimitEntry = serde_json::from_str(&written)
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;
        let result = entry.evaluate(config, now);

        if !result.allowed {
            tracing::debug!(
                key = %key,
                count = result.count,
                limit = result.limit,
                retry_after = ?result.retry_after_secs,
                "Rate limit exceeded"
            );
        }

        Ok(result)
    }

    async fn release(
        &self,
        key: &str,
        recorded_at: i64,
        _config: &RateLimitConfig,
    ) -> Result<(), RateLimitError> {
        let now = self.clock.now_millis();
        let owned_key = key.to_string();

        self.store
            .update(
                key,
                Box::new(move |current| {
                    let Some(mut entry) = decode(&owned_key, current) else {
                        return Ok(None);
                    };
                    if !entry.forget(recorded_at) {
                        return Ok(None);
                    }
                    encode(&entry, now).map(Some)
                }),
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use moodwell_core::ports::{ManualClock, UpdateFn};
    use std::time::Duration;

    fn limiter() -> (SlidingWindowLimiter, Arc<ManualClock>, Arc<InMemoryStore>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        (
            SlidingWindowLimiter::with_clock(store.clone(), clock.clone()),
            clock,
            store,
        )
    }

    #[tokio::test]
    async fn test_window_reopens_at_reset_marker() {
        let (limiter, clock, _) = limiter();
        let config = RateLimitConfig::per_minute(5);

        // Five requests spread over the first 8s, then a throttled sixth.
        for expected_remaining in [4, 3, 2, 1, 0] {
            let result = limiter.check("ratelimit:a", &config).await.unwrap();
            assert_eq!(result.remaining, expected_remaining);
            clock.advance(Duration::from_secs(2));
        }
        let denied = limiter.check("ratelimit:a", &config).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs, Some(50));

        // 61s after the first request the advertised reset has passed.
        clock.advance(Duration::from_secs(51));
        let result = limiter.check("ratelimit:a", &config).await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.count, 1);
        assert_eq!(result.remaining, 4);
    }

    #[tokio::test]
    async fn test_five_per_minute() {
        let (limiter, clock, _) = limiter();
        let config = RateLimitConfig::per_minute(5);

        for expected_remaining in [4, 3, 2, 1, 0] {
            let result = limiter.check("ratelimit:a", &config).await.unwrap();
            assert!(result.allowed);
            assert_eq!(result.remaining, expected_remaining);
            clock.advance(Duration::from_secs(2));
        }

        let denied = limiter.check("ratelimit:a", &config).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        let retry_after = denied.retry_after_secs.unwrap();
        assert!((1..=60).contains(&retry_after));

        clock.advance(Duration::from_secs(61));
        let result = limiter.check("ratelimit:a", &config).await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.remaining, 4);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (limiter, _, _) = limiter();
        let config = RateLimitConfig::per_minute(1);

        assert!(limiter.check("ratelimit:a", &config).await.unwrap().allowed);
        assert!(!limiter.check("ratelimit:a", &config).await.unwrap().allowed);
        assert!(limiter.check("ratelimit:b", &config).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_denied_requests_count_until_reset() {
        let (limiter, clock, _) = limiter();
        let config = RateLimitConfig::per_minute(2);

        assert!(limiter.check("k", &config).await.unwrap().allowed);
        clock.advance(Duration::from_secs(40));
        assert!(limiter.check("k", &config).await.unwrap().allowed);
        clock.advance(Duration::from_secs(10));
        assert!(!limiter.check("k", &config).await.unwrap().allowed);

        clock.advance(Duration::from_secs(9));
        let result = limiter.check("k", &config).await.unwrap();
        assert_eq!(result.count, 4);
        assert!(!result.allowed);

        clock.advance(Duration::from_secs(2));
        let result = limiter.check("k", &config).await.unwrap();
        assert_eq!(result.count, 1);
        assert!(result.allowed);
    }

    #[tokio::test]
    async fn test_release_forgets_request() {
        let (limiter, _, _) = limiter();
        let config = RateLimitConfig::per_minute(1).skip_successful();

        let first = limiter.check("login", &config).await.unwrap();
        assert!(first.allowed);
        limiter
            .release("login", first.recorded_at, &config)
            .await
            .unwrap();

        let second = limiter.check("login", &config).await.unwrap();
        assert!(second.allowed);
        assert_eq!(second.count, 1);
    }

    #[tokio::test]
    async fn test_release_of_unknown_key_is_a_no_op() {
        let (limiter, _, store) = limiter();
        let config = RateLimitConfig::per_minute(1);
        limiter.release("nobody", 42, &config).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_entry_expires_from_store() {
        let (limiter, clock, store) = limiter();
        let config = RateLimitConfig::per_minute(3);
        limiter.check("k", &config).await.unwrap();

        clock.advance(Duration::from_secs(121));
        assert_eq!(store.sweep().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_starts_over() {
        let (limiter, _, store) = limiter();
        store.set("k", "not json", None).await.unwrap();

        let result = limiter
            .check("k", &RateLimitConfig::per_minute(3))
            .await
            .unwrap();
        assert_eq!(result.count, 1);
    }

    struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn set(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Option<Duration>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn update(&self, _key: &str, _f: UpdateFn) -> Result<Option<String>, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn keys(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn sweep(&self) -> Result<usize, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_as_error() {
        let limiter = SlidingWindowLimiter::new(Arc::new(FailingStore));
        let err = limiter
            .check("k", &RateLimitConfig::per_minute(3))
            .await
            .unwrap_err();
        assert!(matches!(err, RateLimitError::Backend(_)));
    }
}
