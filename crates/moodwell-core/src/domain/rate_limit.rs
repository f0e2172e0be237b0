//! Sliding-window rate limit state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::key::RequestContext;
use crate::ports::RateLimitResult;

/// Custom key derivation, replacing the default identity key.
pub type KeyFn = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

/// Per-endpoint rate limit configuration.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    /// Forget requests that end with a status below 400.
    pub skip_successful: bool,
    /// Forget requests that end with a status of 400 or above.
    pub skip_failed: bool,
    pub key_fn: Option<KeyFn>,
}

impl RateLimitConfig {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            skip_successful: false,
            skip_failed: false,
            key_fn: None,
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(Duration::from_secs(60), max_requests)
    }

    pub fn skip_successful(mut self) -> Self {
        self.skip_successful = true;
        self
    }

    pub fn skip_failed(mut self) -> Self {
        self.skip_failed = true;
        self
    }

    pub fn with_key_fn(
        mut self,
        key_fn: impl Fn(&RequestContext) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    pub fn window_millis(&self) -> i64 {
        self.window.as_millis() as i64
    }

    /// Whether a finished request with `status` should be forgotten.
    pub fn releases(&self, status: u16) -> bool {
        (self.skip_successful && status < 400) || (self.skip_failed && status >= 400)
    }
}

impl fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("window", &self.window)
            .field("max_requests", &self.max_requests)
            .field("skip_successful", &self.skip_successful)
            .field("skip_failed", &self.skip_failed)
            .field("key_fn", &self.key_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Requests seen for one key.
///
/// `count == requests.len()`, and after every [`record`](Self::record) all
/// timestamps lie in `(now - window, now]`. `reset_time` is fixed when the
/// entry is created, one window after its first request; once it has passed
/// the entry is dead and the next request starts over. Reported
/// `Retry-After` and `X-RateLimit-Reset` values come from this marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: i64,
    pub requests: Vec<i64>,
}

impl RateLimitEntry {
    fn fresh(now: i64, window_ms: i64) -> Self {
        Self {
            count: 1,
            reset_time: now + window_ms,
            requests: vec![now],
        }
    }

    /// The reset marker has passed.
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.reset_time
    }

    /// Record a request at `now`, starting a new entry when there is none or
    /// the previous one has expired.
    pub fn record(previous: Option<Self>, now: i64, window_ms: i64) -> Self {
        let mut entry = match previous {
            Some(entry) if !entry.is_expired(now) => entry,
            _ => return Self::fresh(now, window_ms),
        };

        entry.requests.retain(|&ts| ts > now - window_ms);
        entry.requests.push(now);
        entry.count = entry.requests.len() as u32;

        entry
    }

    /// Remove one request recorded at `at`. Returns whether one was found.
    pub fn forget(&mut self, at: i64) -> bool {
        match self.requests.iter().rposition(|&ts| ts == at) {
            Some(index) => {
                self.requests.remove(index);
                self.count = self.requests.len() as u32;
                true
            }
            None => false,
        }
    }

    /// Store TTL: the entry is only needed up to and including its reset marker.
    pub fn retention(&self, now: i64) -> Duration {
        Duration::from_millis(((self.reset_time - now).max(0) + 1) as u64)
    }

    /// Allow iff `count <= max_requests`.
    pub fn evaluate(&self, config: &RateLimitConfig, now: i64) -> RateLimitResult {
        let allowed = self.count <= config.max_requests;
        let retry_after_secs = (!allowed).then(|| {
            let millis = (self.reset_time - now).max(0);
            (((millis + 999) / 1000) as u64).max(1)
        });

        RateLimitResult {
            allowed,
            limit: config.max_requests,
            count: self.count,
            remaining: config.max_requests.saturating_sub(self.count),
            reset_at_millis: self.reset_time,
            retry_after_secs,
            recorded_at: now,
        }
    }
}
