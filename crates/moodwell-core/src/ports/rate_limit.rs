//! Rate limiting port.

use async_trait::async_trait;

use crate::domain::RateLimitConfig;

/// Rate limiter trait - abstraction over rate limiting backends.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record a request for `key` and decide whether it is allowed.
    async fn check(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError>;

    /// Forget the request recorded at `recorded_at` (epoch ms), so it no
    /// longer counts against the window.
    async fn release(
        &self,
        key: &str,
        recorded_at: i64,
        config: &RateLimitConfig,
    ) -> Result<(), RateLimitError>;
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    /// Requests counted in the window, including this one.
    pub count: u32,
    pub remaining: u32,
    /// Reset marker of the entry, epoch ms.
    pub reset_at_millis: i64,
    /// Only set when denied.
    pub retry_after_secs: Option<u64>,
    /// Timestamp this request was recorded under, epoch ms.
    pub recorded_at: i64,
}

impl RateLimitResult {
    /// `X-RateLimit-Reset` value: reset marker in epoch seconds, rounded up.
    pub fn reset_epoch_secs(&self) -> i64 {
        (self.reset_at_millis + 999).div_euclid(1000)
    }
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<crate::ports::StoreError> for RateLimitError {
    fn from(err: crate::ports::StoreError) -> Self {
        RateLimitError::Backend(err.to_string())
    }
}

/// What the traffic layer does with a request after consulting the limiter.
///
/// Backend failures fail open: the request proceeds unthrottled and without
/// rate limit headers.
#[derive(Debug)]
pub enum Admission {
    Allowed(RateLimitResult),
    Throttled(RateLimitResult),
    FailedOpen(RateLimitError),
}

impl Admission {
    pub fn from_check(result: Result<RateLimitResult, RateLimitError>) -> Self {
        match result {
            Ok(result) if result.allowed => Admission::Allowed(result),
            Ok(result) => Admission::Throttled(result),
            Err(err) => Admission::FailedOpen(err),
        }
    }

    /// Whether the request may reach the downstream handler.
    pub fn proceeds(&self) -> bool {
        !matches!(self, Admission::Throttled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(allowed: bool) -> RateLimitResult {
        RateLimitResult {
            allowed,
            limit: 5,
            count: if allowed { 5 } else { 6 },
            remaining: 0,
            reset_at_millis: 60_001,
            retry_after_secs: (!allowed).then_some(55),
            recorded_at: 5_000,
        }
    }

    #[test]
    fn test_backend_error_fails_open() {
        let admission = Admission::from_check(Err(RateLimitError::Backend("down".into())));
        assert!(matches!(admission, Admission::FailedOpen(_)));
        assert!(admission.proceeds());
    }

    #[test]
    fn test_denied_result_is_throttled() {
        let admission = Admission::from_check(Ok(result(false)));
        assert!(matches!(admission, Admission::Throttled(_)));
        assert!(!admission.proceeds());

        assert!(Admission::from_check(Ok(result(true))).proceeds());
    }

    #[test]
    fn test_reset_header_rounds_up_to_seconds() {
        assert_eq!(result(true).reset_epoch_secs(), 61);
    }
}
