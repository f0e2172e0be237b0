use async_trait::async_trait;
use std::time::Duration;

/// A value to persist, with an optional time-to-live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreWrite {
    pub value: String,
    pub ttl: Option<Duration>,
}

impl StoreWrite {
    pub fn new(value: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            ttl,
        }
    }
}

/// Read-modify-write step for [`Store::update`].
///
/// Receives the current value (if any, and not expired) and returns the value
/// to write back, or `None` to leave the key untouched.
pub type UpdateFn =
    Box<dyn FnOnce(Option<String>) -> Result<Option<StoreWrite>, StoreError> + Send>;

/// Store trait - key/value backend with TTL semantics shared by the rate
/// limiter and the response cache (in-process map or remote KV).
#[async_trait]
pub trait Store: Send + Sync {
    /// Get a value. Expired keys read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a value with optional TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Delete a key. Returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Read-modify-write on a single key.
    ///
    /// In-process implementations run `f` under the key's lock. Remote
    /// implementations may run it as a plain get-then-put, in which case
    /// concurrent writers to the same key are last-writer-wins.
    ///
    /// Returns the value written, or `None` when `f` declined to write.
    async fn update(&self, key: &str, f: UpdateFn) -> Result<Option<String>, StoreError>;

    /// List live keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Drop expired entries. Returns how many were removed.
    async fn sweep(&self) -> Result<usize, StoreError>;
}

/// Store operation errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
