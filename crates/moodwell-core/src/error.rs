//! Domain-level error types.

use thiserror::Error;

use crate::ports::StoreError;

/// Policy table errors, raised once at startup while compiling route patterns.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Route declared twice: {0}")]
    DuplicateRoute(String),
}

/// Response cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid invalidation pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
