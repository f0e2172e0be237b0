//! # Moodwell Infrastructure
//!
//! Concrete implementations of the ports defined in `moodwell-core`:
//! key/value stores, the sliding-window limiter, the response cache and the
//! background revalidation supervisor.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `redis` - Redis-backed store for multi-instance deployments

pub mod cache;
pub mod rate_limit;
pub mod revalidate;
pub mod store;

// Re-exports - In-Memory
pub use cache::{CacheLookup, CacheStats, ResponseCache};
pub use rate_limit::SlidingWindowLimiter;
pub use revalidate::{RevalidationStats, Revalidator};
pub use store::InMemoryStore;

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use store::{RedisConfig, RedisStore};
