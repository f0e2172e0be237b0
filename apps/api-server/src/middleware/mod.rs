//! Middleware modules.

pub mod cache;
pub mod context;
pub mod error;
pub mod rate_limit;

pub use cache::CacheMiddleware;
pub use rate_limit::RateLimitMiddleware;
