//! Traffic-control domain types.

pub mod cache;
pub mod etag;
pub mod key;
pub mod policy;
pub mod rate_limit;
pub mod route;

pub use cache::{CacheConfig, CacheStrategy, CachedResponse, Freshness, NO_CACHE_DIRECTIVES};
pub use key::{AuthenticatedUser, RequestContext};
pub use policy::TrafficPolicy;
pub use rate_limit::{RateLimitConfig, RateLimitEntry};
pub use route::{RouteMatcher, RouteTable};
