//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod clock;
mod rate_limit;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limit::{Admission, RateLimitError, RateLimitResult, RateLimiter};
pub use store::{Store, StoreError, StoreWrite, UpdateFn};
