//! Response cache over any [`Store`](moodwell_core::ports::Store).

mod response;

pub use response::{CacheLookup, CacheStats, ResponseCache, is_storable_header};
