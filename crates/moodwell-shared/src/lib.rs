//! # Moodwell Shared
//!
//! Wire types of the traffic layer: error bodies, the throttling response
//! and the cache admin DTOs. Kept free of server dependencies so clients can
//! share them.

pub mod dto;
pub mod response;

pub use response::{ErrorResponse, RateLimitExceeded};
