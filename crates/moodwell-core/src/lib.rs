//! # Moodwell Core
//!
//! The domain layer of the API traffic-control stack.
//! Policies, key derivation, the sliding-window state machine and cached
//! response bookkeeping live here as pure logic; storage and time are ports.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::{CacheError, ConfigError};
