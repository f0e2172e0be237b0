//! Rate limiting implementations.

mod sliding_window;

pub use sliding_window::SlidingWindowLimiter;
