#![doc = include_str!("../README.md")]
//!
//! # Core Components
//!
//! - [`TokenBucket`] - The mutex-guarded, lazily refilled token bucket
//! - [`RateLimit`] - Capacity and refill rate configuration
//! - [`Clock`] trait and implementations for monotonic time sources
//! - [`ConsumeError`] - Retry hints for denied requests
//!
//! # Quick Start
//!
//! ```rust
//! use tokenbucket::{RateLimit, TokenBucket};
//!
//! // 10 tokens per second, burst of 20
//! let bucket = TokenBucket::from_limit(RateLimit::per_second(10.0).with_capacity(20.0));
//!
//! if bucket.try_consume(5.0) {
//!     println!("consumed 5 tokens, {} left", bucket.level());
//! }
//! ```

#[cfg(feature = "async")]
mod acquire;
mod bucket;
mod clock;
mod error;
mod limit;

pub use bucket::TokenBucket;
#[cfg(feature = "tokio")]
pub use clock::TokioClock;
pub use clock::{Clock, ManualClock, StdClock};
#[cfg(feature = "quanta")]
pub use clock::{FastClock, GLOBAL_CLOCK_TICK, QuantaClock};
pub use error::*;
pub use limit::RateLimit;
