const SECONDS_PER_MINUTE: f64 = 60.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Capacity and refill rate configuration of a token bucket.
///
/// Values are taken as-is: a non-positive capacity disables limiting and a
/// zero rate means the bucket never refills. Nothing is validated.
///
/// # Examples
///
/// ```rust
/// use tokenbucket::{RateLimit, TokenBucket};
///
/// // 10 tokens per second with a burst of 20
/// let limit = RateLimit::per_second(10.0).with_capacity(20.0);
/// let bucket = TokenBucket::from_limit(limit);
/// assert_eq!(20.0, bucket.capacity());
/// assert_eq!(10.0, bucket.refill_rate());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub(crate) capacity: f64,
    pub(crate) refill_rate: f64,
}

impl RateLimit {
    /// A limit describing a disabled bucket: every consume request succeeds.
    pub const UNLIMITED: RateLimit = RateLimit {
        capacity: 0.0,
        refill_rate: 0.0,
    };

    /// Creates a rate limit from an explicit capacity and refill rate in tokens per second.
    pub const fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
        }
    }

    /// Creates a rate limit with the specified tokens per second.
    ///
    /// The capacity is set equal to the rate, i.e. one second worth of tokens.
    pub const fn per_second(rate: f64) -> Self {
        Self {
            capacity: rate,
            refill_rate: rate,
        }
    }

    /// Creates a rate limit with the specified tokens per minute.
    ///
    /// The capacity is set equal to the per-minute amount.
    ///
    /// ```rust
    /// use tokenbucket::RateLimit;
    ///
    /// let limit = RateLimit::per_minute(60.0);
    /// assert_eq!(limit.refill_rate(), 1.0);
    /// assert_eq!(limit.refill_rate_per_minute(), 60.0);
    /// assert_eq!(limit.capacity(), 60.0);
    /// ```
    pub const fn per_minute(rate: f64) -> Self {
        Self {
            capacity: rate,
            refill_rate: rate / SECONDS_PER_MINUTE,
        }
    }

    /// Creates a rate limit with the specified tokens per hour.
    ///
    /// The capacity is set equal to the per-hour amount.
    pub const fn per_hour(rate: f64) -> Self {
        Self {
            capacity: rate,
            refill_rate: rate / SECONDS_PER_HOUR,
        }
    }

    /// Sets a custom capacity (burst size) for this rate limit.
    pub const fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Maximum number of tokens the bucket can hold.
    pub const fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens added to the bucket per second.
    pub const fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Tokens added to the bucket per minute.
    pub const fn refill_rate_per_minute(&self) -> f64 {
        self.refill_rate * SECONDS_PER_MINUTE
    }

    /// Tokens added to the bucket per hour.
    pub const fn refill_rate_per_hour(&self) -> f64 {
        self.refill_rate * SECONDS_PER_HOUR
    }

    /// Whether a bucket with this limit lets every request through.
    pub const fn is_unlimited(&self) -> bool {
        self.capacity <= 0.0
    }
}
