use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;

/// Not enough tokens right now; the request fits once the bucket refills.
#[derive(Clone, Copy, PartialEq)]
pub struct RateLimited {
    pub(crate) earliest_retry_time: f64,
}

/// The requested amount of tokens can never be granted, either because it is
/// larger than the bucket capacity or because the bucket does not refill.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ExceededBurstCapacity;

/// Reason a [`try_consume_with_retry`](crate::TokenBucket::try_consume_with_retry) call was denied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsumeError {
    RateLimited(RateLimited),
    ExceededBurstCapacity(ExceededBurstCapacity),
}

impl RateLimited {
    /// The suggested duration to wait before retrying.
    ///
    /// Saturates at [`Duration::MAX`] when the estimate does not fit a `Duration`.
    pub fn earliest_retry_after(&self) -> Duration {
        Duration::try_from_secs_f64(self.earliest_retry_time).unwrap_or(Duration::MAX)
    }

    /// The suggested wait before retrying in seconds.
    pub fn earliest_retry_after_secs(&self) -> f64 {
        self.earliest_retry_time
    }
}

impl Debug for RateLimited {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rate limited; suggested nap duration is {:?}",
            self.earliest_retry_after()
        )
    }
}

impl Display for RateLimited {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "not enough tokens; retry in {:.3}s",
            self.earliest_retry_time
        )
    }
}

impl Debug for ExceededBurstCapacity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "exceeded burst capacity")
    }
}

impl Display for ExceededBurstCapacity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "requested more tokens than the bucket can ever provide")
    }
}

impl Display for ConsumeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumeError::RateLimited(e) => Display::fmt(e, f),
            ConsumeError::ExceededBurstCapacity(e) => Display::fmt(e, f),
        }
    }
}

impl From<RateLimited> for ConsumeError {
    fn from(e: RateLimited) -> Self {
        ConsumeError::RateLimited(e)
    }
}

impl From<ExceededBurstCapacity> for ConsumeError {
    fn from(e: ExceededBurstCapacity) -> Self {
        ConsumeError::ExceededBurstCapacity(e)
    }
}

impl std::error::Error for RateLimited {}
impl std::error::Error for ExceededBurstCapacity {}

impl std::error::Error for ConsumeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConsumeError::RateLimited(e) => Some(e),
            ConsumeError::ExceededBurstCapacity(e) => Some(e),
        }
    }
}
