use tokio::time::sleep;
use tracing::trace;

use crate::error::{ConsumeError, ExceededBurstCapacity};
use crate::{Clock, TokenBucket};

impl<C: Clock> TokenBucket<C> {
    /// Waits until `n` tokens can be taken out of the bucket, then takes them.
    ///
    /// Each attempt is a regular [`try_consume_with_retry`](Self::try_consume_with_retry);
    /// on denial the task sleeps for the suggested retry time and tries again.
    /// The bucket lock is never held while sleeping, so other callers may
    /// drain the refilled tokens first, in which case this keeps waiting.
    ///
    /// Requests that can never succeed (`n` above the capacity, or a bucket
    /// that does not refill) return [`ExceededBurstCapacity`] right away.
    ///
    /// Requires the "async" feature.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # #[cfg(feature = "async")]
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// use tokenbucket::{TokenBucket, TokioClock};
    ///
    /// let bucket = TokenBucket::with_clock(10.0, 100.0, TokioClock::default());
    /// bucket.acquire(10.0).await.unwrap();
    /// // the next token is ready after ~10ms
    /// bucket.acquire(1.0).await.unwrap();
    /// # }
    /// # #[cfg(not(feature = "async"))]
    /// # fn main() {}
    /// ```
    pub async fn acquire(&self, n: f64) -> Result<(), ExceededBurstCapacity> {
        loop {
            match self.try_consume_with_retry(n) {
                Ok(()) => return Ok(()),
                Err(ConsumeError::ExceededBurstCapacity(e)) => return Err(e),
                Err(ConsumeError::RateLimited(e)) => {
                    let nap = e.earliest_retry_after();
                    trace!(requested = n, ?nap, "waiting for tokens");
                    sleep(nap).await;
                }
            }
        }
    }
}
