use std::fmt::{Debug, Formatter};
use std::time::Duration;

use likely_stable::unlikely;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{ConsumeError, ExceededBurstCapacity, RateLimited};
use crate::{Clock, RateLimit, StdClock};

/// Everything a bucket knows, guarded as one unit.
///
/// `last_refill` is the clock reading of the last refill pass, in seconds.
#[derive(Debug, Clone, Copy)]
struct State {
    capacity: f64,
    refill_rate: f64,
    level: f64,
    last_refill: f64,
}

impl State {
    /// Brings `level` up to date with the time elapsed since the previous pass.
    ///
    /// `last_refill` always moves to `now` so that an interval is accounted for
    /// exactly once, even when the bucket is disabled or the clock did not move.
    fn refill(&mut self, now: f64) {
        let elapsed = now - self.last_refill;
        self.last_refill = now;
        if self.capacity <= 0.0 {
            return;
        }
        if elapsed > 0.0 {
            self.level += elapsed * self.refill_rate;
            if self.level > self.capacity {
                self.level = self.capacity;
            }
        }
    }

    fn is_unlimited(&self) -> bool {
        self.capacity <= 0.0
    }
}

/// A thread-safe token bucket rate limiter.
///
/// The bucket holds up to `capacity` tokens and gains `refill_rate` tokens per
/// second of elapsed time. Refill is lazy: nothing runs in the background, each
/// operation that needs a fresh level reads the clock and accounts for the time
/// since the previous operation. A bucket with a capacity of zero or less is
/// disabled and approves every request.
///
/// All state sits behind a single mutex and every operation holds it for its
/// whole duration (clock read included), so concurrent callers are fully
/// serialized: no elapsed time is counted twice and no token is handed out
/// twice.
///
/// Inputs are never validated. Negative or NaN amounts, capacities and rates
/// are accepted and produce whatever the arithmetic yields.
///
/// # Type Parameters
///
/// - `C`: Clock implementation (default: [`StdClock`])
///
/// # Examples
///
/// ```rust
/// use tokenbucket::TokenBucket;
///
/// // burst of 10, refilled at 10 tokens per second
/// let bucket = TokenBucket::new(10.0, 10.0);
/// for _ in 0..10 {
///     assert!(bucket.try_consume(1.0));
/// }
/// assert!(!bucket.try_consume(1.0));
/// ```
pub struct TokenBucket<C = StdClock> {
    state: Mutex<State>,
    clock: C,
}

impl TokenBucket<StdClock> {
    /// Creates a full bucket using the standard monotonic clock.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of tokens; zero or negative disables limiting
    /// * `refill_rate` - Tokens added per second; zero means the bucket never refills
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self::with_clock(capacity, refill_rate, StdClock::default())
    }

    /// Creates a full bucket from a [`RateLimit`] using the standard monotonic clock.
    pub fn from_limit(limit: RateLimit) -> Self {
        Self::from_limit_and_clock(limit, StdClock::default())
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Creates a full bucket with a custom clock implementation.
    ///
    /// Use this to share a clock between buckets (e.g. `FastClock::global()`)
    /// or to drive time by hand with [`ManualClock`](crate::ManualClock) in tests.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use tokenbucket::{ManualClock, TokenBucket};
    ///
    /// let clock = Arc::new(ManualClock::new(0.0));
    /// let bucket = TokenBucket::with_clock(5.0, 1.0, Arc::clone(&clock));
    /// assert!(bucket.try_consume(5.0));
    /// clock.advance(2.0);
    /// assert_eq!(2.0, bucket.level());
    /// ```
    pub fn with_clock(capacity: f64, refill_rate: f64, clock: C) -> Self {
        let now = clock.now();
        Self {
            state: Mutex::new(State {
                capacity,
                refill_rate,
                level: capacity,
                last_refill: now,
            }),
            clock,
        }
    }

    /// Creates a full bucket from a [`RateLimit`] and a custom clock implementation.
    pub fn from_limit_and_clock(limit: RateLimit, clock: C) -> Self {
        Self::with_clock(limit.capacity, limit.refill_rate, clock)
    }

    /// Attempts to take `n` tokens out of the bucket.
    ///
    /// Refills the bucket for the time elapsed since the previous operation,
    /// then either removes `n` tokens and returns `true`, or leaves the level
    /// untouched and returns `false`. A disabled bucket always returns `true`
    /// without touching its level.
    pub fn try_consume(&self, n: f64) -> bool {
        let mut state = self.state.lock();
        state.refill(self.clock.now());
        if unlikely(state.is_unlimited()) {
            return true;
        }
        if n > state.level {
            trace!(
                requested = n,
                level = state.level,
                capacity = state.capacity,
                "denied token request"
            );
            return false;
        }
        state.level -= n;
        true
    }

    /// Like [`try_consume`](Self::try_consume), but tells the caller what to do
    /// about a denial.
    ///
    /// The bucket state changes exactly as with `try_consume`. On denial the
    /// error is either [`RateLimited`], carrying the time until the bucket will
    /// have refilled enough to grant `n`, or [`ExceededBurstCapacity`] when no
    /// amount of waiting helps (`n` exceeds the capacity, the bucket does not
    /// refill, or the wait is too long to express as a [`Duration`]).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use tokenbucket::{ConsumeError, ManualClock, TokenBucket};
    ///
    /// let clock = ManualClock::default();
    /// let bucket = TokenBucket::with_clock(10.0, 2.0, &clock);
    /// bucket.set_level(0.0);
    /// match bucket.try_consume_with_retry(4.0) {
    ///     Err(ConsumeError::RateLimited(e)) => {
    ///         assert_eq!(Duration::from_secs(2), e.earliest_retry_after())
    ///     }
    ///     other => panic!("unexpected {other:?}"),
    /// }
    /// assert!(matches!(
    ///     bucket.try_consume_with_retry(11.0),
    ///     Err(ConsumeError::ExceededBurstCapacity(_))
    /// ));
    /// ```
    pub fn try_consume_with_retry(&self, n: f64) -> Result<(), ConsumeError> {
        let mut state = self.state.lock();
        state.refill(self.clock.now());
        if unlikely(state.is_unlimited()) {
            return Ok(());
        }
        if n > state.level {
            trace!(
                requested = n,
                level = state.level,
                capacity = state.capacity,
                "denied token request"
            );
            if n > state.capacity || state.refill_rate <= 0.0 {
                return Err(ExceededBurstCapacity.into());
            }
            let earliest_retry_time = (n - state.level) / state.refill_rate;
            // a wait that does not fit a `Duration` is as good as never
            if Duration::try_from_secs_f64(earliest_retry_time).is_err() {
                return Err(ExceededBurstCapacity.into());
            }
            return Err(RateLimited {
                earliest_retry_time,
            }
            .into());
        }
        state.level -= n;
        Ok(())
    }

    /// Returns the number of tokens currently in the bucket.
    ///
    /// **Not a pure read**: this runs the same refill pass as
    /// [`try_consume`](Self::try_consume), advancing the last refill time and
    /// raising the level for the time elapsed since the previous operation.
    /// On a disabled bucket the level is left as it was last set.
    pub fn level(&self) -> f64 {
        let mut state = self.state.lock();
        state.refill(self.clock.now());
        state.level
    }

    /// Clock reading, in seconds, of the last refill pass.
    pub fn last_refill_time(&self) -> f64 {
        self.state.lock().last_refill
    }

    /// Maximum number of tokens the bucket can hold.
    pub fn capacity(&self) -> f64 {
        self.state.lock().capacity
    }

    /// Tokens added per second of elapsed time.
    pub fn refill_rate(&self) -> f64 {
        self.state.lock().refill_rate
    }

    /// Returns a snapshot of the current capacity and refill rate.
    pub fn limit(&self) -> RateLimit {
        let state = self.state.lock();
        RateLimit::new(state.capacity, state.refill_rate)
    }

    /// Changes the capacity.
    ///
    /// The current level is not clamped here: it may sit above a smaller
    /// capacity until the next refill pass brings it down.
    pub fn set_capacity(&self, capacity: f64) {
        let mut state = self.state.lock();
        debug!(from = state.capacity, to = capacity, "changing bucket capacity");
        state.capacity = capacity;
    }

    /// Changes the refill rate, in tokens per second.
    ///
    /// Time elapsed before the change but not yet accounted for is refilled at
    /// the new rate on the next pass.
    pub fn set_refill_rate(&self, refill_rate: f64) {
        let mut state = self.state.lock();
        debug!(
            from = state.refill_rate,
            to = refill_rate,
            "changing bucket refill rate"
        );
        state.refill_rate = refill_rate;
    }

    /// Replaces capacity and refill rate in one step.
    ///
    /// Equivalent to [`set_capacity`](Self::set_capacity) followed by
    /// [`set_refill_rate`](Self::set_refill_rate), without another thread
    /// observing the mix of old and new values.
    pub fn reset(&self, limit: RateLimit) {
        let mut state = self.state.lock();
        debug!(
            capacity = limit.capacity,
            refill_rate = limit.refill_rate,
            "resetting bucket limit"
        );
        state.capacity = limit.capacity;
        state.refill_rate = limit.refill_rate;
    }

    /// Overwrites the number of tokens in the bucket, capped at the capacity.
    ///
    /// The cap applies even to a disabled bucket, so setting a level there
    /// stores the (zero or negative) capacity instead. No refill pass runs and
    /// the last refill time is left alone.
    pub fn set_level(&self, level: f64) {
        let mut state = self.state.lock();
        state.level = level;
        if state.level > state.capacity {
            state.level = state.capacity;
        }
    }

    /// Returns a reference to the clock driving this bucket.
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<C> Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.lock();
        f.debug_struct("TokenBucket")
            .field("capacity", &state.capacity)
            .field("refill_rate", &state.refill_rate)
            .field("level", &state.level)
            .field("last_refill", &state.last_refill)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::clock::ManualClock;

    use super::*;

    fn manual(
        capacity: f64,
        refill_rate: f64,
    ) -> (Arc<ManualClock>, TokenBucket<Arc<ManualClock>>) {
        let clock = Arc::new(ManualClock::default());
        let tb = TokenBucket::with_clock(capacity, refill_rate, Arc::clone(&clock));
        (clock, tb)
    }

    #[test]
    fn starts_full() {
        let clock = Arc::new(ManualClock::new(42.0));
        let tb = TokenBucket::with_clock(7.0, 3.0, Arc::clone(&clock));
        assert_eq!(7.0, tb.capacity());
        assert_eq!(3.0, tb.refill_rate());
        assert_eq!(42.0, tb.last_refill_time());
        assert_eq!(7.0, tb.level());
    }

    #[test]
    fn drain_and_refill() {
        let (clock, tb) = manual(10.0, 10.0);
        for _ in 0..10 {
            assert!(tb.try_consume(1.0));
        }
        assert!(!tb.try_consume(1.0));
        assert_eq!(0.0, tb.level());

        clock.advance(0.5);
        assert_eq!(5.0, tb.level());
        // the previous read already accounted for the elapsed time
        assert_eq!(5.0, tb.level());

        clock.advance(0.5);
        assert_eq!(tb.capacity(), tb.level());
        // a full bucket does not overflow
        clock.advance(100.0);
        assert_eq!(10.0, tb.level());
    }

    #[test]
    fn refill_is_linear_until_capacity() {
        let (clock, tb) = manual(100.0, 4.0);
        assert!(tb.try_consume(100.0));
        let first = tb.level();
        for step in 1..=30 {
            clock.advance(1.0);
            let expected = (first + step as f64 * 4.0).min(100.0);
            assert_eq!(expected, tb.level());
        }
    }

    #[test]
    fn denial_leaves_level_untouched() {
        let (clock, tb) = manual(10.0, 1.0);
        assert!(tb.try_consume(7.5));
        assert_eq!(2.5, tb.level());
        assert!(!tb.try_consume(3.0));
        assert_eq!(2.5, tb.level());
        assert!(tb.try_consume(2.5));
        assert_eq!(0.0, tb.level());
        clock.advance(0.5);
        assert!(!tb.try_consume(1.0));
        assert_eq!(0.5, tb.level());
    }

    #[test]
    fn last_refill_time_tracks_every_pass() {
        let (clock, tb) = manual(10.0, 1.0);
        clock.set(3.0);
        assert!(tb.try_consume(1.0));
        assert_eq!(3.0, tb.last_refill_time());
        clock.set(4.0);
        assert!(!tb.try_consume(100.0));
        assert_eq!(4.0, tb.last_refill_time());
        clock.set(5.0);
        tb.level();
        assert_eq!(5.0, tb.last_refill_time());
        // accessors and set_level do not refill
        clock.set(6.0);
        tb.capacity();
        tb.refill_rate();
        tb.set_level(1.0);
        assert_eq!(5.0, tb.last_refill_time());
    }

    #[test]
    fn backwards_clock_never_drains() {
        let (clock, tb) = manual(10.0, 10.0);
        clock.set(5.0);
        assert!(tb.try_consume(10.0));
        clock.set(2.0);
        assert_eq!(0.0, tb.level());
        assert_eq!(2.0, tb.last_refill_time());
        clock.set(2.5);
        assert_eq!(5.0, tb.level());
    }

    #[test]
    fn disabled_bucket_approves_everything() {
        let (clock, tb) = manual(0.0, 100.0);
        assert!(tb.try_consume(1_000_000.0));
        assert!(tb.try_consume(-5.0));
        assert!(tb.try_consume(f64::INFINITY));
        clock.advance(10.0);
        assert!(tb.try_consume(1.0));
        assert_eq!(10.0, tb.last_refill_time());
        // no refill math on a disabled bucket
        assert_eq!(0.0, tb.level());
        assert_eq!(Ok(()), tb.try_consume_with_retry(1e9));

        let (_clock, negative) = manual(-1.0, 1.0);
        assert!(negative.try_consume(1.0));
        assert_eq!(-1.0, negative.level());
    }

    #[test]
    fn set_level_clamps_to_capacity() {
        let (_clock, tb) = manual(5.0, 1.0);
        tb.set_level(100.0);
        assert_eq!(5.0, tb.level());
        tb.set_level(2.0);
        assert_eq!(2.0, tb.level());
        tb.set_level(-3.0);
        assert_eq!(-3.0, tb.level());
    }

    #[test]
    fn set_level_on_disabled_bucket_stores_capacity() {
        let (clock, tb) = manual(0.0, 1.0);
        tb.set_level(100.0);
        assert_eq!(0.0, tb.level());
        tb.set_capacity(-2.0);
        tb.set_level(100.0);
        clock.advance(10.0);
        assert_eq!(-2.0, tb.level());
    }

    #[test]
    fn shrinking_capacity_clamps_on_next_refill() {
        let (clock, tb) = manual(10.0, 1.0);
        tb.set_capacity(4.0);
        // no retroactive clamp, and no elapsed time means no refill pass clamps
        assert_eq!(10.0, tb.level());
        assert!(tb.try_consume(6.0));
        assert_eq!(4.0, tb.level());
        assert!(tb.try_consume(4.0));
        clock.advance(0.5);
        assert_eq!(4.0, tb.capacity());
        assert_eq!(0.5, tb.level());

        let (clock, tb) = manual(10.0, 1.0);
        tb.set_capacity(4.0);
        clock.advance(1.0);
        assert_eq!(4.0, tb.level());
    }

    #[test]
    fn reenabling_resumes_from_remaining_level() {
        let (clock, tb) = manual(10.0, 2.0);
        assert!(tb.try_consume(7.0));
        tb.set_capacity(0.0);
        clock.advance(100.0);
        assert!(tb.try_consume(1_000.0));
        assert_eq!(3.0, tb.level());

        tb.set_capacity(10.0);
        assert_eq!(3.0, tb.level());
        clock.advance(1.0);
        assert_eq!(5.0, tb.level());
        clock.advance(10.0);
        assert_eq!(10.0, tb.level());
        assert!(!tb.try_consume(10.5));
    }

    #[test]
    fn rate_change_applies_to_unaccounted_time() {
        let (clock, tb) = manual(100.0, 1.0);
        assert!(tb.try_consume(100.0));
        clock.advance(2.0);
        tb.set_refill_rate(10.0);
        assert_eq!(20.0, tb.level());

        tb.reset(RateLimit::per_minute(60.0).with_capacity(30.0));
        assert_eq!(RateLimit::new(30.0, 1.0), tb.limit());
        clock.advance(20.0);
        assert_eq!(30.0, tb.level());
    }

    #[test]
    fn zero_rate_never_refills() {
        let (clock, tb) = manual(3.0, 0.0);
        assert!(tb.try_consume(3.0));
        clock.advance(1_000.0);
        assert_eq!(0.0, tb.level());
        assert_eq!(
            Err(ConsumeError::ExceededBurstCapacity(ExceededBurstCapacity)),
            tb.try_consume_with_retry(1.0)
        );
    }

    #[test]
    fn retry_hints() {
        let (clock, tb) = manual(10.0, 4.0);
        assert_eq!(Ok(()), tb.try_consume_with_retry(9.0));
        assert_eq!(1.0, tb.level());
        match tb.try_consume_with_retry(3.0) {
            Err(ConsumeError::RateLimited(e)) => assert_eq!(0.5, e.earliest_retry_after_secs()),
            other => panic!("unexpected {other:?}"),
        }
        // denied requests do not consume
        assert_eq!(1.0, tb.level());
        clock.advance(0.5);
        assert_eq!(Ok(()), tb.try_consume_with_retry(3.0));
        assert_eq!(0.0, tb.level());
        assert_eq!(
            Err(ConsumeError::ExceededBurstCapacity(ExceededBurstCapacity)),
            tb.try_consume_with_retry(10.5)
        );
    }

    #[test]
    fn retry_hints_at_extreme_inputs() {
        // deficit so large at a tiny rate that the wait overflows a Duration
        let (_clock, tb) = manual(10.0, 1e-30);
        tb.set_level(0.0);
        let err = tb.try_consume_with_retry(5.0).unwrap_err();
        assert_eq!(ConsumeError::ExceededBurstCapacity(ExceededBurstCapacity), err);
        let _ = format!("{err} {err:?}");
        assert_eq!(0.0, tb.level());

        // a level of -inf can never be refilled back
        let (_clock, tb) = manual(10.0, 1.0);
        tb.set_level(f64::NEG_INFINITY);
        let err = tb.try_consume_with_retry(1.0).unwrap_err();
        assert_eq!(ConsumeError::ExceededBurstCapacity(ExceededBurstCapacity), err);
        let _ = format!("{err} {err:?}");

        // a negative level still yields a finite wait
        let (_clock, tb) = manual(10.0, 2.0);
        tb.set_level(-4.0);
        match tb.try_consume_with_retry(2.0) {
            Err(ConsumeError::RateLimited(e)) => {
                assert_eq!(3.0, e.earliest_retry_after_secs());
                assert_eq!(Duration::from_secs(3), e.earliest_retry_after());
            }
            other => panic!("unexpected {other:?}"),
        }

        // a zero rate with a huge deficit never refills
        let (_clock, tb) = manual(f64::MAX, 0.0);
        tb.set_level(0.0);
        assert_eq!(
            Err(ConsumeError::ExceededBurstCapacity(ExceededBurstCapacity)),
            tb.try_consume_with_retry(1e300)
        );

        // NaN never compares greater than the level: it is granted and poisons the level
        let (_clock, tb) = manual(10.0, 1.0);
        assert_eq!(Ok(()), tb.try_consume_with_retry(f64::NAN));
        assert!(tb.level().is_nan());
        assert_eq!(Ok(()), tb.try_consume_with_retry(1.0));
    }

    #[test]
    fn from_limit() {
        let clock = ManualClock::default();
        let tb = TokenBucket::from_limit_and_clock(RateLimit::per_second(3.0), &clock);
        assert_eq!(RateLimit::per_second(3.0), tb.limit());
        assert_eq!(3.0, tb.level());
        let unlimited = TokenBucket::from_limit_and_clock(RateLimit::UNLIMITED, &clock);
        assert!(unlimited.try_consume(f64::MAX));
    }

    #[test]
    fn debug_output() {
        let (_clock, tb) = manual(2.0, 1.0);
        assert_eq!(
            "TokenBucket { capacity: 2.0, refill_rate: 1.0, level: 2.0, last_refill: 0.0 }",
            format!("{tb:?}")
        );
    }

    #[test]
    fn concurrent_consume() {
        let (clock, tb) = manual(10_000.0, 1000.0);
        clock.set(10.0);
        std::thread::scope(|s| {
            // 4 threads, each consuming 2000 tokens out of the 10k capacity
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..2000 {
                        assert!(tb.try_consume(1.0));
                    }
                });
            }
        });
        assert_eq!(2000.0, tb.level());
    }

    #[test]
    fn concurrent_consume_never_overspends() {
        let (_clock, tb) = manual(10_000.0, 1000.0);
        let tb = Arc::new(tb);
        let approvals = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let tb = Arc::clone(&tb);
                    s.spawn(move || (0..2000).filter(|_| tb.try_consume(1.0)).count())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .sum::<usize>()
        });
        // the clock never moved, so exactly the initial tokens were handed out
        assert_eq!(10_000, approvals);
        assert_eq!(0.0, tb.level());
    }

    #[test]
    fn concurrent_refill_is_counted_once() {
        let (clock, tb) = manual(1_000_000.0, 1.0);
        tb.set_level(0.0);
        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..1000 {
                    clock.advance(1.0);
                }
            });
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        tb.level();
                    }
                });
            }
        });
        assert_eq!(1000.0, tb.level());
    }
}
