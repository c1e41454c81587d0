use std::sync::{Arc, Mutex};

/// Trait for monotonic clock implementations used by token buckets.
///
/// Implementations must provide monotonic time that never goes backwards.
/// The time is measured in seconds as floating-point values.
pub trait Clock {
    /// Returns the current time in seconds since an arbitrary epoch.
    ///
    /// The returned value must be monotonic (never decrease) and should
    /// have sufficient precision for rate limiting purposes.
    fn now(&self) -> f64;
}

/// Standard clock implementation using [`std::time::Instant`].
///
/// This is the default clock of [`TokenBucket`](crate::TokenBucket). For
/// high-throughput callers, `FastClock` trades precision for cheaper reads.
///
/// # Examples
///
/// ```rust
/// use tokenbucket::{StdClock, TokenBucket};
///
/// let bucket = TokenBucket::with_clock(100.0, 10.0, StdClock::default());
/// assert!(bucket.try_consume(1.0));
/// ```
#[derive(Clone)]
pub struct StdClock {
    origin: std::time::Instant,
}

impl Default for StdClock {
    fn default() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now(&self) -> f64 {
        std::time::Instant::now()
            .duration_since(self.origin)
            .as_secs_f64()
    }
}

/// High-precision clock implementation using the `quanta` crate.
///
/// Requires the "quanta" feature to be enabled.
#[cfg(feature = "quanta")]
#[derive(Clone)]
pub struct QuantaClock {
    clock: quanta::Clock,
    origin: quanta::Instant,
}

#[cfg(feature = "quanta")]
impl Default for QuantaClock {
    fn default() -> Self {
        Self::new(quanta::Clock::new())
    }
}

#[cfg(feature = "quanta")]
impl QuantaClock {
    /// Creates a new `QuantaClock` from a `quanta::Clock` instance.
    pub fn new(clock: quanta::Clock) -> Self {
        let origin = clock.now();
        Self { clock, origin }
    }
}

#[cfg(feature = "quanta")]
impl Clock for QuantaClock {
    fn now(&self) -> f64 {
        self.clock.now().duration_since(self.origin).as_secs_f64()
    }
}

/// Tokio-compatible clock implementation using [`tokio::time::Instant`].
///
/// Follows tokio's paused/advanced time in tests. Requires the "tokio" feature.
#[cfg(feature = "tokio")]
#[derive(Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

#[cfg(feature = "tokio")]
impl Default for TokioClock {
    fn default() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

#[cfg(feature = "tokio")]
impl Clock for TokioClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Tick of the process-wide upkeep thread backing [`FastClock::global`].
#[cfg(feature = "quanta")]
pub const GLOBAL_CLOCK_TICK: std::time::Duration = std::time::Duration::from_millis(1);

#[cfg(feature = "quanta")]
struct GlobalClock {
    clock: FastClock,
    // dropping the handle stops the upkeep thread, so it lives as long as the process
    _upkeep: Option<quanta::Handle>,
}

#[cfg(feature = "quanta")]
static GLOBAL_CLOCK: std::sync::OnceLock<GlobalClock> = std::sync::OnceLock::new();

/// High-performance clock using quanta's coarse timing.
///
/// Reads are a single atomic load of the time last published by quanta's
/// upkeep thread, so precision is bounded by the upkeep interval. Requires the
/// "quanta" feature to be enabled.
///
/// # Examples
///
/// ```rust
/// # #[cfg(feature = "quanta")]
/// # {
/// use tokenbucket::{FastClock, TokenBucket};
///
/// let bucket = TokenBucket::with_clock(1000.0, 1000.0, FastClock::global());
/// assert!(bucket.try_consume(10.0));
/// # }
/// ```
#[cfg(feature = "quanta")]
#[derive(Clone)]
pub struct FastClock {
    clock: quanta::Clock,
    origin: quanta::Instant,
    // read `clock.now()` instead of the upkeep-published time
    precise: bool,
}

#[cfg(feature = "quanta")]
impl Default for FastClock {
    fn default() -> Self {
        Self::new(quanta::Clock::new())
    }
}

#[cfg(feature = "quanta")]
impl FastClock {
    /// Creates a new `FastClock` from a `quanta::Clock` instance.
    ///
    /// **Important**: Ensure the clock's upkeep thread is running, otherwise
    /// the token bucket will not observe clock changes at the expected
    /// granularity.
    pub fn new(clock: quanta::Clock) -> Self {
        let origin = clock.recent();
        Self {
            clock,
            origin,
            precise: false,
        }
    }

    /// Creates a `FastClock` that reads the time precisely on every call.
    ///
    /// Used by [`FastClock::global`] when its upkeep thread cannot be started.
    pub(crate) fn precise(clock: quanta::Clock) -> Self {
        let origin = clock.now();
        Self {
            clock,
            origin,
            precise: true,
        }
    }

    /// Whether this clock reads the time precisely instead of the coarse
    /// upkeep-published time.
    pub fn is_precise(&self) -> bool {
        self.precise
    }

    /// Returns the process-wide quantized clock.
    ///
    /// The first call starts an upkeep thread publishing the time every
    /// [`GLOBAL_CLOCK_TICK`]; every later call hands out a clone sharing the
    /// same origin and granularity. The thread is never torn down.
    ///
    /// If the upkeep thread cannot be started (e.g. another upkeep already
    /// drives quanta's recent time at its own interval), the global clock falls
    /// back to precise reads, so every bucket sharing it still observes time at
    /// least at [`GLOBAL_CLOCK_TICK`] granularity.
    pub fn global() -> FastClock {
        GLOBAL_CLOCK
            .get_or_init(|| {
                let clock = quanta::Clock::new();
                match quanta::Upkeep::new_with_clock(GLOBAL_CLOCK_TICK, clock.clone()).start() {
                    Ok(handle) => GlobalClock {
                        clock: FastClock::new(clock),
                        _upkeep: Some(handle),
                    },
                    Err(err) => {
                        tracing::warn!(
                            %err,
                            "failed to start the global clock upkeep thread, using precise reads"
                        );
                        GlobalClock {
                            clock: FastClock::precise(clock),
                            _upkeep: None,
                        }
                    }
                }
            })
            .clock
            .clone()
    }
}

#[cfg(feature = "quanta")]
impl Clock for FastClock {
    fn now(&self) -> f64 {
        let now = if self.precise {
            self.clock.now()
        } else {
            self.clock.recent()
        };
        now.saturating_duration_since(self.origin).as_secs_f64()
    }
}

/// Manual clock implementation for testing and simulation.
///
/// Allows precise control over time progression, making it ideal for unit tests
/// and deterministic simulations of refill behavior.
///
/// # Examples
///
/// ```rust
/// use tokenbucket::{ManualClock, TokenBucket};
/// use std::sync::Arc;
///
/// let clock = Arc::new(ManualClock::new(0.0));
/// let bucket = TokenBucket::with_clock(10.0, 10.0, Arc::clone(&clock));
/// assert!(bucket.try_consume(10.0));
/// assert!(!bucket.try_consume(1.0));
///
/// // Advance time by 100ms
/// clock.advance(0.1);
/// assert!(bucket.try_consume(1.0));
/// ```
pub struct ManualClock {
    pub now: Mutex<f64>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl ManualClock {
    /// Creates a new manual clock starting at the specified time in seconds.
    pub fn new(now: f64) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Sets the current time to the specified value in seconds.
    ///
    /// Moving the clock backwards is allowed; buckets treat a negative elapsed
    /// time as no refill.
    pub fn set(&self, now: f64) {
        let mut guard = self.now.lock().unwrap();
        *guard = now;
    }

    /// Advances the current time by `delta` seconds.
    pub fn advance(&self, delta: f64) {
        let mut guard = self.now.lock().unwrap();
        *guard += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        let guard = self.now.lock().unwrap();
        *guard
    }
}

impl Clock for &ManualClock {
    fn now(&self) -> f64 {
        let guard = self.now.lock().unwrap();
        *guard
    }
}

impl Clock for Arc<ManualClock> {
    fn now(&self) -> f64 {
        let guard = self.now.lock().unwrap();
        *guard
    }
}
