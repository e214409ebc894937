//! Monotonic millisecond clock used for keepalive and read timeouts.
//!
//! Timestamps are `u32` milliseconds since an arbitrary epoch and are allowed
//! to wrap; elapsed time is always computed with [`elapsed_ms`], so a wrap
//! between two readings is harmless as long as the interval itself fits in
//! a `u32`.

/// A source of monotonically increasing milliseconds.
///
/// Any `Fn() -> u32` closure is a clock, which makes it easy to plug in a
/// hardware timer:
///
/// ```rust
/// use libpubsub::time::Clock;
///
/// fn ticks() -> u32 {
///     42
/// }
///
/// assert_eq!(ticks.now_ms(), 42);
/// ```
pub trait Clock {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u32;
}

impl<F> Clock for F
where
    F: Fn() -> u32,
{
    fn now_ms(&self) -> u32 {
        self()
    }
}

/// Milliseconds between `since` and `now`, tolerant of counter wrap.
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// A clock backed by [`std::time::Instant`], counting from its creation.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Start a new clock at zero.
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_ms(&self) -> u32 {
        // Truncation wraps the counter, which `elapsed_ms` tolerates.
        self.origin.elapsed().as_millis() as u32
    }
}
