//! Monotonic time sources for last-used timestamps.
//!
//! Pools never read the wall clock directly; they ask a [`Clock`] for a
//! [`Timestamp`] (elapsed time since the clock's origin). Production code
//! uses [`SystemClock`], tests drive [`ManualClock`] by hand so sweep
//! expiry can be exercised without sleeping.

use std::sync::Mutex;
use std::time::Duration;

use web_time::Instant;

use super::sync::lock;

/// Elapsed time since a clock's origin.
pub type Timestamp = Duration;

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// Current time relative to this clock's origin.
    fn now(&self) -> Timestamp;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is "now".
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        self.origin.elapsed()
    }
}

/// Hand-driven [`Clock`] for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a clock stopped at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = lock(&self.now);
        *now += delta;
    }

    /// Jump to an absolute time. Going backwards is clamped to the
    /// current time so the clock stays monotonic.
    pub fn set(&self, at: Timestamp) {
        let mut now = lock(&self.now);
        if at > *now {
            *now = at;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *lock(&self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_and_never_rewinds() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance(Duration::from_millis(150));
        assert_eq!(clock.now(), Duration::from_millis(150));
        clock.set(Duration::from_millis(10));
        assert_eq!(clock.now(), Duration::from_millis(150));
        clock.set(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(1));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
