//! Monotonic clock sources for the CPU timers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// A monotonic tick source with a known frequency.
pub trait ClockSource: Send + Sync {
    /// Current reading in ticks.
    fn now(&self) -> u64;

    /// Ticks per second.
    fn frequency(&self) -> u64;

    /// Convert a tick count to seconds.
    fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        ticks as f64 / self.frequency() as f64
    }

    /// Convert a tick count to microseconds.
    fn ticks_to_micros(&self, ticks: u64) -> f64 {
        self.ticks_to_seconds(ticks) * 1_000_000.0
    }
}

/// Wall clock backed by [`Instant`], ticking in nanoseconds.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// Create a clock whose tick zero is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Process-wide shared instance.
    pub fn shared() -> Arc<dyn ClockSource> {
        static SHARED: OnceLock<Arc<SystemClock>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(Self::new())).clone()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn frequency(&self) -> u64 {
        1_000_000_000
    }
}

/// Clock that only moves when told to.
///
/// Used for deterministic replays and tests. Ticks are microseconds.
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: AtomicU64,
}

impl ManualClock {
    /// Create a clock at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock.
    pub fn advance_micros(&self, micros: u64) {
        self.ticks.fetch_add(micros, Ordering::Relaxed);
    }

    /// Advance the clock by whole milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance_micros(millis * 1_000);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn frequency(&self) -> u64 {
        1_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_conversions() {
        let clock = ManualClock::new();
        clock.advance_millis(3);
        clock.advance_micros(250);

        assert_eq!(clock.now(), 3_250);
        assert_relative_eq!(clock.ticks_to_seconds(clock.now()), 0.003_25);
        assert_relative_eq!(clock.ticks_to_micros(clock.now()), 3_250.0);
    }
}
