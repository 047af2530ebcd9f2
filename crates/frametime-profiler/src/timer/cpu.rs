//! CPU wall-clock timer.

use std::sync::Arc;

use crate::clock::{ClockSource, SystemClock};
use crate::timer::FrameStats;

/// Measures CPU time between `start` and `stop`.
///
/// Repeated start/stop pairs between two resets add up. The value of a
/// frame stays readable after [`CpuTimer::reset`] until the timer is
/// started again.
pub struct CpuTimer {
    clock: Arc<dyn ClockSource>,
    started_at: Option<u64>,
    stats: FrameStats,
}

impl Default for CpuTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuTimer {
    /// Create a timer on the shared system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Create a timer reading the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            clock,
            started_at: None,
            stats: FrameStats::default(),
        }
    }

    /// Record the start of an interval.
    ///
    /// Starting a running timer is a caller error; the earlier start time
    /// is kept.
    pub fn start(&mut self) {
        debug_assert!(self.started_at.is_none(), "CpuTimer started twice");
        if self.started_at.is_some() {
            tracing::warn!("CpuTimer started while running, keeping earlier start time");
            return;
        }
        self.stats.open_interval();
        self.started_at = Some(self.clock.now());
    }

    /// Move the start of the open interval to now, or start if stopped.
    pub fn restart(&mut self) {
        if self.started_at.is_none() {
            self.stats.open_interval();
        }
        self.started_at = Some(self.clock.now());
    }

    /// End the open interval and accumulate it.
    pub fn stop(&mut self) {
        debug_assert!(self.started_at.is_some(), "CpuTimer stopped without start");
        let Some(started_at) = self.started_at.take() else {
            tracing::warn!("CpuTimer stopped without matching start");
            return;
        };
        let elapsed = self.clock.now().saturating_sub(started_at);
        self.stats.add(self.clock.ticks_to_seconds(elapsed));
    }

    /// Close the current frame. A running interval keeps its start time.
    pub fn reset(&mut self, reset_sum: bool) {
        self.stats.close_frame(reset_sum);
    }

    /// Drop all state.
    pub fn clear(&mut self) {
        self.started_at = None;
        self.stats = FrameStats::default();
    }

    /// Whether an interval is open.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Seconds measured in the most recent frame.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.stats.time()
    }

    /// Seconds accumulated since the last sum reset.
    #[must_use]
    pub const fn sum_time(&self) -> f64 {
        self.stats.sum()
    }

    /// Frames contributing to the sum.
    #[must_use]
    pub const fn num_frames(&self) -> u32 {
        self.stats.frames()
    }

    /// Average seconds per frame.
    #[must_use]
    pub fn avg_time(&self) -> f64 {
        self.stats.average()
    }

    /// Busy-wait for `seconds` on this timer's clock.
    pub fn delay(&self, seconds: f64) {
        let ticks = (seconds.max(0.0) * self.clock.frequency() as f64) as u64;
        let begin = self.clock.now();
        while self.clock.now().saturating_sub(begin) < ticks {
            std::hint::spin_loop();
        }
    }
}
