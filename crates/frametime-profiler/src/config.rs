//! Timer tree configuration.

use serde::{Deserialize, Serialize};

/// Default number of timestamp slots per GPU timer.
pub const DEFAULT_RING_CAPACITY: usize = 8;

/// Tick frequency assumed when the device reports none (27 MHz).
pub const DEFAULT_FALLBACK_FREQUENCY: u64 = 27_000_000;

/// What a GPU timer does when every ring slot is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Block until the oldest slot resolves. Each stall is counted and
    /// logged; frequent stalls mean the ring is too small.
    #[default]
    Stall,
    /// Throw away the oldest unread result and reuse its slot. Each drop
    /// is counted and logged; the frame it belonged to is not reported.
    DropOldest,
}

/// How tree nodes measure GPU time when a device is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GpuTiming {
    /// Non-blocking timestamp queries, results arrive frames later.
    #[default]
    Queries,
    /// Drain the GPU at start and stop and measure on the CPU. Two full
    /// stalls per measurement.
    Blocking,
}

/// Configuration shared by every timer of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Timestamp slots per GPU timer. Should cover
    /// `starts_per_frame * frames_of_latency`.
    pub ring_capacity: usize,
    /// Ticks per second used when the device cannot report a frequency.
    pub fallback_frequency: u64,
    /// Ring exhaustion policy.
    pub overflow: OverflowPolicy,
    /// GPU measurement strategy.
    pub gpu_timing: GpuTiming,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            fallback_frequency: DEFAULT_FALLBACK_FREQUENCY,
            overflow: OverflowPolicy::default(),
            gpu_timing: GpuTiming::default(),
        }
    }
}

impl TimerConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of ring slots (at least one).
    #[must_use]
    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity.max(1);
        self
    }

    /// Set the fallback tick frequency.
    #[must_use]
    pub const fn with_fallback_frequency(mut self, frequency: u64) -> Self {
        self.fallback_frequency = frequency;
        self
    }

    /// Set the overflow policy.
    #[must_use]
    pub const fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Set the GPU measurement strategy.
    #[must_use]
    pub const fn with_gpu_timing(mut self, gpu_timing: GpuTiming) -> Self {
        self.gpu_timing = gpu_timing;
        self
    }
}
