//! Blocking GPU timer measured on the CPU.

use std::sync::Arc;

use crate::clock::ClockSource;
use crate::device::TimestampDevice;
use crate::timer::CpuTimer;

/// Measures GPU work by draining the device at both edges.
///
/// Stalls the CPU twice per interval. Meant for coarse, infrequent
/// measurements such as one-off bakes, where a deterministic per-call
/// value matters more than frame rate.
pub struct GpuCpuTimer {
    device: Arc<dyn TimestampDevice>,
    cpu: CpuTimer,
}

impl GpuCpuTimer {
    /// Create a timer on the shared system clock.
    #[must_use]
    pub fn new(device: Arc<dyn TimestampDevice>) -> Self {
        Self {
            device,
            cpu: CpuTimer::new(),
        }
    }

    /// Create a timer reading the given clock.
    #[must_use]
    pub fn with_clock(device: Arc<dyn TimestampDevice>, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            device,
            cpu: CpuTimer::with_clock(clock),
        }
    }

    /// Wait for the GPU to go idle, then record the start.
    pub fn start(&mut self) {
        self.wait_idle();
        self.cpu.start();
    }

    /// Wait for the GPU to go idle, then move the start to now.
    pub fn restart(&mut self) {
        self.wait_idle();
        self.cpu.restart();
    }

    /// Wait for the work issued since start to finish, then record the stop.
    pub fn stop(&mut self) {
        self.wait_idle();
        self.cpu.stop();
    }

    /// Close the current frame.
    pub fn reset(&mut self, reset_sum: bool) {
        self.cpu.reset(reset_sum);
    }

    /// Drop all state.
    pub fn clear(&mut self) {
        self.cpu.clear();
    }

    /// Seconds measured in the most recent frame.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.cpu.time()
    }

    /// Seconds accumulated since the last sum reset.
    #[must_use]
    pub const fn sum_time(&self) -> f64 {
        self.cpu.sum_time()
    }

    /// Frames contributing to the sum.
    #[must_use]
    pub const fn num_frames(&self) -> u32 {
        self.cpu.num_frames()
    }

    /// Average seconds per frame.
    #[must_use]
    pub fn avg_time(&self) -> f64 {
        self.cpu.avg_time()
    }

    fn wait_idle(&self) {
        if let Err(err) = self.device.drain() {
            tracing::warn!(%err, "Failed to drain GPU");
        }
    }
}
