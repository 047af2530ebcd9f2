//! The three timer kinds and the closed enum over them.
//!
//! Every timer accumulates: starting and stopping it several times
//! between two resets adds the intervals up. A reset closes the frame,
//! the next start opens a new one.

mod cpu;
mod gpu;
mod gpu_cpu;

pub use cpu::CpuTimer;
pub use gpu::GpuTimer;
pub use gpu_cpu::GpuCpuTimer;

use serde::{Deserialize, Serialize};

/// Which measurement of a timing event to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Wall-clock time spent on the CPU between start and stop.
    Cpu,
    /// Time the GPU spent executing the commands recorded between start and stop.
    Gpu,
    /// GPU time observed on the CPU by draining the GPU at both edges.
    GpuCpu,
}

/// Per-frame value, running sum and frame count of a CPU-side timer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameStats {
    time: f64,
    sum: f64,
    frames: u32,
    // The next interval opens a new frame.
    frame_closed: bool,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            time: 0.0,
            sum: 0.0,
            frames: 0,
            frame_closed: true,
        }
    }
}

impl FrameStats {
    /// Called when an interval begins.
    pub(crate) fn open_interval(&mut self) {
        if self.frame_closed {
            self.frame_closed = false;
            self.time = 0.0;
            self.frames += 1;
        }
    }

    pub(crate) fn add(&mut self, seconds: f64) {
        self.time += seconds;
        self.sum += seconds;
    }

    pub(crate) fn close_frame(&mut self, reset_sum: bool) {
        self.frame_closed = true;
        if reset_sum {
            self.sum = 0.0;
            self.frames = 0;
        }
    }

    pub(crate) const fn time(&self) -> f64 {
        self.time
    }

    pub(crate) const fn sum(&self) -> f64 {
        self.sum
    }

    pub(crate) const fn frames(&self) -> u32 {
        self.frames
    }

    pub(crate) fn average(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.sum / f64::from(self.frames)
        }
    }
}

/// A timer of any kind.
///
/// Tree nodes keep their CPU timer outside this enum and store only the
/// GPU side here; the `Cpu` variant is for callers that want one handle
/// type for standalone timers of every kind.
pub enum Timer {
    /// CPU wall-clock timer.
    Cpu(CpuTimer),
    /// Non-blocking GPU timestamp timer.
    Gpu(GpuTimer),
    /// Blocking GPU timer measured on the CPU.
    GpuCpu(GpuCpuTimer),
}

impl Timer {
    /// Begin an interval.
    pub fn start(&mut self) {
        match self {
            Self::Cpu(t) => t.start(),
            Self::Gpu(t) => t.start(),
            Self::GpuCpu(t) => t.start(),
        }
    }

    /// Begin again from now, discarding the open interval's start.
    pub fn restart(&mut self) {
        match self {
            Self::Cpu(t) => t.restart(),
            Self::Gpu(t) => t.restart(),
            Self::GpuCpu(t) => t.restart(),
        }
    }

    /// End the open interval.
    pub fn stop(&mut self) {
        match self {
            Self::Cpu(t) => t.stop(),
            Self::Gpu(t) => t.stop(),
            Self::GpuCpu(t) => t.stop(),
        }
    }

    /// Close the current frame; clear the running sum when `reset_sum`.
    pub fn reset(&mut self, reset_sum: bool) {
        match self {
            Self::Cpu(t) => t.reset(reset_sum),
            Self::Gpu(t) => t.reset(reset_sum),
            Self::GpuCpu(t) => t.reset(reset_sum),
        }
    }

    /// Forget every measurement, as if freshly created.
    pub fn clear(&mut self) {
        match self {
            Self::Cpu(t) => t.clear(),
            Self::Gpu(t) => t.clear(),
            Self::GpuCpu(t) => t.clear(),
        }
    }

    /// Most recent frame's time in seconds.
    ///
    /// `None` only for a GPU timer that has never completed a measurement.
    /// `stall` makes a GPU timer wait for its in-flight results.
    pub fn time(&mut self, stall: bool) -> Option<f64> {
        match self {
            Self::Cpu(t) => Some(t.time()),
            Self::Gpu(t) => t.time(stall),
            Self::GpuCpu(t) => Some(t.time()),
        }
    }

    /// Accumulated time since the last sum reset, in seconds.
    pub fn sum_time(&mut self, stall: bool) -> f64 {
        match self {
            Self::Cpu(t) => t.sum_time(),
            Self::Gpu(t) => t.sum_time(stall),
            Self::GpuCpu(t) => t.sum_time(),
        }
    }

    /// Number of frames contributing to [`Self::sum_time`].
    pub fn num_frames(&mut self, stall: bool) -> u32 {
        match self {
            Self::Cpu(t) => t.num_frames(),
            Self::Gpu(t) => t.num_frames(stall),
            Self::GpuCpu(t) => t.num_frames(),
        }
    }

    /// Sum divided by frame count.
    pub fn avg_time(&mut self, stall: bool) -> Option<f64> {
        match self {
            Self::Cpu(t) => Some(t.avg_time()),
            Self::Gpu(t) => t.avg_time(stall),
            Self::GpuCpu(t) => Some(t.avg_time()),
        }
    }

    /// The kind this timer measures.
    #[must_use]
    pub const fn kind(&self) -> TimerKind {
        match self {
            Self::Cpu(_) => TimerKind::Cpu,
            Self::Gpu(_) => TimerKind::Gpu,
            Self::GpuCpu(_) => TimerKind::GpuCpu,
        }
    }
}
