//! Timing events: the nodes of the timer tree.

use std::sync::Arc;

use crate::clock::ClockSource;
use crate::timer::{CpuTimer, Timer, TimerKind};
use crate::tree::TimerTree;

/// Stable handle to a timing event.
///
/// A handle stays valid until a reset recycles its event; afterwards it
/// resolves to `None` even if the slot is reused under another name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

/// Arena storage for one timing event.
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) cpu: CpuTimer,
    pub(crate) gpu: Option<Timer>,
    pub(crate) gpu_failed: bool,
    pub(crate) used: bool,
    // Number of starts not yet matched by a stop; above one after restarts.
    pub(crate) depth: u32,
    pub(crate) generation: u32,
    pub(crate) parent: Option<usize>,
    pub(crate) first_child: Option<usize>,
    pub(crate) next: Option<usize>,
}

impl Node {
    pub(crate) fn new(name: &str, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            name: name.to_owned(),
            cpu: CpuTimer::with_clock(clock),
            gpu: None,
            gpu_failed: false,
            used: false,
            depth: 0,
            generation: 0,
            parent: None,
            first_child: None,
            next: None,
        }
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name.clear();
        self.name.push_str(name);
    }

    pub(crate) fn start(&mut self) {
        if let Some(gpu) = &mut self.gpu {
            gpu.start();
        }
        self.cpu.start();
    }

    pub(crate) fn restart(&mut self) {
        if let Some(gpu) = &mut self.gpu {
            gpu.restart();
        }
        self.cpu.restart();
    }

    pub(crate) fn stop(&mut self) {
        self.cpu.stop();
        if let Some(gpu) = &mut self.gpu {
            gpu.stop();
        }
    }

    pub(crate) fn reset(&mut self, reset_sum: bool) {
        self.used = false;
        self.depth = 0;
        self.cpu.reset(reset_sum);
        if let Some(gpu) = &mut self.gpu {
            gpu.reset(reset_sum);
        }
    }

    /// Detach and wipe for the free-list. Outstanding handles go stale.
    pub(crate) fn recycle(&mut self) {
        self.used = false;
        self.depth = 0;
        self.generation = self.generation.wrapping_add(1);
        self.parent = None;
        self.first_child = None;
        self.next = None;
        self.cpu.clear();
        if let Some(gpu) = &mut self.gpu {
            gpu.clear();
        }
    }

    pub(crate) fn time(&mut self, kind: TimerKind, stall: bool) -> Option<f64> {
        match kind {
            TimerKind::Cpu => Some(self.cpu.time()),
            TimerKind::Gpu => self.gpu.as_mut().and_then(|gpu| gpu.time(stall)),
            TimerKind::GpuCpu => match &mut self.gpu {
                Some(gpu @ Timer::GpuCpu(_)) => gpu.time(stall),
                _ => Some(self.cpu.time()),
            },
        }
    }

    pub(crate) fn avg_time(&mut self, kind: TimerKind, stall: bool) -> Option<f64> {
        match kind {
            TimerKind::Cpu => Some(self.cpu.avg_time()),
            TimerKind::Gpu => self.gpu.as_mut().and_then(|gpu| gpu.avg_time(stall)),
            TimerKind::GpuCpu => match &mut self.gpu {
                Some(gpu @ Timer::GpuCpu(_)) => gpu.avg_time(stall),
                _ => Some(self.cpu.avg_time()),
            },
        }
    }

    pub(crate) fn sum_time(&mut self, kind: TimerKind, stall: bool) -> f64 {
        match (kind, &mut self.gpu) {
            (TimerKind::Gpu, Some(gpu)) => gpu.sum_time(stall),
            (TimerKind::Gpu, None) => 0.0,
            (TimerKind::GpuCpu, Some(gpu @ Timer::GpuCpu(_))) => gpu.sum_time(stall),
            _ => self.cpu.sum_time(),
        }
    }

    pub(crate) fn num_frames(&mut self, kind: TimerKind, stall: bool) -> u32 {
        match (kind, &mut self.gpu) {
            (TimerKind::Gpu, Some(gpu)) => gpu.num_frames(stall),
            (TimerKind::Gpu, None) => 0,
            (TimerKind::GpuCpu, Some(gpu @ Timer::GpuCpu(_))) => gpu.num_frames(stall),
            _ => self.cpu.num_frames(),
        }
    }
}

/// A view of one timing event inside a [`TimerTree`].
///
/// Navigation consumes the view and returns a view of the neighbour, so a
/// walk looks like `event.first_child()?.next_timer()`. Views borrow the
/// tree mutably because reading a GPU time collects pending query results.
pub struct TimingEvent<'a> {
    tree: &'a mut TimerTree,
    index: usize,
}

impl<'a> TimingEvent<'a> {
    pub(crate) fn new(tree: &'a mut TimerTree, index: usize) -> Self {
        Self { tree, index }
    }

    fn node(&self) -> &Node {
        self.tree.node(self.index)
    }

    fn node_mut(&mut self) -> &mut Node {
        self.tree.node_mut(self.index)
    }

    /// Handle for coming back to this event later.
    #[must_use]
    pub fn id(&self) -> NodeId {
        NodeId {
            index: self.index,
            generation: self.node().generation,
        }
    }

    /// Name of the event, unique among its siblings.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.node().name
    }

    /// Whether the event was started since the last reset.
    #[must_use]
    pub fn used(&self) -> bool {
        self.node().used
    }

    /// Whether the event is between start and stop.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.node().depth > 0
    }

    /// Most recent frame's time in seconds.
    ///
    /// CPU: 0 while the first interval of the frame is still open. GPU:
    /// the last completed frame, possibly several frames old, or `None`
    /// if nothing has completed yet or GPU timing is off. `GpuCpu` falls
    /// back to the CPU time on events without a blocking GPU timer.
    pub fn time(&mut self, kind: TimerKind, stall: bool) -> Option<f64> {
        self.node_mut().time(kind, stall)
    }

    /// Sum over frames divided by the frame count, in seconds.
    pub fn avg_time(&mut self, kind: TimerKind, stall: bool) -> Option<f64> {
        self.node_mut().avg_time(kind, stall)
    }

    /// Seconds accumulated since the last sum reset.
    pub fn sum_time(&mut self, kind: TimerKind, stall: bool) -> f64 {
        self.node_mut().sum_time(kind, stall)
    }

    /// Frames contributing to [`Self::sum_time`].
    pub fn num_frames(&mut self, kind: TimerKind, stall: bool) -> u32 {
        self.node_mut().num_frames(kind, stall)
    }

    /// Resolve a path relative to this event. An empty path is the event itself.
    #[must_use]
    pub fn timer(self, path: &str) -> Option<Self> {
        let index = self.tree.resolve(self.index, path)?;
        Some(Self::new(self.tree, index))
    }

    /// The enclosing event, `None` for top-level events.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        let parent = self.node().parent.filter(|&p| p != TimerTree::ROOT)?;
        Some(Self::new(self.tree, parent))
    }

    /// The first nested event.
    #[must_use]
    pub fn first_child(self) -> Option<Self> {
        let child = self.node().first_child?;
        Some(Self::new(self.tree, child))
    }

    /// The next event with the same parent.
    #[must_use]
    pub fn next_timer(self) -> Option<Self> {
        let next = self.node().next?;
        Some(Self::new(self.tree, next))
    }
}
