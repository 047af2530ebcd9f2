//! The timer tree.
//!
//! Instrumented code calls [`TimerTree::start`] and [`TimerTree::stop`] in
//! balanced pairs; nesting builds a tree of named events, and the same
//! name may appear under different parents. [`TimerTree::reset`] is called
//! once per frame: events started during the frame keep their place,
//! events that were not are recycled into a free-list so dynamically named
//! timers cannot grow the tree without bound.
//!
//! Nodes live in an arena. Parent, child and sibling links are indices,
//! and the free-list is a stack of reclaimed indices.

use std::sync::Arc;

use crate::clock::{ClockSource, SystemClock};
use crate::config::{GpuTiming, TimerConfig};
use crate::device::TimestampDevice;
use crate::event::{Node, NodeId, TimingEvent};
use crate::path;
use crate::timer::{CpuTimer, GpuCpuTimer, GpuTimer, Timer, TimerKind};

/// Hierarchical CPU/GPU timer owned by the frame loop.
pub struct TimerTree {
    nodes: Vec<Node>,
    current: usize,
    free: Vec<usize>,
    device: Option<Arc<dyn TimestampDevice>>,
    clock: Arc<dyn ClockSource>,
    config: TimerConfig,
    frame: u64,
}

impl Default for TimerTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerTree {
    pub(crate) const ROOT: usize = 0;

    /// Create a CPU-only tree with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TimerConfig::default())
    }

    /// Create a CPU-only tree with the given configuration.
    #[must_use]
    pub fn with_config(config: TimerConfig) -> Self {
        let clock = SystemClock::shared();
        Self {
            nodes: vec![Node::new("", clock.clone())],
            current: Self::ROOT,
            free: Vec::new(),
            device: None,
            clock,
            config,
            frame: 0,
        }
    }

    /// Use `clock` for every CPU measurement.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        for node in &mut self.nodes {
            node.cpu = CpuTimer::with_clock(clock.clone());
            node.gpu = None;
        }
        self.clock = clock;
        self
    }

    /// Bind a GPU query device, or pass `None` for CPU-only timing.
    ///
    /// Events pick up their GPU timers the next time they are started.
    pub fn init(&mut self, device: Option<Arc<dyn TimestampDevice>>) {
        if self.device.is_some() {
            self.destroy();
        }
        for node in &mut self.nodes {
            node.gpu_failed = false;
        }
        tracing::debug!(gpu = device.is_some(), "Timer tree initialized");
        self.device = device;
    }

    /// Release every GPU query. Call before the device is destroyed.
    ///
    /// The tree stays usable for CPU timing.
    pub fn destroy(&mut self) {
        for node in &mut self.nodes {
            node.gpu = None;
        }
        if self.device.take().is_some() {
            tracing::debug!("Timer tree released GPU queries");
        }
    }

    /// The bound GPU device.
    #[must_use]
    pub fn device(&self) -> Option<&Arc<dyn TimestampDevice>> {
        self.device.as_ref()
    }

    /// The configuration every timer is created with.
    #[must_use]
    pub const fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Start a new frame.
    ///
    /// Events started since the previous reset are reset in place; the
    /// rest are detached and recycled together with their subtrees. The
    /// cursor returns to the root. `reset_sum` also clears the running
    /// sums used for averages.
    pub fn reset(&mut self, reset_sum: bool) {
        debug_assert!(
            self.current == Self::ROOT,
            "TimerTree reset while timer '{}' is open",
            self.nodes[self.current].name
        );
        if self.current != Self::ROOT {
            tracing::warn!(
                open = %self.nodes[self.current].name,
                "Timer tree reset with open timers"
            );
        }

        let mut stack = vec![Self::ROOT];
        while let Some(parent) = stack.pop() {
            let mut prev: Option<usize> = None;
            let mut child = self.nodes[parent].first_child;
            while let Some(index) = child {
                let next = self.nodes[index].next;
                if self.nodes[index].used {
                    self.nodes[index].reset(reset_sum);
                    stack.push(index);
                    prev = Some(index);
                } else {
                    match prev {
                        Some(p) => self.nodes[p].next = next,
                        None => self.nodes[parent].first_child = next,
                    }
                    self.recycle_subtree(index);
                }
                child = next;
            }
        }

        self.current = Self::ROOT;
        self.frame += 1;
    }

    /// Reset and clear the running sums.
    pub fn full_reset(&mut self) {
        self.reset(true);
    }

    /// Start the timer `name` under the currently open timer.
    ///
    /// An existing child of that name is reused; otherwise a node is taken
    /// from the free-list or allocated. Starting the open timer's own name
    /// again restarts it in place, and the extra start is matched by an
    /// extra stop.
    pub fn start(&mut self, name: &str) {
        let cursor = self.current;
        if cursor != Self::ROOT && self.nodes[cursor].name == name {
            tracing::trace!(name, "Restarting open timer");
            let node = &mut self.nodes[cursor];
            node.depth += 1;
            node.used = true;
            node.restart();
            return;
        }

        let index = match self.find_child(cursor, name) {
            Some(index) => {
                if !self.nodes[index].used {
                    self.unlink_child(cursor, index);
                    self.insert_child(cursor, index);
                }
                index
            }
            None => {
                let index = self.allocate(name);
                self.insert_child(cursor, index);
                index
            }
        };

        self.ensure_gpu_timer(index);
        let node = &mut self.nodes[index];
        node.used = true;
        node.depth = 1;
        node.start();
        self.current = index;
    }

    /// Stop the currently open timer and return to its parent.
    pub fn stop(&mut self) {
        debug_assert!(self.current != Self::ROOT, "TimerTree::stop with no open timer");
        if self.current == Self::ROOT {
            tracing::warn!("Unbalanced timer stop ignored");
            return;
        }

        let node = &mut self.nodes[self.current];
        if node.depth > 1 {
            node.depth -= 1;
            return;
        }
        node.depth = 0;
        node.stop();
        self.current = node.parent.unwrap_or(Self::ROOT);
    }

    /// Time of the event at `path` in seconds.
    ///
    /// An empty path names the first top-level event. Returns `None` when
    /// the path does not resolve or the GPU has never reported a value.
    pub fn time(&mut self, kind: TimerKind, path: &str, stall: bool) -> Option<f64> {
        self.timer(path)?.time(kind, stall)
    }

    /// Average time of the event at `path` in seconds.
    pub fn avg_time(&mut self, kind: TimerKind, path: &str, stall: bool) -> Option<f64> {
        self.timer(path)?.avg_time(kind, stall)
    }

    /// Block until the GPU time of `path` is available and return it.
    pub fn wait_for_gpu_time(&mut self, path: &str) -> Option<f64> {
        self.time(TimerKind::Gpu, path, true)
    }

    /// The event at `path`, or the first top-level event for an empty path.
    pub fn timer(&mut self, path: &str) -> Option<TimingEvent<'_>> {
        let index = match self.resolve(Self::ROOT, path)? {
            Self::ROOT => self.nodes[Self::ROOT].first_child?,
            index => index,
        };
        Some(TimingEvent::new(self, index))
    }

    /// The event behind a handle, unless it has been recycled since.
    pub fn event(&mut self, id: NodeId) -> Option<TimingEvent<'_>> {
        let node = self.nodes.get(id.index)?;
        if id.index == Self::ROOT || node.generation != id.generation || node.parent.is_none() {
            return None;
        }
        Some(TimingEvent::new(self, id.index))
    }

    /// The innermost open timer.
    #[must_use]
    pub fn current(&self) -> Option<NodeId> {
        (self.current != Self::ROOT).then(|| NodeId {
            index: self.current,
            generation: self.nodes[self.current].generation,
        })
    }

    /// Number of resets so far.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Events currently linked into the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - 1 - self.free.len()
    }

    /// Whether no event has been started since the tree was created or
    /// everything was recycled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recycled events waiting for reuse.
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Total nodes ever allocated.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.len() - 1
    }

    pub(crate) fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> &mut Node {
        &mut self.nodes[index]
    }

    pub(crate) fn children(&self, parent: usize) -> Children<'_> {
        Children {
            tree: self,
            next: self.nodes[parent].first_child,
        }
    }

    /// Follow `path` from `from`. Read-only: never creates nodes.
    pub(crate) fn resolve(&self, from: usize, path: &str) -> Option<usize> {
        path::segments(path).try_fold(from, |parent, name| self.find_child(parent, name))
    }

    fn find_child(&self, parent: usize, name: &str) -> Option<usize> {
        self.children(parent)
            .find(|&index| self.nodes[index].name == name)
    }

    /// Last child of `parent` in the run of children used this frame.
    fn find_last_child_used(&self, parent: usize) -> Option<usize> {
        self.children(parent)
            .take_while(|&index| self.nodes[index].used)
            .last()
    }

    /// Link `index` right after the used children of `parent`, keeping
    /// this frame's timers at the front of the list in start order.
    fn insert_child(&mut self, parent: usize, index: usize) {
        match self.find_last_child_used(parent) {
            Some(last) => {
                self.nodes[index].next = self.nodes[last].next;
                self.nodes[last].next = Some(index);
            }
            None => {
                self.nodes[index].next = self.nodes[parent].first_child;
                self.nodes[parent].first_child = Some(index);
            }
        }
        self.nodes[index].parent = Some(parent);
    }

    fn unlink_child(&mut self, parent: usize, index: usize) {
        let next = self.nodes[index].next.take();
        if self.nodes[parent].first_child == Some(index) {
            self.nodes[parent].first_child = next;
            return;
        }
        let mut child = self.nodes[parent].first_child;
        while let Some(sibling) = child {
            if self.nodes[sibling].next == Some(index) {
                self.nodes[sibling].next = next;
                return;
            }
            child = self.nodes[sibling].next;
        }
    }

    fn allocate(&mut self, name: &str) -> usize {
        if let Some(index) = self.free.pop() {
            self.nodes[index].set_name(name);
            return index;
        }
        self.nodes.push(Node::new(name, self.clock.clone()));
        self.nodes.len() - 1
    }

    fn recycle_subtree(&mut self, index: usize) {
        let mut stack = vec![index];
        while let Some(index) = stack.pop() {
            let mut child = self.nodes[index].first_child;
            while let Some(c) = child {
                stack.push(c);
                child = self.nodes[c].next;
            }
            tracing::trace!(name = %self.nodes[index].name, "Recycling timer");
            self.nodes[index].recycle();
            self.free.push(index);
        }
    }

    fn ensure_gpu_timer(&mut self, index: usize) {
        let Some(device) = &self.device else {
            return;
        };
        let node = &mut self.nodes[index];
        if node.gpu.is_some() || node.gpu_failed {
            return;
        }
        node.gpu = match self.config.gpu_timing {
            GpuTiming::Queries => match GpuTimer::new(device.clone(), &self.config) {
                Ok(timer) => Some(Timer::Gpu(timer)),
                Err(err) => {
                    tracing::warn!(%err, name = %node.name, "GPU timer unavailable, timing CPU only");
                    node.gpu_failed = true;
                    None
                }
            },
            GpuTiming::Blocking => Some(Timer::GpuCpu(GpuCpuTimer::with_clock(
                device.clone(),
                self.clock.clone(),
            ))),
        };
    }
}

/// Iterator over the child indices of a node.
pub(crate) struct Children<'a> {
    tree: &'a TimerTree,
    next: Option<usize>,
}

impl Iterator for Children<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let index = self.next?;
        self.next = self.tree.nodes[index].next;
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use approx::assert_relative_eq;

    fn manual_tree() -> (Arc<ManualClock>, TimerTree) {
        let clock = Arc::new(ManualClock::new());
        let tree = TimerTree::new().with_clock(clock.clone());
        (clock, tree)
    }

    fn child_names(tree: &mut TimerTree, path: &str) -> Vec<String> {
        let mut names = Vec::new();
        let mut child = tree.timer(path).and_then(TimingEvent::first_child);
        while let Some(event) = child {
            names.push(event.name().to_owned());
            child = event.next_timer();
        }
        names
    }

    #[test]
    fn nested_starts_build_tree() {
        let (clock, mut tree) = manual_tree();
        tree.reset(false);
        tree.start("Render");
        tree.start("ZPrepass");
        tree.start("solid");
        clock.advance_millis(2);
        tree.stop();
        tree.start("transparent");
        clock.advance_millis(3);
        tree.stop();
        tree.stop();
        tree.stop();

        assert_eq!(child_names(&mut tree, "Render"), vec!["ZPrepass"]);
        assert_eq!(
            child_names(&mut tree, "Render|ZPrepass"),
            vec!["solid", "transparent"]
        );

        let solid = tree.time(TimerKind::Cpu, "Render|ZPrepass|solid", false).unwrap();
        let transparent = tree
            .time(TimerKind::Cpu, "Render/ZPrepass/transparent", false)
            .unwrap();
        let prepass = tree.time(TimerKind::Cpu, "Render\\ZPrepass", false).unwrap();
        assert_relative_eq!(solid, 0.002, epsilon = 1e-12);
        assert_relative_eq!(transparent, 0.003, epsilon = 1e-12);
        assert!(solid + transparent <= prepass + 1e-12);
        assert!(tree.current().is_none());
    }

    #[test]
    fn same_name_under_same_parent_accumulates() {
        let (clock, mut tree) = manual_tree();
        tree.start("transparent");
        clock.advance_millis(1);
        tree.stop();
        tree.start("transparent");
        clock.advance_millis(2);
        tree.stop();

        assert_eq!(tree.len(), 1);
        let time = tree.time(TimerKind::Cpu, "transparent", false).unwrap();
        assert_relative_eq!(time, 0.003, epsilon = 1e-12);
    }

    #[test]
    fn same_name_under_different_parents_is_distinct() {
        let (_clock, mut tree) = manual_tree();
        tree.start("Render");
        tree.start("solid");
        tree.stop();
        tree.stop();
        tree.start("main");
        tree.start("solid");
        tree.stop();
        tree.stop();

        assert_eq!(tree.len(), 4);
        assert!(tree.timer("Render|solid").is_some());
        assert!(tree.timer("main|solid").is_some());
        assert!(tree.timer("solid").is_none());
    }

    #[test]
    fn restarting_open_timer_creates_no_sibling() {
        let (clock, mut tree) = manual_tree();
        tree.start("A");
        clock.advance_millis(5);
        tree.start("A");
        clock.advance_millis(1);
        tree.stop();
        assert!(tree.current().is_some());
        tree.stop();

        assert_eq!(tree.len(), 1);
        assert!(tree.timer("A|A").is_none());
        let time = tree.time(TimerKind::Cpu, "A", false).unwrap();
        assert_relative_eq!(time, 0.001, epsilon = 1e-12);
    }

    #[test]
    fn open_timer_reads_zero_cpu_time() {
        let (clock, mut tree) = manual_tree();
        tree.start("Render");
        tree.start("solid");
        clock.advance_millis(4);

        assert_eq!(tree.time(TimerKind::Cpu, "Render|solid", false), Some(0.0));
        tree.stop();
        tree.stop();
    }

    #[test]
    fn reset_keeps_values_until_restart() {
        let (clock, mut tree) = manual_tree();
        tree.start("A");
        clock.advance_millis(3);
        tree.stop();
        tree.reset(false);

        let time = tree.time(TimerKind::Cpu, "A", false).unwrap();
        assert_relative_eq!(time, 0.003, epsilon = 1e-12);
        assert!(!tree.timer("A").unwrap().used());
    }

    #[test]
    fn full_reset_zeroes_sums() {
        let (clock, mut tree) = manual_tree();
        for _ in 0..3 {
            tree.start("A");
            clock.advance_millis(1);
            tree.stop();
            tree.reset(false);
            tree.start("A");
            tree.stop();
        }
        tree.full_reset();

        let mut event = tree.timer("A").unwrap();
        assert_eq!(event.num_frames(TimerKind::Cpu, false), 0);
        assert_relative_eq!(event.sum_time(TimerKind::Cpu, false), 0.0);
    }

    #[test]
    fn average_divides_sum_by_frames() {
        let (clock, mut tree) = manual_tree();
        for millis in [2, 4, 6] {
            tree.reset(false);
            tree.start("A");
            clock.advance_millis(millis);
            tree.stop();
        }

        let avg = tree.avg_time(TimerKind::Cpu, "A", false).unwrap();
        assert_relative_eq!(avg, 0.004, epsilon = 1e-12);
    }

    #[test]
    fn unused_nodes_are_recycled() {
        let (_clock, mut tree) = manual_tree();
        tree.start("loop");
        for i in 0..10 {
            tree.start(&format!("iteration {i}"));
            tree.stop();
        }
        tree.stop();
        assert_eq!(tree.len(), 11);

        for frame in 0..50 {
            tree.reset(false);
            tree.start("loop");
            tree.start(&format!("dynamic {frame}"));
            tree.stop();
            tree.stop();
        }
        tree.reset(false);

        assert_eq!(tree.len(), 2);
        assert!(tree.capacity() <= 12);
        assert!(tree.timer("loop|dynamic 49").is_some());
        assert!(tree.timer("loop|dynamic 48").is_none());
    }

    #[test]
    fn stale_handles_resolve_to_none() {
        let (_clock, mut tree) = manual_tree();
        tree.start("old");
        tree.stop();
        let id = tree.timer("old").unwrap().id();

        tree.reset(false);
        assert!(tree.event(id).is_some());
        tree.reset(false);
        assert!(tree.event(id).is_none());

        tree.start("new");
        tree.stop();
        assert!(tree.event(id).is_none());
        assert_eq!(tree.capacity(), 1);
    }

    #[test]
    fn restarted_nodes_move_to_front_in_start_order() {
        let (_clock, mut tree) = manual_tree();
        for name in ["a", "b", "c"] {
            tree.start(name);
            tree.stop();
        }
        tree.reset(false);
        for name in ["c", "a"] {
            tree.start(name);
            tree.stop();
        }

        let mut names = Vec::new();
        let mut event = tree.timer("");
        while let Some(e) = event {
            names.push(e.name().to_owned());
            event = e.next_timer();
        }
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn navigation_stops_at_tree_boundary() {
        let (_clock, mut tree) = manual_tree();
        tree.start("Render");
        tree.start("ZPrepass");
        tree.stop();
        tree.start("main");
        tree.stop();
        tree.stop();

        let main = tree
            .timer("Render")
            .and_then(TimingEvent::first_child)
            .and_then(TimingEvent::next_timer)
            .unwrap();
        assert_eq!(main.name(), "main");
        assert!(main.next_timer().is_none());

        let render = tree.timer("Render|main").and_then(TimingEvent::parent).unwrap();
        assert_eq!(render.name(), "Render");
        assert!(render.parent().is_none());

        let relative = tree.timer("Render").and_then(|e| e.timer("ZPrepass")).unwrap();
        assert_eq!(relative.name(), "ZPrepass");
        assert!(tree.timer("Render|missing").is_none());
    }

    #[test]
    fn cpu_only_tree_reports_no_gpu_time() {
        let (_clock, mut tree) = manual_tree();
        tree.start("A");
        tree.stop();

        assert_eq!(tree.time(TimerKind::Gpu, "A", false), None);
        assert_eq!(tree.time(TimerKind::GpuCpu, "A", false), Some(0.0));
        assert_eq!(tree.time(TimerKind::Cpu, "missing", false), None);
    }
}
