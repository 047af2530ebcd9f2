//! Hierarchical CPU/GPU frame timers.
//!
//! Code is instrumented with nested start/stop calls on a [`TimerTree`].
//! Every named region gets a CPU wall-clock timer and, when a GPU device is
//! bound, a GPU timer built on timestamp queries. GPU results are collected
//! without blocking and lag a few frames behind; reading with `stall` waits
//! for them.
//!
//! # Feature Flags
//!
//! - `profiling` (default): enable the instrumentation macros. When
//!   disabled, [`profile_scope!`], [`profile_begin!`] and [`profile_end!`]
//!   expand to nothing.
//!
//! # Usage
//!
//! ```ignore
//! use frametime_profiler::{profile_scope, TimerKind, TimerTree};
//!
//! let mut tree = TimerTree::new();
//! tree.init(Some(device));
//!
//! loop {
//!     tree.reset(false);
//!     {
//!         profile_scope!(tree, "Render");
//!         // ... record and submit GPU work
//!     }
//!     let cpu = tree.time(TimerKind::Cpu, "Render", false);
//!     let gpu = tree.time(TimerKind::Gpu, "Render", false);
//! }
//! ```
//!
//! The tree is single-threaded: it is driven by the thread that records
//! the command stream, and is `Send` so it can move between threads.

mod clock;
mod config;
mod device;
mod error;
mod event;
mod path;
mod scope;
mod snapshot;
mod timer;
mod tree;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use config::{
    GpuTiming, OverflowPolicy, TimerConfig, DEFAULT_FALLBACK_FREQUENCY, DEFAULT_RING_CAPACITY,
};
pub use device::{DisjointData, QueryData, QueryHandle, QueryKind, TimestampDevice};
pub use error::{ProfilerError, Result};
pub use event::{NodeId, TimingEvent};
pub use path::{DISPLAY_SEPARATOR, PATH_SEPARATORS};
pub use scope::ScopeTimer;
pub use snapshot::{EventSnapshot, TreeSnapshot};
pub use timer::{CpuTimer, GpuCpuTimer, GpuTimer, Timer, TimerKind};
pub use tree::TimerTree;
