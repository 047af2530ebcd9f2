//! Test support for frametime.
//!
//! Provides a simulated GPU so timer behavior can be tested without a
//! graphics device, plus the integration tests under `tests/`.

pub mod mock;

pub use mock::{MockDevice, MOCK_FREQUENCY};

use std::sync::Arc;

use frametime_profiler::{ManualClock, TimerConfig, TimerTree};

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A tree on a manual clock with `device` bound, plus the clock and device.
#[must_use]
pub fn gpu_tree(
    device: MockDevice,
    config: TimerConfig,
) -> (TimerTree, Arc<ManualClock>, Arc<MockDevice>) {
    let clock = Arc::new(ManualClock::new());
    let device = device.with_host_clock(clock.clone()).shared();
    let mut tree = TimerTree::with_config(config).with_clock(clock.clone());
    tree.init(Some(device.clone()));
    (tree, clock, device)
}
