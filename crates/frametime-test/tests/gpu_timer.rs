//! GPU timer behavior against the simulated device.

use std::sync::Arc;

use approx::assert_relative_eq;
use frametime_profiler::{GpuTimer, OverflowPolicy, ProfilerError, TimerConfig};
use frametime_test::{init_tracing, MockDevice};

fn timer(device: &Arc<MockDevice>, config: &TimerConfig) -> GpuTimer {
    init_tracing();
    GpuTimer::new(device.clone(), config).unwrap()
}

fn measure(device: &MockDevice, timer: &mut GpuTimer, ticks: u64) {
    timer.start();
    device.gpu_work(ticks);
    timer.stop();
}

#[test]
fn never_measured_reads_none() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    assert_eq!(timer.time(false), None);
    assert_eq!(timer.avg_time(false), None);

    measure(&device, &mut timer, 1_000);
    assert_eq!(timer.time(false), None);
}

#[test]
fn result_arrives_after_gpu_completes() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    measure(&device, &mut timer, 2_000);
    timer.reset(false);
    assert_eq!(timer.time(false), None);
    assert_eq!(timer.in_flight(), 1);

    device.complete_all();
    assert_relative_eq!(timer.time(false).unwrap(), 0.002, epsilon = 1e-12);
    assert_eq!(timer.in_flight(), 0);
    assert_eq!(timer.num_frames(false), 1);
}

#[test]
fn reads_never_block_without_stall() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    for _ in 0..4 {
        measure(&device, &mut timer, 500);
        timer.reset(false);
        let _ = timer.time(false);
    }

    assert_eq!(device.blocking_waits(), 0);
    assert_eq!(timer.in_flight(), 4);
}

#[test]
fn intervals_in_one_frame_are_summed() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    measure(&device, &mut timer, 1_000);
    device.gpu_work(10_000);
    measure(&device, &mut timer, 2_000);
    timer.reset(false);
    device.complete_all();

    assert_relative_eq!(timer.time(false).unwrap(), 0.003, epsilon = 1e-12);
    assert_eq!(timer.num_frames(false), 1);
}

#[test]
fn reports_most_recent_completed_frame() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    measure(&device, &mut timer, 1_000);
    timer.reset(false);
    measure(&device, &mut timer, 3_000);
    timer.reset(false);
    device.complete_all();

    assert_relative_eq!(timer.time(false).unwrap(), 0.003, epsilon = 1e-12);
    assert_relative_eq!(timer.sum_time(false), 0.004, epsilon = 1e-12);
    assert_relative_eq!(timer.avg_time(false).unwrap(), 0.002, epsilon = 1e-12);
}

#[test]
fn lagging_results_keep_previous_value() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    measure(&device, &mut timer, 1_000);
    timer.reset(false);
    device.complete_all();
    assert_relative_eq!(timer.time(false).unwrap(), 0.001, epsilon = 1e-12);

    measure(&device, &mut timer, 5_000);
    timer.reset(false);
    assert_relative_eq!(timer.time(false).unwrap(), 0.001, epsilon = 1e-12);
}

#[test]
fn stall_waits_for_open_frame() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    measure(&device, &mut timer, 1_500);

    assert_relative_eq!(timer.time(true).unwrap(), 0.0015, epsilon = 1e-12);
    assert!(device.blocking_waits() > 0);
    assert_eq!(timer.in_flight(), 0);
}

#[test]
fn wait_idle_makes_current_frame_readable() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default().with_ring_capacity(1));

    measure(&device, &mut timer, 1_000);
    timer.wait_idle();

    assert_relative_eq!(timer.time(false).unwrap(), 0.001, epsilon = 1e-12);
    assert_eq!(timer.in_flight(), 0);
    assert_eq!(device.blocking_waits(), 0);
    // Enters the average only once the frame is closed.
    assert_eq!(timer.num_frames(false), 0);

    timer.reset(false);
    assert_eq!(timer.num_frames(false), 1);
    assert_relative_eq!(timer.time(false).unwrap(), 0.001, epsilon = 1e-12);
}

#[test]
fn disjoint_frame_is_discarded() {
    let device = MockDevice::new().with_disjoint().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    timer.start();
    device.gpu_work(1_000);
    device.inject_disjoint();
    timer.stop();
    timer.reset(false);
    device.complete_all();

    assert_eq!(timer.time(false), None);
    assert_eq!(timer.discarded(), 1);

    measure(&device, &mut timer, 2_000);
    timer.reset(false);
    device.complete_all();
    assert_relative_eq!(timer.time(false).unwrap(), 0.002, epsilon = 1e-12);
    assert_eq!(timer.num_frames(false), 1);
}

#[test]
fn disjoint_frequency_is_used() {
    let device = MockDevice::new().with_disjoint().with_frequency(2_000_000).shared();
    let mut timer = timer(&device, &TimerConfig::default());

    measure(&device, &mut timer, 4_000);
    timer.reset(false);
    device.complete_all();

    assert_relative_eq!(timer.time(false).unwrap(), 0.002, epsilon = 1e-12);
}

#[test]
fn backwards_timestamps_are_discarded() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    device.set_gpu_clock(10_000);
    timer.start();
    device.set_gpu_clock(5_000);
    timer.stop();
    timer.reset(false);
    device.complete_all();

    assert_eq!(timer.time(false), None);
    assert_eq!(timer.discarded(), 1);
}

#[test]
fn timestamps_wrap_at_valid_bits() {
    let device = MockDevice::new().with_valid_bits(16).shared();
    let mut timer = timer(&device, &TimerConfig::default());

    device.set_gpu_clock(65_000);
    measure(&device, &mut timer, 1_000);
    timer.reset(false);
    device.complete_all();

    assert_relative_eq!(timer.time(false).unwrap(), 0.001, epsilon = 1e-12);
}

#[test]
fn full_ring_stalls_by_default() {
    let device = MockDevice::new().shared();
    let config = TimerConfig::default().with_ring_capacity(2);
    let mut timer = timer(&device, &config);

    for ticks in [1_000, 2_000, 3_000] {
        measure(&device, &mut timer, ticks);
    }
    timer.reset(false);
    device.complete_all();

    assert_eq!(timer.stalls(), 1);
    assert_eq!(timer.dropped(), 0);
    assert!(device.blocking_waits() > 0);
    assert_relative_eq!(timer.time(false).unwrap(), 0.006, epsilon = 1e-12);
}

#[test]
fn stall_on_unsubmitted_slot_drops_it() {
    let device = MockDevice::new().shared();
    let config = TimerConfig::default().with_ring_capacity(2);
    let mut timer = timer(&device, &config);

    device.begin_recording();
    for ticks in [1_000, 2_000, 3_000] {
        measure(&device, &mut timer, ticks);
    }

    assert_eq!(timer.stalls(), 1);
    assert_eq!(timer.dropped(), 1);
    assert_eq!(device.blocking_waits(), 0);
    assert_eq!(timer.in_flight(), 2);

    device.submit();
    timer.reset(false);
    device.complete_all();
    assert_eq!(timer.time(false), None);
    assert_eq!(timer.in_flight(), 0);
}

#[test]
fn full_ring_can_drop_oldest() {
    let device = MockDevice::new().shared();
    let config = TimerConfig::default()
        .with_ring_capacity(2)
        .with_overflow(OverflowPolicy::DropOldest);
    let mut timer = timer(&device, &config);

    for ticks in [1_000, 2_000, 3_000] {
        measure(&device, &mut timer, ticks);
    }
    timer.reset(false);
    device.complete_all();

    assert_eq!(timer.dropped(), 1);
    assert_eq!(timer.stalls(), 0);
    assert_eq!(device.blocking_waits(), 0);
    assert_eq!(timer.time(false), None);

    measure(&device, &mut timer, 4_000);
    timer.reset(false);
    device.complete_all();
    assert_relative_eq!(timer.time(false).unwrap(), 0.004, epsilon = 1e-12);
}

#[test]
fn clear_discards_in_flight_results() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    measure(&device, &mut timer, 1_000);
    timer.reset(false);
    device.complete_all();
    assert!(timer.time(false).is_some());

    measure(&device, &mut timer, 2_000);
    timer.clear();
    device.complete_all();

    assert_eq!(timer.time(false), None);
    assert_eq!(timer.num_frames(false), 0);

    measure(&device, &mut timer, 3_000);
    timer.reset(false);
    device.complete_all();
    assert_relative_eq!(timer.time(false).unwrap(), 0.003, epsilon = 1e-12);
}

#[test]
fn sum_reset_restarts_average() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    measure(&device, &mut timer, 8_000);
    timer.reset(false);
    device.complete_all();
    timer.reset(true);
    assert_eq!(timer.num_frames(false), 0);

    measure(&device, &mut timer, 2_000);
    timer.reset(false);
    device.complete_all();
    assert_relative_eq!(timer.avg_time(false).unwrap(), 0.002, epsilon = 1e-12);
}

#[test]
fn fallback_frequency_when_device_reports_none() {
    let device = MockDevice::new().with_unknown_frequency().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    measure(&device, &mut timer, 27_000);
    timer.reset(false);
    device.complete_all();

    assert_relative_eq!(timer.time(false).unwrap(), 0.001, epsilon = 1e-12);
}

#[test]
fn failed_creation_releases_partial_ring() {
    init_tracing();
    let device = MockDevice::new().with_query_limit(3).shared();
    let config = TimerConfig::default().with_ring_capacity(2);

    let result = GpuTimer::new(device.clone(), &config);
    assert!(matches!(result, Err(ProfilerError::QueryCreation(_))));
    assert_eq!(device.live_queries(), 0);
}

#[test]
fn drop_releases_queries() {
    let device = MockDevice::new().with_disjoint().shared();
    let config = TimerConfig::default().with_ring_capacity(4);
    let timer = timer(&device, &config);

    assert_eq!(device.live_queries(), 12);
    drop(timer);
    assert_eq!(device.live_queries(), 0);
}

#[test]
fn lost_device_keeps_last_value() {
    let device = MockDevice::new().shared();
    let mut timer = timer(&device, &TimerConfig::default());

    measure(&device, &mut timer, 1_000);
    timer.reset(false);
    device.complete_all();
    assert!(timer.time(false).is_some());

    device.lose();
    measure(&device, &mut timer, 2_000);
    timer.reset(false);
    assert_relative_eq!(timer.time(false).unwrap(), 0.001, epsilon = 1e-12);
}
