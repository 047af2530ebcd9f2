//! Blocking GPU timer against the simulated device.

use std::sync::Arc;

use approx::assert_relative_eq;
use frametime_profiler::{GpuCpuTimer, ManualClock, Timer, TimerKind};
use frametime_test::MockDevice;

fn blocking_timer() -> (GpuCpuTimer, Arc<MockDevice>) {
    let clock = Arc::new(ManualClock::new());
    let device = MockDevice::new().with_host_clock(clock.clone()).shared();
    let timer = GpuCpuTimer::with_clock(device.clone(), clock);
    (timer, device)
}

#[test]
fn measures_gpu_work_between_drains() {
    let (mut timer, device) = blocking_timer();

    device.gpu_work(7_000);
    timer.start();
    device.gpu_work(3_000);
    timer.stop();

    assert_relative_eq!(timer.time(), 0.003, epsilon = 1e-12);
    assert_eq!(device.drains(), 2);
    assert_eq!(device.pending_commands(), 0);
}

#[test]
fn value_is_available_right_after_stop() {
    let (timer, device) = blocking_timer();
    let mut timer = Timer::GpuCpu(timer);

    timer.start();
    device.gpu_work(1_000);
    timer.stop();

    assert_eq!(timer.kind(), TimerKind::GpuCpu);
    assert_relative_eq!(timer.time(false).unwrap(), 0.001, epsilon = 1e-12);
    assert_eq!(device.blocking_waits(), 0);
}

#[test]
fn frames_accumulate_into_average() {
    let (mut timer, device) = blocking_timer();

    for ticks in [2_000, 4_000] {
        timer.start();
        device.gpu_work(ticks);
        timer.stop();
        timer.reset(false);
    }

    assert_eq!(timer.num_frames(), 2);
    assert_relative_eq!(timer.sum_time(), 0.006, epsilon = 1e-12);
    assert_relative_eq!(timer.avg_time(), 0.003, epsilon = 1e-12);

    timer.clear();
    assert_eq!(timer.num_frames(), 0);
}

#[test]
fn lost_device_still_stops() {
    let (mut timer, device) = blocking_timer();
    timer.start();
    device.lose();
    timer.stop();

    assert_relative_eq!(timer.time(), 0.0, epsilon = 1e-12);
}
