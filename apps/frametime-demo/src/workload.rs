//! Frame loops driven by the demo.

use std::hint::black_box;
use std::sync::Arc;

use ash::vk;
use frametime_profiler::{profile_scope, TimerKind, TimerTree, TimestampDevice};
use frametime_vulkan::{BufferDesc, FrameSyncManager, GpuBuffer, GpuContext, VulkanTimestampDevice};

use crate::DemoOptions;

const FRAMES_IN_FLIGHT: usize = 2;
const QUERY_POOL_SIZE: u32 = 512;
const SCRATCH_SIZE: u64 = 64 * 1024 * 1024;
const FILL_PASSES: usize = 3;

/// Burn a little CPU time so the timers have something to show.
fn simulate_cpu_work(iterations: u64) -> u64 {
    (0..iterations).fold(0u64, |acc, i| black_box(acc.wrapping_mul(31).wrapping_add(i)))
}

fn report(tree: &mut TimerTree, frame: u32) {
    let snapshot = tree.snapshot(false);
    tracing::info!("Frame {frame}\n{snapshot}");
}

/// Run the demo without a GPU.
pub fn run_cpu_frames(tree: &mut TimerTree, options: DemoOptions) {
    tree.init(None);

    for frame in 0..options.frames {
        let report_due = frame > 0 && frame % options.report_interval == 0;
        if report_due {
            report(tree, frame);
        }
        tree.reset(report_due);

        profile_scope!(tree, "Frame");
        {
            profile_scope!(tree, "Update");
            black_box(simulate_cpu_work(200_000));
        }
        {
            profile_scope!(tree, "Render");
            for pass in 0..FILL_PASSES {
                tree.start(&format!("Pass {pass}"));
                black_box(simulate_cpu_work(50_000 * (pass as u64 + 1)));
                tree.stop();
            }
        }
    }

    report(tree, options.frames);
}

/// Run the demo on a Vulkan device, timing buffer fills on the GPU.
pub fn run_gpu_frames(
    context: &GpuContext,
    tree: &mut TimerTree,
    options: DemoOptions,
) -> anyhow::Result<()> {
    let timestamps = Arc::new(VulkanTimestampDevice::new(context, QUERY_POOL_SIZE)?);
    let mut syncs =
        FrameSyncManager::new(context.shared_device(), context.queue_family(), FRAMES_IN_FLIGHT)?;
    let scratch = context
        .allocator()
        .lock()
        .create_buffer(&BufferDesc::scratch("demo scratch", SCRATCH_SIZE))?;

    let shared: Arc<dyn TimestampDevice> = timestamps.clone();
    tree.init(Some(shared));

    let result = record_frames(context, tree, &timestamps, &mut syncs, &scratch, options);

    // Queries, command buffers and memory must go before the context does.
    context.wait_idle()?;
    tree.destroy();
    drop(timestamps);
    drop(syncs);
    context.allocator().lock().free_buffer(scratch)?;

    result
}

fn record_frames(
    context: &GpuContext,
    tree: &mut TimerTree,
    timestamps: &VulkanTimestampDevice,
    syncs: &mut FrameSyncManager,
    scratch: &GpuBuffer,
    options: DemoOptions,
) -> anyhow::Result<()> {
    let device = context.device();

    for frame in 0..options.frames {
        let sync = syncs.acquire()?;
        let cmd = sync.command_buffer;

        unsafe {
            syncs.pool().begin_one_shot(cmd)?;
            timestamps.set_command_buffer(cmd);
        }

        let report_due = frame > 0 && frame % options.report_interval == 0;
        if report_due {
            report(tree, frame);
        }
        tree.reset(report_due);

        {
            profile_scope!(tree, "Frame");
            {
                profile_scope!(tree, "Clear");
                unsafe { device.cmd_fill_buffer(cmd, scratch.handle(), 0, vk::WHOLE_SIZE, 0) };
            }
            {
                profile_scope!(tree, "Passes");
                for pass in 0..FILL_PASSES {
                    tree.start(&format!("Pass {pass}"));
                    let bytes = scratch.size() / FILL_PASSES as u64 * (pass as u64 + 1);
                    unsafe {
                        device.cmd_fill_buffer(cmd, scratch.handle(), 0, bytes & !3, 0xdead_beef);
                    }
                    tree.stop();
                }
            }
        }

        unsafe { syncs.pool().submit(cmd, context.queue(), sync.in_flight)? };
        timestamps.mark_submitted();
        syncs.advance();

        if frame + 1 == options.frames {
            if let Some(seconds) = tree.wait_for_gpu_time("Frame") {
                tracing::info!("Last frame took {:.3} ms on the GPU", seconds * 1000.0);
            }
        }
    }

    let cpu_avg = tree.avg_time(TimerKind::Cpu, "Frame", false).unwrap_or_default();
    tracing::info!("Average CPU frame time {:.3} ms", cpu_avg * 1000.0);
    report(tree, options.frames);
    Ok(())
}
