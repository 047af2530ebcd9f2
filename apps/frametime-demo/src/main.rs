//! Frametime demo.
//!
//! Runs a small frame loop and prints the timer tree every few frames. With
//! a Vulkan device available the frame records buffer fills and times them
//! with timestamp queries; otherwise only CPU timers are reported.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p frametime-demo -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `-n, --frames <N>`: Number of frames to run (default: 240)
//! - `-r, --report <N>`: Frames between reports (default: 60)
//! - `--blocking`: Measure GPU time by draining the queue around each timer
//! - `--cpu-only`: Skip Vulkan even when it is available
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod workload;

use frametime_profiler::{GpuTiming, TimerConfig, TimerTree};
use tracing_subscriber::EnvFilter;

use crate::workload::{run_cpu_frames, run_gpu_frames};

const DEFAULT_FRAMES: u32 = 240;
const DEFAULT_REPORT_INTERVAL: u32 = 60;

/// Command line options.
#[derive(Debug, Clone, Copy)]
pub struct DemoOptions {
    pub frames: u32,
    pub report_interval: u32,
    pub blocking: bool,
    pub cpu_only: bool,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            frames: DEFAULT_FRAMES,
            report_interval: DEFAULT_REPORT_INTERVAL,
            blocking: false,
            cpu_only: false,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Check for help flag before doing any setup
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = parse_args();
    let gpu_timing = if options.blocking {
        GpuTiming::Blocking
    } else {
        GpuTiming::Queries
    };
    let mut tree = TimerTree::with_config(TimerConfig::new().with_gpu_timing(gpu_timing));

    if !options.cpu_only {
        match frametime_vulkan::GpuContextBuilder::new()
            .app_name("frametime-demo")
            .build()
        {
            Ok(context) => return run_gpu_frames(&context, &mut tree, options),
            Err(err) => tracing::warn!("Vulkan unavailable, timing CPU only: {err}"),
        }
    }

    run_cpu_frames(&mut tree, options);
    Ok(())
}

fn parse_args() -> DemoOptions {
    let args: Vec<String> = std::env::args().collect();
    let mut options = DemoOptions::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--frames" | "-n" => {
                if let Some(frames) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                    options.frames = frames;
                    i += 1;
                }
            }
            "--report" | "-r" => {
                if let Some(interval) = args.get(i + 1).and_then(|v| v.parse::<u32>().ok()) {
                    options.report_interval = interval.max(1);
                    i += 1;
                }
            }
            "--blocking" => options.blocking = true,
            "--cpu-only" => options.cpu_only = true,
            other => eprintln!("Ignoring unknown argument: {other}"),
        }
        i += 1;
    }

    options
}

fn print_help() {
    eprintln!(
        "Frametime demo

USAGE:
    cargo run -p frametime-demo -- [OPTIONS]

OPTIONS:
    -n, --frames <N>    Number of frames to run (default: {DEFAULT_FRAMES})
    -r, --report <N>    Frames between reports (default: {DEFAULT_REPORT_INTERVAL})
    --blocking          Drain the GPU around each timer instead of using queries
    --cpu-only          Skip Vulkan even when it is available
    -h, --help          Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG            Set log level (e.g., info, debug, trace)"
    );
}
