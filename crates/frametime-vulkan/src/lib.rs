//! Vulkan backend for frametime.
//!
//! This crate provides:
//! - A headless Vulkan context with host query reset enabled
//! - Timing capability detection
//! - [`VulkanTimestampDevice`], a [`frametime_profiler::TimestampDevice`]
//!   on a timestamp query pool
//! - Command pool, frames-in-flight and buffer helpers for driving a
//!   frame loop

pub mod capabilities;
pub mod command;
pub mod context;
pub mod error;
pub mod instance;
pub mod memory;
pub mod query;
pub mod sync;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use memory::{BufferDesc, GpuAllocator, GpuBuffer};
pub use query::VulkanTimestampDevice;
pub use sync::{create_fence, FrameSync, FrameSyncManager};
