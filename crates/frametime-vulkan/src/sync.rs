//! Fences and frames in flight.

use crate::command::CommandPool;
use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// Create a fence, optionally already signaled.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None)? };
    Ok(fence)
}

/// Recording resources of one frame slot.
#[derive(Debug, Clone, Copy)]
pub struct FrameSync {
    pub command_buffer: vk::CommandBuffer,
    /// Signaled when the slot's last submission finished.
    pub in_flight: vk::Fence,
}

/// Rotates recording resources across frames in flight.
///
/// Frame N reuses the slot of frame N - `frames_in_flight`, so the CPU runs
/// at most that many frames ahead of the GPU. The GPU must be idle when
/// the manager is dropped.
pub struct FrameSyncManager {
    device: Arc<ash::Device>,
    pool: CommandPool,
    frames: Vec<FrameSync>,
    current: usize,
}

impl FrameSyncManager {
    /// Create `frames_in_flight` slots (at least one) on `queue_family`.
    pub fn new(device: Arc<ash::Device>, queue_family: u32, frames_in_flight: usize) -> Result<Self> {
        let pool = CommandPool::new(device.clone(), queue_family)?;
        let count = u32::try_from(frames_in_flight.max(1)).unwrap_or(u32::MAX);

        let mut manager = Self {
            device,
            pool,
            frames: Vec::with_capacity(count as usize),
            current: 0,
        };
        // On error the partially filled manager drops and cleans up.
        for command_buffer in manager.pool.allocate(count)? {
            let in_flight = unsafe { create_fence(&manager.device, true)? };
            manager.frames.push(FrameSync {
                command_buffer,
                in_flight,
            });
        }
        Ok(manager)
    }

    /// The command pool every slot records from.
    #[must_use]
    pub const fn pool(&self) -> &CommandPool {
        &self.pool
    }

    /// The current slot, without waiting.
    #[must_use]
    pub fn current(&self) -> FrameSync {
        self.frames[self.current]
    }

    /// Wait for the current slot's previous submission, then unsignal its
    /// fence for the next one.
    pub fn acquire(&self) -> Result<FrameSync> {
        let sync = self.current();
        unsafe {
            self.device.wait_for_fences(&[sync.in_flight], true, u64::MAX)?;
            self.device.reset_fences(&[sync.in_flight])?;
        }
        Ok(sync)
    }

    /// Move on to the next slot.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames.len();
    }

    /// Number of slots.
    #[must_use]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }
}

impl Drop for FrameSyncManager {
    fn drop(&mut self) {
        for sync in &self.frames {
            unsafe { self.device.destroy_fence(sync.in_flight, None) };
        }
    }
}
