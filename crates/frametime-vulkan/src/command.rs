//! Command pools and one-shot recording.

use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// A command pool whose buffers are reset one at a time.
///
/// Destroyed on drop; the GPU must be done with every buffer from it by then.
pub struct CommandPool {
    device: Arc<ash::Device>,
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool on `queue_family`.
    pub fn new(device: Arc<ash::Device>, queue_family: u32) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { device.create_command_pool(&info, None)? };
        Ok(Self { device, pool })
    }

    #[must_use]
    pub const fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocate `count` primary command buffers.
    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        Ok(unsafe { self.device.allocate_command_buffers(&info)? })
    }

    /// Reset `cmd` and start recording it for a single submit.
    ///
    /// # Safety
    /// `cmd` must come from this pool and must not be pending on the GPU.
    pub unsafe fn begin_one_shot(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            self.device.begin_command_buffer(cmd, &begin_info)?;
        }
        Ok(())
    }

    /// Finish recording `cmd` and submit it, signaling `fence` on completion.
    ///
    /// # Safety
    /// `cmd` must be recording, `queue` must belong to this pool's family,
    /// and `fence` must be unsignaled.
    pub unsafe fn submit(
        &self,
        cmd: vk::CommandBuffer,
        queue: vk::Queue,
        fence: vk::Fence,
    ) -> Result<()> {
        let command_buffers = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device.end_command_buffer(cmd)?;
            self.device.queue_submit(queue, &[submit], fence)?;
        }
        Ok(())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}
