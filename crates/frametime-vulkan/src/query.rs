//! Timestamp queries on a Vulkan query pool.
//!
//! Every timer query maps to one slot of a single `VK_QUERY_TYPE_TIMESTAMP`
//! pool. Timestamps are written into whichever command buffer is currently
//! bound with [`VulkanTimestampDevice::set_command_buffer`]. Vulkan has no
//! disjoint queries; the tick rate comes from the device's timestamp period.
//!
//! Call [`VulkanTimestampDevice::mark_submitted`] once the bound command
//! buffer has been submitted. Until then, blocking reads of timestamps
//! written into it return no data instead of waiting on work the GPU was
//! never given. A slot reused before its previous result was read may
//! report that older result once.

use std::sync::Arc;

use ash::vk;
use frametime_profiler::{
    ProfilerError, QueryData, QueryHandle, QueryKind, Result as ProfilerResult, TimestampDevice,
};
use parking_lot::Mutex;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};

/// Lifecycle of one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Reset, ready for a write.
    Idle,
    /// A write was recorded during the given binding and may still be
    /// pending on the GPU.
    Recorded { binding: u64 },
    /// The write executed and its result was read.
    Available,
}

struct QueryState {
    free: Vec<u32>,
    slots: Vec<SlotState>,
    command_buffer: vk::CommandBuffer,
    // Bumped by every `set_command_buffer`.
    binding: u64,
    // The bound command buffer has not been submitted yet.
    recording: bool,
}

impl QueryState {
    fn new(capacity: u32) -> Self {
        Self {
            free: (0..capacity).rev().collect(),
            slots: vec![SlotState::Idle; capacity as usize],
            command_buffer: vk::CommandBuffer::null(),
            binding: 0,
            recording: false,
        }
    }

    fn bind(&mut self, cmd: vk::CommandBuffer) {
        self.command_buffer = cmd;
        self.binding += 1;
        self.recording = cmd != vk::CommandBuffer::null();
    }

    /// Whether the slot's last write is only in the unsubmitted command buffer.
    fn awaits_submission(&self, slot: usize) -> bool {
        self.recording
            && matches!(self.slots[slot], SlotState::Recorded { binding } if binding == self.binding)
    }
}

/// [`TimestampDevice`] backed by a Vulkan timestamp query pool.
pub struct VulkanTimestampDevice {
    device: Arc<ash::Device>,
    queue: vk::Queue,
    pool: vk::QueryPool,
    capacity: u32,
    frequency: Option<u64>,
    valid_bits: u32,
    state: Mutex<QueryState>,
}

impl VulkanTimestampDevice {
    /// Create a pool of `capacity` timestamp queries on the context's queue.
    ///
    /// Each GPU timer needs two queries per ring slot.
    pub fn new(context: &GpuContext, capacity: u32) -> Result<Self> {
        let capacity = capacity.max(2);
        let device = context.device.clone();

        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(capacity);
        let pool = unsafe { device.create_query_pool(&create_info, None)? };
        unsafe { device.reset_query_pool(pool, 0, capacity) };

        tracing::debug!(
            capacity,
            valid_bits = context.timestamp_valid_bits,
            "Created timestamp query pool"
        );

        Ok(Self {
            device,
            queue: context.queue,
            pool,
            capacity,
            frequency: context.capabilities.timestamp_frequency(),
            valid_bits: context.timestamp_valid_bits,
            state: Mutex::new(QueryState::new(capacity)),
        })
    }

    /// Bind the command buffer timestamps are written into.
    ///
    /// # Safety
    /// `cmd` must belong to the context's device and be in the recording
    /// state whenever a timer starts or stops, outside any render pass.
    pub unsafe fn set_command_buffer(&self, cmd: vk::CommandBuffer) {
        self.state.lock().bind(cmd);
    }

    /// Note that the bound command buffer has been submitted, so blocking
    /// reads of its timestamps may wait for them.
    pub fn mark_submitted(&self) {
        self.state.lock().recording = false;
    }

    /// Number of queries in the pool.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Queries not currently handed out.
    #[must_use]
    pub fn free_queries(&self) -> usize {
        self.state.lock().free.len()
    }

    fn slot(&self, query: QueryHandle) -> ProfilerResult<usize> {
        if query.0 < self.capacity {
            Ok(query.0 as usize)
        } else {
            Err(ProfilerError::UnknownQuery(query.0))
        }
    }
}

impl TimestampDevice for VulkanTimestampDevice {
    fn create_query(&self, kind: QueryKind) -> ProfilerResult<QueryHandle> {
        if kind != QueryKind::Timestamp {
            return Err(ProfilerError::Unsupported(kind));
        }
        self.state
            .lock()
            .free
            .pop()
            .map(QueryHandle)
            .ok_or_else(|| GpuError::PoolExhausted(self.capacity).into())
    }

    fn release_query(&self, query: QueryHandle) {
        let Ok(slot) = self.slot(query) else {
            tracing::warn!(query = query.0, "Released query outside the pool");
            return;
        };
        let mut state = self.state.lock();
        if state.slots[slot] == SlotState::Available {
            unsafe { self.device.reset_query_pool(self.pool, query.0, 1) };
            state.slots[slot] = SlotState::Idle;
        }
        state.free.push(query.0);
    }

    fn begin(&self, _query: QueryHandle) -> ProfilerResult<()> {
        Err(ProfilerError::Unsupported(QueryKind::Disjoint))
    }

    fn end(&self, query: QueryHandle) -> ProfilerResult<()> {
        let slot = self.slot(query)?;
        let mut state = self.state.lock();
        let cmd = state.command_buffer;
        if cmd == vk::CommandBuffer::null() {
            return Err(GpuError::InvalidState("no command buffer bound".to_string()).into());
        }

        unsafe {
            match state.slots[slot] {
                SlotState::Idle => {}
                // Finished on the GPU, so the host may reset it.
                SlotState::Available => self.device.reset_query_pool(self.pool, query.0, 1),
                // Possibly still pending; reset in stream order.
                SlotState::Recorded { .. } => {
                    self.device.cmd_reset_query_pool(cmd, self.pool, query.0, 1);
                }
            }
            self.device.cmd_write_timestamp(
                cmd,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                self.pool,
                query.0,
            );
        }
        let binding = state.binding;
        state.slots[slot] = SlotState::Recorded { binding };
        Ok(())
    }

    fn get_data(&self, query: QueryHandle, wait: bool) -> ProfilerResult<Option<QueryData>> {
        let slot = self.slot(query)?;
        {
            let state = self.state.lock();
            if state.slots[slot] == SlotState::Idle {
                return Ok(None);
            }
            if wait && state.awaits_submission(slot) {
                tracing::debug!(query = query.0, "Not waiting on unsubmitted timestamp");
                return Ok(None);
            }
        }

        let mut flags = vk::QueryResultFlags::TYPE_64;
        if wait {
            flags |= vk::QueryResultFlags::WAIT;
        }
        let mut ticks = [0u64; 1];
        let result =
            unsafe { self.device.get_query_pool_results(self.pool, query.0, &mut ticks, flags) };

        match result {
            Ok(()) => {
                let mut state = self.state.lock();
                if matches!(state.slots[slot], SlotState::Recorded { .. }) {
                    state.slots[slot] = SlotState::Available;
                }
                Ok(Some(QueryData::Timestamp(ticks[0])))
            }
            Err(vk::Result::NOT_READY) => Ok(None),
            Err(err) => Err(GpuError::from(err).into()),
        }
    }

    fn drain(&self) -> ProfilerResult<()> {
        unsafe { self.device.queue_wait_idle(self.queue) }
            .map_err(|err| GpuError::from(err).into())
    }

    fn supports_disjoint(&self) -> bool {
        false
    }

    fn timestamp_frequency(&self) -> Option<u64> {
        self.frequency
    }

    fn timestamp_valid_bits(&self) -> u32 {
        self.valid_bits
    }
}

impl Drop for VulkanTimestampDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.queue_wait_idle(self.queue);
            self.device.destroy_query_pool(self.pool, None);
        }
    }
}
