//! Buffer memory through `gpu-allocator`.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocationSizes, AllocatorDebugSettings, MemoryLocation};
use std::sync::Arc;

/// Parameters for a new buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub name: &'a str,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
}

impl<'a> BufferDesc<'a> {
    /// Device-local buffer written only by transfer commands.
    #[must_use]
    pub const fn scratch(name: &'a str, size: u64) -> Self {
        Self {
            name,
            size,
            usage: vk::BufferUsageFlags::TRANSFER_DST,
            location: MemoryLocation::GpuOnly,
        }
    }
}

/// A buffer bound to its own allocation.
pub struct GpuBuffer {
    buffer: vk::Buffer,
    allocation: Allocation,
    size: u64,
}

impl GpuBuffer {
    #[must_use]
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }
}

/// Owns the sub-allocator for one device.
///
/// Buffers must be handed back through [`GpuAllocator::free_buffer`];
/// anything still live at shutdown is reported and its memory released
/// with the allocator.
pub struct GpuAllocator {
    device: Arc<ash::Device>,
    inner: Option<Allocator>,
    live_buffers: usize,
}

impl GpuAllocator {
    /// # Safety
    /// The instance, device and physical device must be valid and outlive
    /// the allocator.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let inner = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: AllocatorDebugSettings {
                log_leaks_on_shutdown: true,
                ..Default::default()
            },
            buffer_device_address: false,
            allocation_sizes: AllocationSizes::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            device,
            inner: Some(inner),
            live_buffers: 0,
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.inner
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("allocator already shut down".to_string()))
    }

    /// Create a buffer and bind fresh memory to it.
    pub fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<GpuBuffer> {
        let info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocated = self.inner().and_then(|inner| {
            inner
                .allocate(&AllocationCreateDesc {
                    name: desc.name,
                    requirements,
                    location: desc.location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))
        });
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(err) = bound {
            unsafe { self.device.destroy_buffer(buffer, None) };
            let _ = self.inner().map(|inner| inner.free(allocation));
            return Err(err.into());
        }

        self.live_buffers += 1;
        tracing::debug!(name = desc.name, size = desc.size, "Created buffer");

        Ok(GpuBuffer {
            buffer,
            allocation,
            size: desc.size,
        })
    }

    /// Destroy a buffer and return its memory.
    ///
    /// The GPU must be done with the buffer.
    pub fn free_buffer(&mut self, buffer: GpuBuffer) -> Result<()> {
        unsafe { self.device.destroy_buffer(buffer.buffer, None) };
        self.live_buffers = self.live_buffers.saturating_sub(1);
        self.inner()?
            .free(buffer.allocation)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    /// Buffers created and not yet freed.
    #[must_use]
    pub const fn live_buffers(&self) -> usize {
        self.live_buffers
    }

    /// Release all device memory. Must run before the device is destroyed.
    pub fn shutdown(&mut self) {
        if self.inner.is_none() {
            return;
        }
        if self.live_buffers > 0 {
            tracing::warn!(count = self.live_buffers, "Buffers still live at allocator shutdown");
        }
        self.inner = None;
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
