//! Headless GPU context.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
///
/// Anything created from the context, including a
/// [`VulkanTimestampDevice`](crate::VulkanTimestampDevice), must be dropped
/// before the context.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<GpuAllocator>,
    pub(crate) queue_family: u32,
    pub(crate) queue: vk::Queue,
    pub(crate) timestamp_valid_bits: u32,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    #[must_use]
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Shared handle to the device, for objects that destroy themselves.
    #[must_use]
    pub fn shared_device(&self) -> Arc<ash::Device> {
        Arc::clone(&self.device)
    }

    /// Get the physical device handle.
    #[must_use]
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Get the graphics queue.
    #[must_use]
    pub const fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Get the graphics queue family index.
    #[must_use]
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Meaningful bits in timestamps written on the queue.
    #[must_use]
    pub const fn timestamp_valid_bits(&self) -> u32 {
        self.timestamp_valid_bits
    }

    /// Get the Vulkan instance handle.
    #[must_use]
    pub const fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get access to the GPU allocator.
    #[must_use]
    pub const fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Frees all VkDeviceMemory before the device goes away
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "frametime".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation) }?;

        match unsafe { Self::build_on(&entry, &instance) } {
            Ok(context) => Ok(context),
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                Err(err)
            }
        }
    }

    /// Create everything that lives on the instance.
    unsafe fn build_on(entry: &ash::Entry, instance: &ash::Instance) -> Result<GpuContext> {
        let physical_device = select_physical_device(instance)?;

        let capabilities = GpuCapabilities::query(instance, physical_device);
        if !capabilities.meets_requirements() {
            return Err(GpuError::NoSuitableDevice);
        }

        tracing::info!("Selected GPU: {}", capabilities.summary());

        let (queue_family, timestamp_valid_bits) =
            find_timestamp_queue_family(instance, physical_device)?;

        let device = Arc::new(create_device(instance, physical_device, queue_family)?);
        let queue = device.get_device_queue(queue_family, 0);

        let allocator = match GpuAllocator::new(instance, device.clone(), physical_device) {
            Ok(allocator) => allocator,
            Err(err) => {
                device.destroy_device(None);
                return Err(err);
            }
        };

        tracing::debug!(queue_family, timestamp_valid_bits, "GPU context created");

        Ok(GpuContext {
            entry: entry.clone(),
            instance: instance.clone(),
            physical_device,
            device,
            capabilities,
            allocator: Mutex::new(allocator),
            queue_family,
            queue,
            timestamp_valid_bits,
        })
    }
}

/// Find a graphics queue family that writes timestamps.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_timestamp_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<(u32, u32)> {
    let queue_families = instance.get_physical_device_queue_family_properties(physical_device);

    let graphics = queue_families
        .iter()
        .enumerate()
        .filter(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, family)| (u32::try_from(i).unwrap_or(u32::MAX), family.timestamp_valid_bits));

    let mut first_graphics = None;
    for (index, valid_bits) in graphics {
        first_graphics.get_or_insert(index);
        if valid_bits > 0 {
            return Ok((index, valid_bits));
        }
    }

    Err(first_graphics.map_or(GpuError::NoSuitableDevice, GpuError::TimestampsUnsupported))
}

/// Create the logical device with host query reset enabled.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority))];

    let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::default().host_query_reset(true);
    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_1_2_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .push_next(&mut features2);

    let device = instance.create_device(physical_device, &device_create_info, None)?;

    Ok(device)
}
