//! GPU capability detection.

use ash::vk;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    #[must_use]
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Timing-related capabilities of a physical device.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,
    /// Nanoseconds per timestamp tick
    pub timestamp_period: f32,
    /// Timestamps are supported on all graphics and compute queues
    pub timestamp_compute_and_graphics: bool,
    /// `vkResetQueryPool` may be called from the host (VK 1.2 core)
    pub supports_host_query_reset: bool,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);

        let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::default();
        let mut features2 =
            vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_1_2_features);
        instance.get_physical_device_features2(physical_device, &mut features2);
        let supports_host_query_reset = vulkan_1_2_features.host_query_reset == vk::TRUE;

        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            timestamp_period: properties.limits.timestamp_period,
            timestamp_compute_and_graphics: properties.limits.timestamp_compute_and_graphics
                == vk::TRUE,
            supports_host_query_reset,
        }
    }

    /// Timestamp ticks per second, `None` if the device reports no period.
    #[must_use]
    pub fn timestamp_frequency(&self) -> Option<u64> {
        (self.timestamp_period > 0.0)
            .then(|| (1.0e9 / f64::from(self.timestamp_period)).round() as u64)
    }

    /// Check if the GPU can run the timestamp backend.
    #[must_use]
    pub fn meets_requirements(&self) -> bool {
        let api_major = vk::api_version_major(self.api_version);
        let api_minor = vk::api_version_minor(self.api_version);

        if api_major < 1 || (api_major == 1 && api_minor < 2) {
            return false;
        }

        self.supports_host_query_reset && self.timestamp_frequency().is_some()
    }

    /// Get a human-readable summary of capabilities.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - timestamp period {} ns",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.timestamp_period,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(period: f32) -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Nvidia,
            device_name: "test".to_string(),
            api_version: vk::API_VERSION_1_2,
            driver_version: 0,
            timestamp_period: period,
            timestamp_compute_and_graphics: true,
            supports_host_query_reset: true,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn frequency_from_timestamp_period() {
        assert_eq!(capabilities(1.0).timestamp_frequency(), Some(1_000_000_000));
        assert_eq!(capabilities(40.0).timestamp_frequency(), Some(25_000_000));
        assert_eq!(capabilities(0.0).timestamp_frequency(), None);
    }

    #[test]
    fn requirements_need_host_query_reset() {
        assert!(capabilities(1.0).meets_requirements());

        let mut caps = capabilities(1.0);
        caps.supports_host_query_reset = false;
        assert!(!caps.meets_requirements());

        let mut caps = capabilities(1.0);
        caps.api_version = vk::API_VERSION_1_1;
        assert!(!caps.meets_requirements());
    }
}
