//! GPU error types.

use ash::vk;
use frametime_profiler::ProfilerError;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// The selected queue cannot write timestamps.
    #[error("Queue family {0} does not support timestamps")]
    TimestampsUnsupported(u32),

    /// Every query in the pool is in use.
    #[error("Query pool exhausted ({0} queries)")]
    PoolExhausted(u32),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

impl From<GpuError> for ProfilerError {
    fn from(err: GpuError) -> Self {
        match err {
            GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST) => Self::DeviceLost,
            GpuError::PoolExhausted(_) | GpuError::AllocationFailed(_) => {
                Self::QueryCreation(err.to_string())
            }
            other => Self::Device(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_lost_maps_to_profiler_error() {
        let err: ProfilerError = GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST).into();
        assert!(matches!(err, ProfilerError::DeviceLost));

        let err: ProfilerError = GpuError::PoolExhausted(64).into();
        assert!(matches!(err, ProfilerError::QueryCreation(_)));

        let err: ProfilerError = GpuError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY).into();
        assert!(matches!(err, ProfilerError::Device(_)));
    }
}
