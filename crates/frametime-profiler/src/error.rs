//! Error types for the profiler.

use thiserror::Error;

use crate::device::QueryKind;

/// Profiler-wide error type.
///
/// None of these abort profiling: timers log them and fall back to
/// CPU-only or stale data.
#[derive(Error, Debug)]
pub enum ProfilerError {
    /// The device could not allocate a query.
    #[error("Query creation failed: {0}")]
    QueryCreation(String),

    /// The device has no support for this kind of query.
    #[error("Query kind not supported by device: {0:?}")]
    Unsupported(QueryKind),

    /// The query handle does not belong to this device.
    #[error("Unknown query handle: {0}")]
    UnknownQuery(u32),

    /// Backend failure while recording or reading a query.
    #[error("Device error: {0}")]
    Device(String),

    /// The device was lost; no further results will arrive.
    #[error("Device lost")]
    DeviceLost,
}

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, ProfilerError>;
