//! GPU query capability consumed by the GPU timers.
//!
//! The profiler never talks to a graphics API directly. A backend exposes
//! the handful of operations below and the timers drive them: write
//! timestamps into the command stream, optionally bracket them with a
//! disjoint query, then poll (or block) for the results frames later.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kinds of GPU queries the timers allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryKind {
    /// A single timestamp written when the GPU reaches the marker.
    Timestamp,
    /// Brackets a span and reports the tick frequency plus whether the
    /// clock was discontinuous inside it.
    Disjoint,
}

/// Opaque handle to a device query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub u32);

/// Result of a completed disjoint query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisjointData {
    /// Timestamp ticks per second over the bracketed span.
    pub frequency: u64,
    /// The GPU clock was interrupted (power state change, reset, ...).
    pub disjoint: bool,
}

/// Result of a completed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryData {
    /// Raw tick value of a timestamp query.
    Timestamp(u64),
    /// Disjoint query result.
    Disjoint(DisjointData),
}

/// A GPU command stream able to record and resolve timing queries.
///
/// All methods take `&self`: backends hold their mutable state behind a
/// lock, the way a device handle is shared between subsystems.
pub trait TimestampDevice: Send + Sync {
    /// Allocate a query of the given kind.
    fn create_query(&self, kind: QueryKind) -> Result<QueryHandle>;

    /// Return a query to the device. The handle must not be used afterwards.
    fn release_query(&self, query: QueryHandle);

    /// Open a disjoint query. Timestamp queries have no begin.
    fn begin(&self, query: QueryHandle) -> Result<()>;

    /// Write a timestamp, or close a disjoint query.
    fn end(&self, query: QueryHandle) -> Result<()>;

    /// Fetch a query result.
    ///
    /// Returns `Ok(None)` while the GPU has not reached the query. When
    /// `wait` is set the call blocks until the result is available.
    fn get_data(&self, query: QueryHandle, wait: bool) -> Result<Option<QueryData>>;

    /// Submit a synchronization marker and block until the GPU has
    /// executed all previously submitted work.
    fn drain(&self) -> Result<()>;

    /// Whether [`QueryKind::Disjoint`] queries are available.
    fn supports_disjoint(&self) -> bool;

    /// Static timestamp frequency in ticks per second, if the device knows it.
    fn timestamp_frequency(&self) -> Option<u64>;

    /// Number of meaningful bits in a timestamp value.
    fn timestamp_valid_bits(&self) -> u32 {
        64
    }
}
