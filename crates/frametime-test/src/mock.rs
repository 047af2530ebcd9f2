//! Simulated GPU command stream.
//!
//! Commands recorded through [`TimestampDevice`] get increasing sequence
//! numbers. Nothing executes until the test says so with
//! [`MockDevice::complete_all`], a blocking `get_data`, or `drain`, which
//! lets tests control exactly how far the GPU lags behind the CPU.
//! [`MockDevice::gpu_work`] stands in for draw calls: it advances the GPU
//! clock that the next timestamp will read.

use std::collections::HashMap;
use std::sync::Arc;

use frametime_profiler::{
    DisjointData, ManualClock, ProfilerError, QueryData, QueryHandle, QueryKind, Result,
    TimestampDevice,
};
use parking_lot::Mutex;

/// Tick rate of a default mock device: one tick per microsecond.
pub const MOCK_FREQUENCY: u64 = 1_000_000;

#[derive(Debug)]
struct MockQuery {
    kind: QueryKind,
    // Command sequence number of the last write, `None` if never written.
    seq: Option<u64>,
    ticks: u64,
    open: bool,
    disjoint: bool,
}

#[derive(Debug, Default)]
struct MockState {
    queries: HashMap<u32, MockQuery>,
    next_handle: u32,
    next_seq: u64,
    // Commands with a sequence number below this have executed.
    completed: u64,
    cursor: u64,
    executed_cursor: u64,
    created: u64,
    released: u64,
    drains: u64,
    blocking_waits: u64,
    // Commands from this sequence number on sit in an unsubmitted
    // command list; blocking reads of them give up instead of waiting.
    recording_from: Option<u64>,
    lost: bool,
}

/// In-memory [`TimestampDevice`] for tests.
pub struct MockDevice {
    state: Mutex<MockState>,
    frequency: u64,
    static_frequency: bool,
    disjoint: bool,
    valid_bits: u32,
    query_limit: Option<usize>,
    host_clock: Option<Arc<ManualClock>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// A device with a static 1 MHz timestamp clock and no disjoint queries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            frequency: MOCK_FREQUENCY,
            static_frequency: true,
            disjoint: false,
            valid_bits: 64,
            query_limit: None,
            host_clock: None,
        }
    }

    /// Report the frequency through disjoint queries instead of statically.
    #[must_use]
    pub const fn with_disjoint(mut self) -> Self {
        self.disjoint = true;
        self
    }

    #[must_use]
    pub const fn with_frequency(mut self, frequency: u64) -> Self {
        self.frequency = frequency;
        self
    }

    /// Keep the tick rate to itself, like drivers that only expose it
    /// through disjoint queries.
    #[must_use]
    pub const fn with_unknown_frequency(mut self) -> Self {
        self.static_frequency = false;
        self
    }

    /// Timestamps wrap after `bits` bits.
    #[must_use]
    pub const fn with_valid_bits(mut self, bits: u32) -> Self {
        self.valid_bits = bits;
        self
    }

    /// Fail query creation once `limit` queries are alive.
    #[must_use]
    pub const fn with_query_limit(mut self, limit: usize) -> Self {
        self.query_limit = Some(limit);
        self
    }

    /// Advance `clock` by the GPU time a drain waits for.
    #[must_use]
    pub fn with_host_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.host_clock = Some(clock);
        self
    }

    /// Wrap in an `Arc` for handing to timers.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Record `ticks` of GPU work into the command stream.
    pub fn gpu_work(&self, ticks: u64) {
        self.state.lock().cursor += ticks;
    }

    /// Set the GPU clock read by the next timestamp, possibly backwards.
    pub fn set_gpu_clock(&self, ticks: u64) {
        let mut state = self.state.lock();
        state.cursor = ticks;
        state.executed_cursor = state.executed_cursor.min(ticks);
    }

    /// Execute everything recorded so far.
    pub fn complete_all(&self) {
        let mut state = self.state.lock();
        state.completed = state.next_seq;
        state.executed_cursor = state.cursor;
    }

    /// Start an unsubmitted command list. Until [`Self::submit`], blocking
    /// reads of commands recorded from here on return no data, as a real
    /// device cannot finish work it was never handed.
    pub fn begin_recording(&self) {
        let mut state = self.state.lock();
        state.recording_from = Some(state.next_seq);
    }

    /// Hand the open command list to the GPU.
    pub fn submit(&self) {
        self.state.lock().recording_from = None;
    }

    /// Flag every open disjoint query as having seen a clock discontinuity.
    pub fn inject_disjoint(&self) {
        let mut state = self.state.lock();
        for query in state.queries.values_mut() {
            if query.kind == QueryKind::Disjoint && query.open {
                query.disjoint = true;
            }
        }
    }

    /// Make every further call fail with [`ProfilerError::DeviceLost`].
    pub fn lose(&self) {
        self.state.lock().lost = true;
    }

    /// Queries created and not yet released.
    #[must_use]
    pub fn live_queries(&self) -> usize {
        self.state.lock().queries.len()
    }

    #[must_use]
    pub fn created_queries(&self) -> u64 {
        self.state.lock().created
    }

    #[must_use]
    pub fn released_queries(&self) -> u64 {
        self.state.lock().released
    }

    /// Recorded commands the GPU has not executed yet.
    #[must_use]
    pub fn pending_commands(&self) -> u64 {
        let state = self.state.lock();
        state.next_seq - state.completed
    }

    #[must_use]
    pub fn drains(&self) -> u64 {
        self.state.lock().drains
    }

    /// `get_data` calls that had to block.
    #[must_use]
    pub fn blocking_waits(&self) -> u64 {
        self.state.lock().blocking_waits
    }

    const fn valid_mask(&self) -> u64 {
        if self.valid_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.valid_bits) - 1
        }
    }

    fn advance_host(&self, ticks: u64) {
        if let Some(clock) = &self.host_clock {
            let micros = u128::from(ticks) * 1_000_000 / u128::from(self.frequency.max(1));
            clock.advance_micros(u64::try_from(micros).unwrap_or(u64::MAX));
        }
    }
}

impl TimestampDevice for MockDevice {
    fn create_query(&self, kind: QueryKind) -> Result<QueryHandle> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(ProfilerError::DeviceLost);
        }
        if kind == QueryKind::Disjoint && !self.disjoint {
            return Err(ProfilerError::Unsupported(kind));
        }
        if self
            .query_limit
            .is_some_and(|limit| state.queries.len() >= limit)
        {
            return Err(ProfilerError::QueryCreation("query heap exhausted".into()));
        }

        let handle = state.next_handle;
        state.next_handle += 1;
        state.created += 1;
        state.queries.insert(
            handle,
            MockQuery {
                kind,
                seq: None,
                ticks: 0,
                open: false,
                disjoint: false,
            },
        );
        Ok(QueryHandle(handle))
    }

    fn release_query(&self, query: QueryHandle) {
        let mut state = self.state.lock();
        if state.queries.remove(&query.0).is_some() {
            state.released += 1;
        } else {
            tracing::warn!(query = query.0, "Released unknown mock query");
        }
    }

    fn begin(&self, query: QueryHandle) -> Result<()> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(ProfilerError::DeviceLost);
        }
        let entry = state
            .queries
            .get_mut(&query.0)
            .ok_or(ProfilerError::UnknownQuery(query.0))?;
        if entry.kind != QueryKind::Disjoint {
            return Err(ProfilerError::Device("timestamp queries have no begin".into()));
        }
        entry.open = true;
        entry.disjoint = false;
        entry.seq = None;
        Ok(())
    }

    fn end(&self, query: QueryHandle) -> Result<()> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(ProfilerError::DeviceLost);
        }
        let seq = state.next_seq;
        let cursor = state.cursor;
        let entry = state
            .queries
            .get_mut(&query.0)
            .ok_or(ProfilerError::UnknownQuery(query.0))?;
        match entry.kind {
            QueryKind::Timestamp => entry.ticks = cursor,
            QueryKind::Disjoint => {
                if !entry.open {
                    return Err(ProfilerError::Device("disjoint query ended before begin".into()));
                }
                entry.open = false;
            }
        }
        entry.seq = Some(seq);
        state.next_seq += 1;
        Ok(())
    }

    fn get_data(&self, query: QueryHandle, wait: bool) -> Result<Option<QueryData>> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(ProfilerError::DeviceLost);
        }
        let entry = state
            .queries
            .get(&query.0)
            .ok_or(ProfilerError::UnknownQuery(query.0))?;
        let Some(seq) = entry.seq else {
            return Ok(None);
        };
        let data = match entry.kind {
            QueryKind::Timestamp => QueryData::Timestamp(entry.ticks & self.valid_mask()),
            QueryKind::Disjoint => QueryData::Disjoint(DisjointData {
                frequency: self.frequency,
                disjoint: entry.disjoint,
            }),
        };
        let (kind, ticks) = (entry.kind, entry.ticks);

        if seq >= state.completed {
            if !wait || state.recording_from.is_some_and(|from| seq >= from) {
                return Ok(None);
            }
            state.blocking_waits += 1;
            state.completed = seq + 1;
            if kind == QueryKind::Timestamp {
                state.executed_cursor = state.executed_cursor.max(ticks);
            }
        }
        Ok(Some(data))
    }

    fn drain(&self) -> Result<()> {
        let waited = {
            let mut state = self.state.lock();
            if state.lost {
                return Err(ProfilerError::DeviceLost);
            }
            state.drains += 1;
            state.completed = state.next_seq;
            let waited = state.cursor.saturating_sub(state.executed_cursor);
            state.executed_cursor = state.cursor;
            waited
        };
        self.advance_host(waited);
        Ok(())
    }

    fn supports_disjoint(&self) -> bool {
        self.disjoint
    }

    fn timestamp_frequency(&self) -> Option<u64> {
        (self.static_frequency && !self.disjoint).then_some(self.frequency)
    }

    fn timestamp_valid_bits(&self) -> u32 {
        self.valid_bits
    }
}
