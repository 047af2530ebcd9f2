//! Non-blocking GPU timestamp timer.
//!
//! Each start/stop pair occupies one slot of a fixed ring of query
//! records. Results are collected oldest-first with non-blocking polls,
//! so the reported value typically lags a few frames behind submission.
//! Slots issued between two resets belong to the same frame and their
//! durations are summed; a frame is published once every one of its
//! slots has been collected and a later reset has closed it. Until then,
//! a frame whose slots have all been collected is already reported by
//! `time`, but only enters the sum once it is closed.
//!
//! A reset cannot cancel work that is already queued on the GPU. If the
//! timer is reset several times per frame, or instruments different
//! regions from one frame to the next, reported values will not line up
//! with the frame that is being looked at.

use std::sync::Arc;

use crate::config::{OverflowPolicy, TimerConfig};
use crate::device::{QueryData, QueryHandle, QueryKind, TimestampDevice};
use crate::error::{ProfilerError, Result};

#[derive(Debug, Clone, Copy)]
struct TimestampRecord {
    frame: u64,
    start: QueryHandle,
    stop: QueryHandle,
    disjoint: Option<QueryHandle>,
    start_issued: bool,
    stop_issued: bool,
}

#[derive(Debug, Clone, Copy)]
struct FrameAccumulator {
    frame: u64,
    seconds: f64,
    invalid: bool,
}

enum SlotResult {
    Pending,
    Seconds(f64),
    Discarded,
}

/// Measures GPU execution time between two points in a command stream.
pub struct GpuTimer {
    device: Arc<dyn TimestampDevice>,
    records: Vec<TimestampRecord>,
    // Slot the next start goes into.
    issue: usize,
    // Oldest slot not yet collected.
    retrieve: usize,
    in_flight: usize,
    frame: u64,
    // Slots from frames before this one are collected but ignored.
    discard_before: u64,
    overflow: OverflowPolicy,
    fallback_frequency: u64,
    valid_mask: u64,
    pending: Option<FrameAccumulator>,
    last: Option<f64>,
    sum: f64,
    frames: u32,
    stalls: u64,
    dropped: u64,
    discarded: u64,
}

impl GpuTimer {
    /// Allocate the query ring on `device`.
    pub fn new(device: Arc<dyn TimestampDevice>, config: &TimerConfig) -> Result<Self> {
        let capacity = config.ring_capacity.max(1);
        let with_disjoint = device.supports_disjoint();
        let mut records = Vec::with_capacity(capacity);

        for _ in 0..capacity {
            match Self::create_record(device.as_ref(), with_disjoint) {
                Ok(record) => records.push(record),
                Err(err) => {
                    for record in &records {
                        Self::release_record(device.as_ref(), record);
                    }
                    return Err(err);
                }
            }
        }

        let valid_bits = device.timestamp_valid_bits().clamp(1, 64);
        let valid_mask = if valid_bits == 64 {
            u64::MAX
        } else {
            (1u64 << valid_bits) - 1
        };

        Ok(Self {
            device,
            records,
            issue: 0,
            retrieve: 0,
            in_flight: 0,
            frame: 0,
            discard_before: 0,
            overflow: config.overflow,
            fallback_frequency: config.fallback_frequency,
            valid_mask,
            pending: None,
            last: None,
            sum: 0.0,
            frames: 0,
            stalls: 0,
            dropped: 0,
            discarded: 0,
        })
    }

    fn create_record(device: &dyn TimestampDevice, with_disjoint: bool) -> Result<TimestampRecord> {
        let start = device.create_query(QueryKind::Timestamp)?;
        let stop = match device.create_query(QueryKind::Timestamp) {
            Ok(stop) => stop,
            Err(err) => {
                device.release_query(start);
                return Err(err);
            }
        };
        let disjoint = if with_disjoint {
            match device.create_query(QueryKind::Disjoint) {
                Ok(query) => Some(query),
                Err(err) => {
                    device.release_query(start);
                    device.release_query(stop);
                    return Err(err);
                }
            }
        } else {
            None
        };

        Ok(TimestampRecord {
            frame: 0,
            start,
            stop,
            disjoint,
            start_issued: false,
            stop_issued: false,
        })
    }

    fn release_record(device: &dyn TimestampDevice, record: &TimestampRecord) {
        device.release_query(record.start);
        device.release_query(record.stop);
        if let Some(disjoint) = record.disjoint {
            device.release_query(disjoint);
        }
    }

    /// Issue the begin timestamp into the next free slot.
    pub fn start(&mut self) {
        if self.is_open() {
            tracing::debug!("GpuTimer started while open, restarting slot");
            self.restart();
            return;
        }
        if self.in_flight == self.records.len() {
            self.make_room();
        }

        let frame = self.frame;
        let device = self.device.clone();
        let record = &mut self.records[self.issue];
        record.frame = frame;
        record.stop_issued = false;

        if let Some(disjoint) = record.disjoint {
            if let Err(err) = device.begin(disjoint) {
                tracing::warn!(%err, "Failed to begin disjoint query");
                return;
            }
        }
        match device.end(record.start) {
            Ok(()) => record.start_issued = true,
            Err(err) => {
                tracing::warn!(%err, "Failed to write start timestamp");
                if let Some(disjoint) = record.disjoint {
                    let _ = device.end(disjoint);
                }
            }
        }
    }

    /// Re-issue the begin timestamp of the open slot.
    pub fn restart(&mut self) {
        if !self.is_open() {
            self.start();
            return;
        }
        let record = self.records[self.issue];
        if let Err(err) = self.device.end(record.start) {
            tracing::warn!(%err, "Failed to rewrite start timestamp");
        }
    }

    /// Issue the end timestamp into the open slot.
    pub fn stop(&mut self) {
        if !self.is_open() {
            tracing::warn!("GpuTimer stopped without matching start");
            return;
        }

        let device = self.device.clone();
        let record = &mut self.records[self.issue];
        let stopped = device.end(record.stop);
        if let Some(disjoint) = record.disjoint {
            if let Err(err) = device.end(disjoint) {
                tracing::warn!(%err, "Failed to end disjoint query");
            }
        }
        if let Err(err) = stopped {
            tracing::warn!(%err, "Failed to write stop timestamp, abandoning slot");
            record.start_issued = false;
            return;
        }

        record.stop_issued = true;
        self.issue = (self.issue + 1) % self.records.len();
        self.in_flight += 1;
    }

    /// Close the current frame and collect whatever the GPU has finished.
    ///
    /// Queries already submitted keep running; their results will still be
    /// reported after this call.
    pub fn reset(&mut self, reset_sum: bool) {
        if self.is_open() {
            tracing::debug!("GpuTimer reset while open");
        }
        self.frame += 1;
        self.finish_collection(false);
        if reset_sum {
            self.sum = 0.0;
            self.frames = 0;
        }
    }

    /// Forget every result, including those still in flight.
    pub fn clear(&mut self) {
        if self.is_open() {
            self.abandon_open();
        }
        self.frame += 1;
        self.discard_before = self.frame;
        self.pending = None;
        self.last = None;
        self.sum = 0.0;
        self.frames = 0;
    }

    /// Seconds of the most recently completed frame.
    ///
    /// Never blocks unless `stall` is set, in which case every in-flight
    /// slot is waited for. Returns `None` until the first frame completes.
    pub fn time(&mut self, stall: bool) -> Option<f64> {
        self.finish_collection(stall);
        self.last
    }

    /// Seconds accumulated over completed frames since the last sum reset.
    pub fn sum_time(&mut self, stall: bool) -> f64 {
        self.finish_collection(stall);
        self.sum
    }

    /// Completed frames contributing to the sum.
    pub fn num_frames(&mut self, stall: bool) -> u32 {
        self.finish_collection(stall);
        self.frames
    }

    /// Average seconds per completed frame.
    pub fn avg_time(&mut self, stall: bool) -> Option<f64> {
        self.finish_collection(stall);
        (self.frames > 0).then(|| self.sum / f64::from(self.frames))
    }

    /// Block until the device has executed all submitted work.
    pub fn wait_idle(&self) {
        if let Err(err) = self.device.drain() {
            tracing::warn!(%err, "Failed to drain GPU");
        }
    }

    /// Number of ring slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Slots issued but not yet collected.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Times a start had to block because the ring was full.
    #[must_use]
    pub const fn stalls(&self) -> u64 {
        self.stalls
    }

    /// Results thrown away because the ring was full.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Results rejected as disjoint or unreadable.
    #[must_use]
    pub const fn discarded(&self) -> u64 {
        self.discarded
    }

    fn is_open(&self) -> bool {
        let record = &self.records[self.issue];
        record.start_issued && !record.stop_issued
    }

    fn abandon_open(&mut self) {
        let record = &mut self.records[self.issue];
        if let Some(disjoint) = record.disjoint {
            let _ = self.device.end(disjoint);
        }
        record.start_issued = false;
    }

    fn make_room(&mut self) {
        match self.overflow {
            OverflowPolicy::Stall => {
                self.stalls += 1;
                if self.stalls == 1 {
                    tracing::warn!(
                        capacity = self.records.len(),
                        "GPU timer ring full, stalling on oldest query; increase ring capacity"
                    );
                } else {
                    tracing::debug!(stalls = self.stalls, "GPU timer ring full, stalling");
                }
                if !self.collect_oldest(true) {
                    // The oldest slot can never complete, e.g. it sits in a
                    // command buffer that has not been submitted yet.
                    self.dropped += 1;
                    if self.dropped == 1 {
                        tracing::warn!(
                            "GPU timer could not wait for oldest query, dropping it; \
                             increase ring capacity"
                        );
                    } else {
                        tracing::debug!(dropped = self.dropped, "GPU timer dropping unwaitable query");
                    }
                    self.drop_oldest();
                }
            }
            OverflowPolicy::DropOldest => {
                self.dropped += 1;
                if self.dropped == 1 {
                    tracing::warn!(
                        capacity = self.records.len(),
                        "GPU timer ring full, dropping oldest result; increase ring capacity"
                    );
                } else {
                    tracing::debug!(dropped = self.dropped, "GPU timer ring full, dropping");
                }
                self.drop_oldest();
            }
        }
    }

    fn drop_oldest(&mut self) {
        let frame = self.records[self.retrieve].frame;
        self.retire_oldest();
        self.accumulate(frame, None);
    }

    fn retire_oldest(&mut self) {
        let record = &mut self.records[self.retrieve];
        record.start_issued = false;
        record.stop_issued = false;
        self.retrieve = (self.retrieve + 1) % self.records.len();
        self.in_flight -= 1;
    }

    fn finish_collection(&mut self, stall: bool) {
        while self.in_flight > 0 {
            if !self.collect_oldest(stall) {
                break;
            }
        }
        self.settle(stall);
    }

    /// Try to collect the oldest in-flight slot. Returns whether it was consumed.
    fn collect_oldest(&mut self, wait: bool) -> bool {
        let record = self.records[self.retrieve];
        let seconds = match self.read_record(&record, wait) {
            Ok(SlotResult::Pending) => return false,
            Ok(SlotResult::Seconds(seconds)) => Some(seconds),
            Ok(SlotResult::Discarded) => None,
            Err(err) => {
                tracing::warn!(%err, "Failed to read GPU timer query");
                None
            }
        };
        if seconds.is_none() {
            self.discarded += 1;
        }
        self.retire_oldest();
        self.accumulate(record.frame, seconds);
        true
    }

    fn read_record(&self, record: &TimestampRecord, wait: bool) -> Result<SlotResult> {
        let frequency = match record.disjoint {
            Some(query) => match self.device.get_data(query, wait)? {
                None => return Ok(SlotResult::Pending),
                Some(QueryData::Disjoint(data)) if data.disjoint => {
                    tracing::debug!("Discarding GPU timing across clock discontinuity");
                    return Ok(SlotResult::Discarded);
                }
                Some(QueryData::Disjoint(data)) => data.frequency,
                Some(other) => {
                    return Err(ProfilerError::Device(format!(
                        "expected disjoint result, got {other:?}"
                    )))
                }
            },
            None => self
                .device
                .timestamp_frequency()
                .unwrap_or(self.fallback_frequency),
        };

        let Some(start) = self.read_timestamp(record.start, wait)? else {
            return Ok(SlotResult::Pending);
        };
        let Some(stop) = self.read_timestamp(record.stop, wait)? else {
            return Ok(SlotResult::Pending);
        };

        if frequency == 0 {
            return Ok(SlotResult::Discarded);
        }
        let delta = stop.wrapping_sub(start) & self.valid_mask;
        // Deltas past half the counter range mean stop landed before start.
        if delta > self.valid_mask / 2 {
            tracing::debug!(start, stop, "Discarding backwards GPU timestamp pair");
            return Ok(SlotResult::Discarded);
        }
        Ok(SlotResult::Seconds(delta as f64 / frequency as f64))
    }

    fn read_timestamp(&self, query: QueryHandle, wait: bool) -> Result<Option<u64>> {
        match self.device.get_data(query, wait)? {
            None => Ok(None),
            Some(QueryData::Timestamp(ticks)) => Ok(Some(ticks & self.valid_mask)),
            Some(other) => Err(ProfilerError::Device(format!(
                "expected timestamp result, got {other:?}"
            ))),
        }
    }

    fn accumulate(&mut self, frame: u64, seconds: Option<f64>) {
        if frame < self.discard_before {
            return;
        }
        match &mut self.pending {
            Some(acc) if acc.frame == frame => {
                acc.seconds += seconds.unwrap_or(0.0);
                acc.invalid |= seconds.is_none();
            }
            pending => {
                let previous = pending.replace(FrameAccumulator {
                    frame,
                    seconds: seconds.unwrap_or(0.0),
                    invalid: seconds.is_none(),
                });
                if let Some(previous) = previous {
                    self.publish(previous);
                }
            }
        }
    }

    /// Publish the pending frame once no more of its slots can arrive.
    fn settle(&mut self, stall: bool) {
        let Some(acc) = self.pending else {
            return;
        };
        let more_in_ring = self.in_flight > 0 && self.records[self.retrieve].frame == acc.frame;
        let open_in_frame = self.is_open() && self.records[self.issue].frame == acc.frame;

        let collected = !more_in_ring && !open_in_frame;

        if acc.frame < self.frame && collected {
            self.pending = None;
            self.publish(acc);
        } else if !acc.invalid && (stall || collected) {
            // Report the current frame so far without closing it.
            self.last = Some(acc.seconds);
        }
    }

    fn publish(&mut self, acc: FrameAccumulator) {
        if acc.invalid {
            tracing::debug!(frame = acc.frame, "GPU frame timing discarded");
            return;
        }
        self.last = Some(acc.seconds);
        self.sum += acc.seconds;
        self.frames += 1;
    }
}

impl Drop for GpuTimer {
    fn drop(&mut self) {
        for record in &self.records {
            Self::release_record(self.device.as_ref(), record);
        }
    }
}
