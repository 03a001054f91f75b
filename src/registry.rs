/*
 *  registry.rs
 *
 *  LeVelS - audio bargraph overlay
 *  (c) 2020-26 Stuart Hunter
 *
 *  Shared stream registry - the metering side registers streams and
 *  queues peak records here, the rendering side reads them back
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use arrayvec::ArrayVec;
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Most channels a single metered stream can carry.
pub const MAX_METER_CHANNELS: usize = 9;

/// Records a stream may queue before the oldest one is evicted.  Keeps
/// memory bounded when nothing is consuming the fifo.
pub const PEAK_BACKLOG_MAX: usize = 100;

/// One snapshot of per-channel peak amplitude for a decoded audio block.
/// Linear amplitude, one entry per channel, fifo-ordered.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeakRecord {
    peaks: ArrayVec<f32, MAX_METER_CHANNELS>,
}

impl PeakRecord {
    pub fn new(peaks: ArrayVec<f32, MAX_METER_CHANNELS>) -> Self {
        Self { peaks }
    }

    /// Peak for `channel`, 0.0 when the record carries fewer channels.
    #[inline]
    pub fn channel(&self, channel: usize) -> f32 {
        self.peaks.get(channel).copied().unwrap_or(0.0)
    }

    pub fn channels(&self) -> usize {
        self.peaks.len()
    }
}

/// Bounded producer/consumer queue with drop-oldest backpressure.
#[derive(Debug, Default)]
pub struct PeakFifo {
    records: VecDeque<PeakRecord>,
}

impl PeakFifo {
    /// Append a record, evicting the oldest one first when the backlog is
    /// full.  Returns true when something was evicted.
    pub fn push(&mut self, record: PeakRecord) -> bool {
        let dropped = if self.records.len() >= PEAK_BACKLOG_MAX {
            self.records.pop_front();
            true
        } else {
            false
        };
        self.records.push_back(record);
        dropped
    }

    /// Newest record, with everything older pruned away.  The newest one
    /// stays queued so an idle stream keeps reporting its last level.
    pub fn latest(&mut self) -> Option<&PeakRecord> {
        while self.records.len() > 1 {
            self.records.pop_front();
        }
        self.records.back()
    }

    /// Oldest queued record without consuming it.
    pub fn front(&self) -> Option<&PeakRecord> {
        self.records.front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One logical audio stream being metered.
///
/// Owned by the registry, handed out as an `Arc` handle to the meter stage
/// feeding it.  The fifo has its own lock so the producer never needs the
/// registry lock; whenever both are held (the render path) the registry
/// lock is taken first.
#[derive(Debug)]
pub struct StreamEntry {
    stream_id: i32,
    name: String,
    channels: usize,
    fifo: Mutex<PeakFifo>,
}

impl StreamEntry {
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Queue a record, logging when backpressure evicted an old one.
    pub fn push_record(&self, record: PeakRecord) {
        if self.with_fifo(|fifo| fifo.push(record)) {
            debug!("stream {}: drop peak data", self.stream_id);
        }
    }

    /// Clone of the newest record, pruning stale backlog.
    pub fn latest(&self) -> Option<PeakRecord> {
        self.with_fifo(|fifo| fifo.latest().cloned())
    }

    /// Queue depth, test and diagnostics hook.
    pub fn backlog(&self) -> usize {
        self.with_fifo(|fifo| fifo.len())
    }

    /// Oldest queued record, test and diagnostics hook.
    pub fn oldest(&self) -> Option<PeakRecord> {
        self.with_fifo(|fifo| fifo.front().cloned())
    }

    fn with_fifo<R>(&self, f: impl FnOnce(&mut PeakFifo) -> R) -> R {
        match self.fifo.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

/// Display name for a stream: "id [lang]" when the container carried a
/// language, plain "id" otherwise.  Language decoding itself is the host's
/// business.
pub fn display_name(stream_id: i32, language: Option<&str>) -> String {
    match language {
        Some(lang) if !lang.is_empty() => format!("{} [{}]", stream_id, lang),
        _ => format!("{}", stream_id),
    }
}

#[derive(Debug, Default)]
struct Inner {
    streams: Vec<Arc<StreamEntry>>,
    total_channels: usize,
}

/// The set of active metered streams, shared between the metering pipeline
/// and the rendering pipeline.
///
/// Lifetime is governed by the `Arc` wrapping it; concurrent access by the
/// single inner mutex.  Streams are kept sorted by ascending stream id so
/// the renderer lays channels out deterministically no matter the
/// add/remove order.
#[derive(Debug, Default)]
pub struct SharedStreams {
    inner: Mutex<Inner>,
}

impl SharedStreams {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a stream and hand back the entry the meter stage feeds.
    pub fn add_stream(&self, channels: usize, name: String, stream_id: i32) -> Arc<StreamEntry> {
        warn!("add audio stream {stream_id} ({channels} ch)");
        let entry = Arc::new(StreamEntry {
            stream_id,
            name,
            channels,
            fifo: Mutex::new(PeakFifo::default()),
        });
        let mut inner = self.lock_inner();
        inner.streams.push(Arc::clone(&entry));
        inner.streams.sort_by_key(|e| e.stream_id);
        inner.total_channels += channels;
        entry
    }

    /// Drop a stream; its fifo and queued records go with the last handle.
    pub fn remove_stream(&self, entry: &Arc<StreamEntry>) {
        warn!("del audio stream {}", entry.stream_id);
        let mut inner = self.lock_inner();
        if let Some(idx) = inner
            .streams
            .iter()
            .position(|e| Arc::ptr_eq(e, entry))
        {
            inner.streams.remove(idx);
            inner.streams.sort_by_key(|e| e.stream_id);
            inner.total_channels -= entry.channels;
        }
    }

    pub fn stream_count(&self) -> usize {
        self.lock_inner().streams.len()
    }

    pub fn total_channels(&self) -> usize {
        self.lock_inner().total_channels
    }

    /// Run `f` with the stream list under the registry lock.  The renderer
    /// uses this for its whole layout-plus-read phase so a concurrent
    /// remove can never hand it a half-mutated set.
    pub fn with_streams<R>(&self, f: impl FnOnce(&[Arc<StreamEntry>]) -> R) -> R {
        let inner = self.lock_inner();
        f(&inner.streams)
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(peaks: &[f32]) -> PeakRecord {
        let mut v = ArrayVec::new();
        for &p in peaks {
            v.push(p);
        }
        PeakRecord::new(v)
    }

    #[test]
    fn test_add_remove_round_trip() {
        let shared = SharedStreams::new();
        assert_eq!(shared.stream_count(), 0);
        assert_eq!(shared.total_channels(), 0);

        let a = shared.add_stream(2, "1".into(), 1);
        let b = shared.add_stream(6, "2".into(), 2);
        assert_eq!(shared.stream_count(), 2);
        assert_eq!(shared.total_channels(), 8);

        shared.remove_stream(&b);
        shared.remove_stream(&a);
        assert_eq!(shared.stream_count(), 0);
        assert_eq!(shared.total_channels(), 0);
    }

    #[test]
    fn test_streams_sorted_by_id() {
        let shared = SharedStreams::new();
        shared.add_stream(2, "7".into(), 7);
        shared.add_stream(2, "3".into(), 3);
        shared.add_stream(1, "5".into(), 5);

        let ids = shared.with_streams(|s| s.iter().map(|e| e.stream_id()).collect::<Vec<_>>());
        assert_eq!(ids, vec![3, 5, 7]);
    }

    #[test]
    fn test_fifo_drop_oldest_backpressure() {
        let mut fifo = PeakFifo::default();
        for i in 1..=150 {
            fifo.push(record(&[i as f32]));
        }
        assert_eq!(fifo.len(), PEAK_BACKLOG_MAX);
        // records 1..=50 were evicted; the oldest survivor is #51
        assert_eq!(fifo.front().map(|r| r.channel(0)), Some(51.0));
    }

    #[test]
    fn test_fifo_latest_prunes_but_keeps_newest() {
        let mut fifo = PeakFifo::default();
        fifo.push(record(&[0.1]));
        fifo.push(record(&[0.2]));
        fifo.push(record(&[0.3]));

        assert_eq!(fifo.latest().map(|r| r.channel(0)), Some(0.3));
        assert_eq!(fifo.len(), 1);
        // idle stream keeps reporting its last level
        assert_eq!(fifo.latest().map(|r| r.channel(0)), Some(0.3));
    }

    #[test]
    fn test_record_out_of_range_channel_is_silent() {
        let rec = record(&[0.5, 0.25]);
        assert_eq!(rec.channel(0), 0.5);
        assert_eq!(rec.channel(1), 0.25);
        assert_eq!(rec.channel(2), 0.0);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(3, Some("fre")), "3 [fre]");
        assert_eq!(display_name(3, Some("")), "3");
        assert_eq!(display_name(3, None), "3");
    }
}
