//! Event accumulator: bounded ring of past frames' consumed events, for
//! slow-lane consumers such as the Global Double Buffer snapshot provider
//! (§4.16).
//!
//! Grounded on `ecsdb::replication::conflict::ConflictLog`'s ring-eviction
//! shape (`remove(0)` once over `max_entries`) — only the eviction idea is
//! salvaged; nothing here resolves conflicts.

use crate::event_bus::PendingStream;

/// One frame's worth of accumulated event streams.
pub struct AccumulatedFrame {
    pub tick: u64,
    pub streams: Vec<PendingStream>,
}

/// Fixed-capacity FIFO ring of recent frames' events.
///
/// A slow-lane consumer (one that does not run every tick) drains the ring
/// to recover events it would otherwise have missed between its own
/// synchronization points.
pub struct EventAccumulator {
    frames: Vec<AccumulatedFrame>,
    max_entries: usize,
}

impl EventAccumulator {
    pub fn new(max_entries: usize) -> Self {
        Self {
            frames: Vec::with_capacity(max_entries),
            max_entries: max_entries.max(1),
        }
    }

    /// Records one frame's pending streams, evicting the oldest frame if the
    /// ring is full.
    pub fn push(&mut self, tick: u64, streams: Vec<PendingStream>) {
        if self.frames.len() >= self.max_entries {
            self.frames.remove(0);
        }
        self.frames.push(AccumulatedFrame { tick, streams });
    }

    /// Frames with `tick > since`, oldest first.
    pub fn since(&self, since: u64) -> impl Iterator<Item = &AccumulatedFrame> {
        self.frames.iter().filter(move |f| f.tick > since)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn oldest_tick(&self) -> Option<u64> {
        self.frames.first().map(|f| f.tick)
    }

    pub fn newest_tick(&self) -> Option<u64> {
        self.frames.last().map(|f| f.tick)
    }
}
