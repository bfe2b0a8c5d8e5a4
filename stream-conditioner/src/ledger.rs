//! Append-only histories of observed loss and of bitrate changes
//!
//! Timestamps are offsets from session start. Both ledgers are written by a
//! single owner, in timestamp order.

use std::time::Duration;

/// One polled measurement of cumulative lost units across registered connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossSample {
    pub timestamp: Duration,
    pub audio_lost: u64,
    pub video_lost: u64,
}

impl LossSample {
    pub fn new(timestamp: Duration, audio_lost: u64, video_lost: u64) -> Self {
        Self {
            timestamp,
            audio_lost,
            video_lost,
        }
    }

    /// Whether either counter grew since `earlier`
    pub fn exceeds(&self, earlier: &LossSample) -> bool {
        self.audio_lost > earlier.audio_lost || self.video_lost > earlier.video_lost
    }

    pub fn same_counts(&self, other: &LossSample) -> bool {
        self.audio_lost == other.audio_lost && self.video_lost == other.video_lost
    }

    /// Units lost between `earlier` and `self`. Counters that went backwards
    /// (a connection dropped out of the aggregate) contribute nothing.
    fn lost_since(&self, earlier: &LossSample) -> u64 {
        self.audio_lost.saturating_sub(earlier.audio_lost)
            + self.video_lost.saturating_sub(earlier.video_lost)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LossLedger {
    samples: Vec<LossSample>,
}

impl LossLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: LossSample) {
        self.samples.push(sample);
    }

    pub fn last(&self) -> Option<&LossSample> {
        self.samples.last()
    }

    /// The entry before the newest one
    pub fn previous(&self) -> Option<&LossSample> {
        self.samples.iter().rev().nth(1)
    }

    /// Sum of loss increments over consecutive entries whose later sample
    /// is at or after `since`. Walks back from the newest entry only as far
    /// as needed.
    pub fn lost_since(&self, since: Duration) -> u64 {
        self.samples
            .windows(2)
            .rev()
            .take_while(|pair| pair[1].timestamp >= since)
            .map(|pair| pair[1].lost_since(&pair[0]))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn samples(&self) -> &[LossSample] {
        &self.samples
    }
}

/// A bitrate the controller actually applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitrateChange {
    pub timestamp: Duration,
    pub bitrate: u32,
}

impl BitrateChange {
    pub fn new(timestamp: Duration, bitrate: u32) -> Self {
        Self { timestamp, bitrate }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BitrateLedger {
    changes: Vec<BitrateChange>,
}

impl BitrateLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: BitrateChange) {
        self.changes.push(change);
    }

    pub fn last(&self) -> Option<&BitrateChange> {
        self.changes.last()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    pub fn changes(&self) -> &[BitrateChange] {
        &self.changes
    }
}
