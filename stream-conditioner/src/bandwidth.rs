//! Per-connection bandwidth estimation
//!
//! Cumulative byte counters reported by the transport are turned into
//! per-tick deltas and kept in a small ring buffer.

use std::time::Duration;

/// Fixed-capacity ring buffer of per-tick byte deltas
#[derive(Debug, Clone)]
pub struct BandwidthWindow {
    values: Vec<u64>,
    pos: usize,
    capacity: usize,
    prev: u64,
}

impl BandwidthWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: Vec::with_capacity(capacity),
            pos: 0,
            capacity,
            prev: 0,
        }
    }

    /// Record a cumulative byte count. Counter resets yield a zero delta.
    pub fn put(&mut self, cumulative: u64) {
        let delta = cumulative.saturating_sub(self.prev);
        if self.values.len() < self.capacity {
            self.values.push(delta);
        } else {
            self.values[self.pos] = delta;
        }
        self.pos = (self.pos + 1) % self.capacity;
        self.prev = cumulative;
    }

    /// Set the reference count without recording a delta
    pub fn prime(&mut self, cumulative: u64) {
        self.prev = cumulative;
    }

    /// Mean of the stored deltas, 0 when empty
    pub fn average(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.values.iter().sum();
        sum as f64 / self.values.len() as f64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Smoothed throughput estimate for one connection
#[derive(Debug, Clone)]
pub struct BandwidthEstimator {
    window: BandwidthWindow,
    tick_interval: Duration,
    required_bps: f64,
    real_bps: Option<f64>,
}

impl BandwidthEstimator {
    pub fn new(capacity: usize, tick_interval: Duration) -> Self {
        Self {
            window: BandwidthWindow::new(capacity),
            tick_interval,
            required_bps: 0.0,
            real_bps: None,
        }
    }

    /// Feed the cumulative payload byte count for this tick
    pub fn put(&mut self, cumulative_bytes: u64) {
        self.window.put(cumulative_bytes);
        let secs = self.tick_interval.as_secs_f64();
        self.required_bps = if secs > 0.0 {
            self.window.average() / secs
        } else {
            0.0
        };
    }

    /// Start counting from `cumulative_bytes` already sent
    pub fn prime(&mut self, cumulative_bytes: u64) {
        self.window.prime(cumulative_bytes);
    }

    /// Record the transport's own bandwidth measurement (bytes/sec).
    /// Kept alongside the estimate, never replacing it.
    pub fn set_real_rate(&mut self, bytes_per_sec: f64) {
        self.real_bps = Some(bytes_per_sec);
    }

    /// Average bytes per second needed to carry what the encoder produced
    pub fn required_rate(&self) -> f64 {
        self.required_bps
    }

    /// Transport-reported bandwidth, when the protocol provides one
    pub fn real_rate(&self) -> Option<f64> {
        self.real_bps
    }

    pub fn window(&self) -> &BandwidthWindow {
        &self.window
    }
}
