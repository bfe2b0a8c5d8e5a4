//! Per-tick loss sampling across registered connections
//!
//! Each protocol reports loss differently. The collector folds all of them
//! into two counters so the controller never branches on protocol.
//!
//! Every connection contributes only the loss it accumulated while
//! registered. Engine counters seen at registration form its baseline, and
//! a tick without stats carries its contribution forward unchanged.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::bandwidth::BandwidthEstimator;
use crate::ledger::{LossLedger, LossSample};
use crate::stats::{ConnectionReport, ConnectionStatistics, RIST_MIN_PACKETS, RIST_QUALITY_FLOOR};
use crate::transport::{ConnectionId, ConnectionStats, Transport};

#[derive(Debug, Clone)]
struct ConnectionEntry {
    bandwidth: BandwidthEstimator,
    statistics: ConnectionStatistics,
    /// Raw engine counters from the last report, `None` until the first one
    last_counters: Option<(u64, u64)>,
    audio_lost: u64,
    video_lost: u64,
}

impl ConnectionEntry {
    fn new(bandwidth: BandwidthEstimator, statistics: ConnectionStatistics) -> Self {
        Self {
            bandwidth,
            statistics,
            last_counters: None,
            audio_lost: 0,
            video_lost: 0,
        }
    }

    /// Take `stats` as the starting point without counting any loss
    fn seed(&mut self, stats: &ConnectionStats) {
        self.last_counters = counters(stats);
        self.bandwidth.prime(stats.payload_bytes());
    }

    /// Add the loss reported since the previous report
    fn absorb(&mut self, stats: &ConnectionStats) {
        match *stats {
            ConnectionStats::Rist { quality, sent } => {
                if sent > RIST_MIN_PACKETS && quality < RIST_QUALITY_FLOOR {
                    self.video_lost += (RIST_QUALITY_FLOOR - quality).ceil() as u64;
                }
            }
            _ => {
                let Some((audio, video)) = counters(stats) else {
                    return;
                };
                if let Some((prev_audio, prev_video)) = self.last_counters {
                    // Engine counters that went backwards restarted; only
                    // growth from the new value counts
                    self.audio_lost += audio.saturating_sub(prev_audio);
                    self.video_lost += video.saturating_sub(prev_video);
                }
                self.last_counters = Some((audio, video));
            }
        }
    }
}

/// Cumulative (audio, video) loss counters, for families that have them
fn counters(stats: &ConnectionStats) -> Option<(u64, u64)> {
    match *stats {
        ConnectionStats::Tcp {
            audio_frames_skipped,
            video_frames_skipped,
            ..
        } => Some((audio_frames_skipped, video_frames_skipped)),
        ConnectionStats::Srt { pkt_snd_drop, .. } => Some((0, pkt_snd_drop)),
        ConnectionStats::Rist { .. } => None,
    }
}

/// Registered connections and the loss ledger built from them
#[derive(Debug)]
pub struct SampleCollector {
    connections: BTreeMap<ConnectionId, ConnectionEntry>,
    ledger: LossLedger,
    window_capacity: usize,
    tick_interval: Duration,
}

impl SampleCollector {
    pub fn new(window_capacity: usize, tick_interval: Duration) -> Self {
        Self {
            connections: BTreeMap::new(),
            ledger: LossLedger::new(),
            window_capacity,
            tick_interval,
        }
    }

    /// Drop all connections and restart the ledger with a zero sample at `now`
    pub fn reset(&mut self, now: Duration) {
        self.connections.clear();
        self.ledger.clear();
        self.ledger.push(LossSample::new(now, 0, 0));
    }

    /// Register a connection. Returns false if it was already registered.
    ///
    /// Counters the engine reports right now become the baseline, so loss
    /// from before registration is never attributed to this session. With
    /// no stats available yet, the first report seeds the baseline instead.
    pub fn add_connection(
        &mut self,
        id: ConnectionId,
        now: Duration,
        transport: &dyn Transport,
    ) -> bool {
        if self.connections.contains_key(&id) {
            return false;
        }
        let mut entry = ConnectionEntry::new(
            BandwidthEstimator::new(self.window_capacity, self.tick_interval),
            ConnectionStatistics::new(now),
        );
        if let Some(stats) = transport.connection_stats(id) {
            entry.seed(&stats);
        }
        self.connections.insert(id, entry);
        true
    }

    /// Returns false if the connection was not registered
    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn clear_connections(&mut self) {
        self.connections.clear();
    }

    /// Poll every registered connection and append one aggregate sample.
    ///
    /// Does nothing (and returns `None`) while no connection is registered.
    /// A connection without stats this tick keeps its previous contribution.
    pub fn collect(&mut self, now: Duration, transport: &dyn Transport) -> Option<LossSample> {
        if self.connections.is_empty() {
            return None;
        }

        let mut audio_lost = 0u64;
        let mut video_lost = 0u64;
        for (&id, entry) in self.connections.iter_mut() {
            if let Some(stats) = transport.connection_stats(id) {
                if entry.last_counters.is_none() && counters(&stats).is_some() {
                    entry.seed(&stats);
                } else {
                    entry.absorb(&stats);
                    entry.bandwidth.put(stats.payload_bytes());
                }
                if let Some(rate) = stats.measured_rate() {
                    entry.bandwidth.set_real_rate(rate);
                }
                entry.statistics.update(now, &stats);
            }
            audio_lost += entry.audio_lost;
            video_lost += entry.video_lost;
        }

        let sample = LossSample::new(now, audio_lost, video_lost);
        self.ledger.push(sample);
        Some(sample)
    }

    pub fn ledger(&self) -> &LossLedger {
        &self.ledger
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn bandwidth(&self, id: ConnectionId) -> Option<&BandwidthEstimator> {
        self.connections.get(&id).map(|entry| &entry.bandwidth)
    }

    pub fn reports(&self) -> Vec<ConnectionReport> {
        self.connections
            .iter()
            .map(|(&id, entry)| ConnectionReport {
                id,
                bandwidth_bps: entry.statistics.bandwidth(),
                traffic_bytes: entry.statistics.traffic(),
                duration: entry.statistics.duration(),
                data_loss_increasing: entry.statistics.is_data_loss_increasing(),
                required_rate: entry.bandwidth.required_rate(),
                real_rate: entry.bandwidth.real_rate(),
            })
            .collect()
    }
}
