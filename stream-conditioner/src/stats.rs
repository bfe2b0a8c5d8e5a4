//! Per-connection statistics for logging and status display
//!
//! Tracks delivered traffic, instantaneous bitrate and whether the
//! connection has started losing data since the previous update.

use std::fmt;
use std::time::Duration;

use crate::transport::{ConnectionId, ConnectionStats};

/// RIST quality below this (after enough packets) counts as loss
pub(crate) const RIST_QUALITY_FLOOR: f64 = 90.0;

/// RIST quality is ignored until this many packets were sent
pub(crate) const RIST_MIN_PACKETS: u64 = 100;

/// Running statistics for one connection
#[derive(Debug, Clone)]
pub struct ConnectionStatistics {
    start_time: Duration,
    prev_time: Duration,
    prev_bytes: u64,
    duration: Duration,
    bps: u64,
    audio_skipped: u64,
    video_skipped: u64,
    pkt_snd_drop: u64,
    data_loss_increasing: bool,
}

impl ConnectionStatistics {
    /// Start tracking at session time `now`
    pub fn new(now: Duration) -> Self {
        Self {
            start_time: now,
            prev_time: now,
            prev_bytes: 0,
            duration: Duration::ZERO,
            bps: 0,
            audio_skipped: 0,
            video_skipped: 0,
            pkt_snd_drop: 0,
            data_loss_increasing: false,
        }
    }

    pub fn update(&mut self, now: Duration, stats: &ConnectionStats) {
        self.data_loss_increasing = false;

        match *stats {
            ConnectionStats::Tcp {
                audio_frames_skipped,
                video_frames_skipped,
                ..
            } => {
                if self.audio_skipped != audio_frames_skipped
                    || self.video_skipped != video_frames_skipped
                {
                    self.audio_skipped = audio_frames_skipped;
                    self.video_skipped = video_frames_skipped;
                    self.data_loss_increasing = true;
                }
            }
            ConnectionStats::Srt { pkt_snd_drop, .. } => {
                if self.pkt_snd_drop != pkt_snd_drop {
                    self.pkt_snd_drop = pkt_snd_drop;
                    self.data_loss_increasing = true;
                }
            }
            ConnectionStats::Rist { quality, sent } => {
                if sent > RIST_MIN_PACKETS && quality < RIST_QUALITY_FLOOR {
                    self.data_loss_increasing = true;
                }
            }
        }

        let bytes = stats.payload_bytes();
        let elapsed = now.saturating_sub(self.prev_time);
        self.bps = if elapsed.is_zero() {
            0
        } else {
            let delta = bytes.saturating_sub(self.prev_bytes) as f64;
            (delta * 8.0 / elapsed.as_secs_f64()) as u64
        };
        self.prev_time = now;
        self.prev_bytes = bytes;
        self.duration = now.saturating_sub(self.start_time);
    }

    /// Bits per second over the last update interval
    pub fn bandwidth(&self) -> u64 {
        self.bps
    }

    /// Total payload bytes delivered
    pub fn traffic(&self) -> u64 {
        self.prev_bytes
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_data_loss_increasing(&self) -> bool {
        self.data_loss_increasing
    }
}

/// Point-in-time view of one connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionReport {
    pub id: ConnectionId,
    pub bandwidth_bps: u64,
    pub traffic_bytes: u64,
    pub duration: Duration,
    pub data_loss_increasing: bool,
    /// Smoothed bytes/sec the encoder output needs
    pub required_rate: f64,
    /// Bytes/sec measured by the transport, if it reports one
    pub real_rate: Option<f64>,
}

impl fmt::Display for ConnectionReport {
    /// Format: `[conn:1] bw=1.2Mbps tx=23.1KB dur=00:01:05 need=120.0KB/s loss=no`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[conn:{}] bw={} tx={} dur={} need={}/s",
            self.id,
            format_bandwidth(self.bandwidth_bps as f64),
            format_bytes(self.traffic_bytes),
            format_duration(self.duration),
            format_bytes(self.required_rate as u64),
        )?;
        if let Some(real) = self.real_rate {
            write!(f, " real={}/s", format_bytes(real as u64))?;
        }
        write!(
            f,
            " loss={}",
            if self.data_loss_increasing { "yes" } else { "no" }
        )
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1}GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.1}MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1}KB", bytes as f64 / 1_000.0)
    } else {
        format!("{}B", bytes)
    }
}

pub fn format_bandwidth(bits_per_sec: f64) -> String {
    if bits_per_sec >= 1_000_000_000.0 {
        format!("{:.1}Gbps", bits_per_sec / 1_000_000_000.0)
    } else if bits_per_sec >= 1_000_000.0 {
        format!("{:.1}Mbps", bits_per_sec / 1_000_000.0)
    } else if bits_per_sec >= 1_000.0 {
        format!("{:.1}Kbps", bits_per_sec / 1_000.0)
    } else {
        format!("{:.0}bps", bits_per_sec)
    }
}

/// `HH:MM:SS`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
