//! Interface to the streaming engine that owns the actual connections

use std::fmt;

use crate::camera::FpsRange;

/// SRT/UDT header bytes carried by every sent packet
const SRT_HEADER_BYTES: u64 = 44;

/// MPEG-TS payload carried by one RIST packet (7 x 188)
const RIST_PACKET_BYTES: u64 = 1316;

/// Identifier the streaming engine assigns to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub i32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cumulative statistics for one connection. The family depends on the
/// transport protocol of that connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionStats {
    /// RTMP / RTSP over TCP
    Tcp {
        audio_frames_skipped: u64,
        video_frames_skipped: u64,
        bytes_sent: u64,
    },
    Srt {
        pkt_snd_drop: u64,
        byte_sent_unique: u64,
        pkt_sent_unique: u64,
        /// One-way bandwidth measured by SRT, in Mbit/s
        mbps_bandwidth: f64,
    },
    Rist {
        /// 0..=100 link quality score
        quality: f64,
        sent: u64,
    },
}

impl ConnectionStats {
    /// Cumulative payload bytes, with protocol framing removed where known
    pub fn payload_bytes(&self) -> u64 {
        match *self {
            ConnectionStats::Tcp { bytes_sent, .. } => bytes_sent,
            ConnectionStats::Srt {
                byte_sent_unique,
                pkt_sent_unique,
                ..
            } => byte_sent_unique.saturating_sub(pkt_sent_unique * SRT_HEADER_BYTES),
            ConnectionStats::Rist { sent, .. } => sent * RIST_PACKET_BYTES,
        }
    }

    /// Bandwidth measured by the transport itself, in bytes/sec
    pub fn measured_rate(&self) -> Option<f64> {
        match *self {
            ConnectionStats::Srt { mbps_bandwidth, .. } => Some(mbps_bandwidth * 125_000.0),
            _ => None,
        }
    }
}

/// The streaming engine as seen by the conditioner.
///
/// Calls are fire-and-forget: the conditioner assumes a requested change took
/// effect, since the engine offers no acknowledgment.
pub trait Transport: Send + Sync {
    /// Current statistics for `id`, or `None` if the engine has none this tick
    fn connection_stats(&self, id: ConnectionId) -> Option<ConnectionStats>;

    /// Set the video encoder bitrate in bits per second
    fn change_bitrate(&self, bits_per_second: u32);

    /// Ask the camera for a new frame rate range
    fn change_fps_range(&self, range: FpsRange);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srt_payload_excludes_headers() {
        let stats = ConnectionStats::Srt {
            pkt_snd_drop: 0,
            byte_sent_unique: 10_000,
            pkt_sent_unique: 10,
            mbps_bandwidth: 2.0,
        };
        assert_eq!(stats.payload_bytes(), 9_560);
        assert_eq!(stats.measured_rate(), Some(250_000.0));
    }

    #[test]
    fn test_rist_payload_from_packets() {
        let stats = ConnectionStats::Rist {
            quality: 100.0,
            sent: 3,
        };
        assert_eq!(stats.payload_bytes(), 3 * 1316);
        assert_eq!(stats.measured_rate(), None);
    }
}
