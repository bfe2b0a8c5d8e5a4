//! Adaptive bitrate and frame-rate conditioning for live video streams
//!
//! This crate watches transport-level loss on an outbound stream and steps
//! the encoder bitrate along a fixed ladder, with a grace period after each
//! change and escalating backoff before recovery. The camera frame rate
//! follows the bitrate when it falls well below full.
//!
//! # Components
//!
//! - [`ConditionerConfig`]: Ladder, timing and frame rate policy
//! - [`BandwidthEstimator`]: Per-connection throughput estimate from byte counters
//! - [`LossLedger`] and [`BitrateLedger`]: Loss and bitrate histories
//! - [`SampleCollector`]: Folds per-protocol stats into one loss sample per tick
//! - [`LadderController`]: Ladder stepping decisions
//! - [`FrameRateGovernor`]: Frame rate range selection
//! - [`ConditionerSupervisor`]: Session lifecycle and tick scheduling

mod bandwidth;
mod camera;
mod collector;
mod config;
mod controller;
mod error;
mod framerate;
mod ladder;
mod ledger;
mod state;
mod stats;
mod supervisor;
mod transport;

pub use bandwidth::{BandwidthEstimator, BandwidthWindow};
pub use camera::{CameraCapabilities, FpsRange};
pub use collector::SampleCollector;
pub use config::{ConditionerConfig, FrameRatePolicy, LadderPolicy};
pub use controller::{Decision, LadderController};
pub use error::ConditionerError;
pub use framerate::FrameRateGovernor;
pub use ladder::BitrateLadder;
pub use ledger::{BitrateChange, BitrateLedger, LossLedger, LossSample};
pub use state::{ConditionerSnapshot, ConditionerState};
pub use stats::{
    format_bandwidth, format_bytes, format_duration, ConnectionReport, ConnectionStatistics,
};
pub use supervisor::ConditionerSupervisor;
pub use transport::{ConnectionId, ConnectionStats, Transport};
