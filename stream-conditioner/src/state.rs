//! Per-session conditioner state and the work done on each tick

use std::time::Duration;

use crate::camera::{CameraCapabilities, FpsRange};
use crate::collector::SampleCollector;
use crate::config::ConditionerConfig;
use crate::controller::{Decision, LadderController};
use crate::framerate::FrameRateGovernor;
use crate::ledger::{BitrateLedger, LossLedger};
use crate::stats::ConnectionReport;
use crate::transport::{ConnectionId, Transport};

/// Point-in-time view of a session, for status displays and tests
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionerSnapshot {
    pub full_bitrate: u32,
    pub bitrate: u32,
    pub ladder_index: usize,
    pub fps: f64,
    pub fps_range: FpsRange,
    pub running: bool,
    pub loss_samples: usize,
    pub bitrate_changes: usize,
    pub connections: Vec<ConnectionReport>,
}

/// Everything one streaming session owns. Only the supervisor mutates it.
#[derive(Debug)]
pub struct ConditionerState {
    full_bitrate: u32,
    controller: LadderController,
    collector: SampleCollector,
    governor: FrameRateGovernor,
}

impl ConditionerState {
    /// Fresh session at session time `now`, positioned at the initial rung
    pub fn new(
        config: &ConditionerConfig,
        camera: CameraCapabilities,
        full_bitrate: u32,
        now: Duration,
    ) -> Self {
        let mut collector =
            SampleCollector::new(config.bandwidth_window_capacity(), config.tick_interval());
        collector.reset(now);

        Self {
            full_bitrate,
            controller: LadderController::new(&config.ladder, full_bitrate, now),
            collector,
            governor: FrameRateGovernor::new(config.framerate.clone(), camera),
        }
    }

    /// One tick: sample loss, decide, then adjust frame rate.
    ///
    /// Without registered connections the tick is a no-op.
    pub fn tick(&mut self, now: Duration, transport: &dyn Transport) -> Decision {
        let Some(sample) = self.collector.collect(now, transport) else {
            return Decision::Hold;
        };
        tracing::debug!(
            audio_lost = sample.audio_lost,
            video_lost = sample.video_lost,
            "Loss sample"
        );

        let decision = self.controller.on_tick(now, self.collector.ledger());
        if let Some(bitrate) = decision.bitrate() {
            transport.change_bitrate(bitrate);
        }

        if let Some(range) = self
            .governor
            .update(self.controller.current_bitrate(), self.full_bitrate)
        {
            transport.change_fps_range(range);
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            for report in self.collector.reports() {
                tracing::debug!("{}", report);
            }
        }

        decision
    }

    /// Put the camera back to its full frame rate if it was reduced.
    /// Returns true if a range change was sent.
    pub fn restore_full_fps(&mut self, transport: &dyn Transport) -> bool {
        if !self.governor.is_reduced() {
            return false;
        }
        match self.governor.update(self.full_bitrate, self.full_bitrate) {
            Some(range) => {
                transport.change_fps_range(range);
                true
            }
            None => false,
        }
    }

    /// Forget frame rate reductions without telling the camera
    pub fn reset_fps(&mut self) {
        self.governor.reset_to_max();
    }

    /// Register a connection, taking its current counters as the baseline
    pub fn add_connection(
        &mut self,
        id: ConnectionId,
        now: Duration,
        transport: &dyn Transport,
    ) -> bool {
        self.collector.add_connection(id, now, transport)
    }

    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        self.collector.remove_connection(id)
    }

    pub fn clear_connections(&mut self) {
        self.collector.clear_connections();
    }

    pub fn current_bitrate(&self) -> u32 {
        self.controller.current_bitrate()
    }

    pub fn full_bitrate(&self) -> u32 {
        self.full_bitrate
    }

    pub fn connection_count(&self) -> usize {
        self.collector.connection_count()
    }

    pub fn loss_ledger(&self) -> &LossLedger {
        self.collector.ledger()
    }

    pub fn bitrate_ledger(&self) -> &BitrateLedger {
        self.controller.history()
    }

    pub fn governor(&self) -> &FrameRateGovernor {
        &self.governor
    }

    pub fn snapshot(&self, running: bool) -> ConditionerSnapshot {
        ConditionerSnapshot {
            full_bitrate: self.full_bitrate,
            bitrate: self.controller.current_bitrate(),
            ladder_index: self.controller.ladder_position(),
            fps: self.governor.current_fps(),
            fps_range: self.governor.current_range(),
            running,
            loss_samples: self.collector.ledger().len(),
            bitrate_changes: self.controller.history().len(),
            connections: self.collector.reports(),
        }
    }
}
