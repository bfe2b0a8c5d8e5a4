//! Ladder controller
//!
//! Decides, once per tick, whether the encoder bitrate steps down, holds or
//! steps up. Loss right after a change is blamed on the change; recovery is
//! gated by an escalating backoff keyed on recent drop episodes.

use std::time::Duration;

use crate::config::LadderPolicy;
use crate::ladder::BitrateLadder;
use crate::ledger::{BitrateChange, BitrateLedger, LossLedger};

/// Outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep the current bitrate
    Hold,
    /// Moved one rung down the ladder
    StepDown { bitrate: u32, index: usize },
    /// Moved one rung up the ladder
    StepUp { bitrate: u32, index: usize },
}

impl Decision {
    /// The new bitrate, if this decision changed it
    pub fn bitrate(&self) -> Option<u32> {
        match *self {
            Decision::Hold => None,
            Decision::StepDown { bitrate, .. } | Decision::StepUp { bitrate, .. } => Some(bitrate),
        }
    }
}

/// Time windows and tolerances taken from [`LadderPolicy`]
#[derive(Debug, Clone)]
struct Timing {
    normalization_delay: Duration,
    lost_estimate_interval: Duration,
    lost_tolerance_divisor: u64,
    drop_merge_interval: Duration,
    recovery_attempt_intervals: Vec<Duration>,
}

/// Ladder-stepping bitrate controller for one session
#[derive(Debug)]
pub struct LadderController {
    ladder: BitrateLadder,
    history: BitrateLedger,
    timing: Timing,
}

impl LadderController {
    /// Create a controller for a session started at `now`. The bitrate
    /// history is seeded with the initial rung.
    pub fn new(policy: &LadderPolicy, full_bitrate: u32, now: Duration) -> Self {
        let ladder = BitrateLadder::new(policy.steps.clone(), policy.initial_step, full_bitrate);
        let mut history = BitrateLedger::new();
        history.push(BitrateChange::new(now, ladder.current_bitrate()));

        Self {
            ladder,
            history,
            timing: Timing {
                normalization_delay: policy.normalization_delay(),
                lost_estimate_interval: policy.lost_estimate_interval(),
                lost_tolerance_divisor: policy.lost_tolerance_divisor.max(1),
                drop_merge_interval: policy.drop_merge_interval(),
                recovery_attempt_intervals: policy.recovery_attempt_intervals(),
            },
        }
    }

    /// Evaluate the newest loss sample against the one before it.
    ///
    /// Never touches a transport; the caller applies the returned decision.
    pub fn on_tick(&mut self, now: Duration, losses: &LossLedger) -> Decision {
        let (Some(latest), Some(previous)) = (losses.last(), losses.previous()) else {
            return Decision::Hold;
        };
        let Some(&last_change) = self.history.last() else {
            return Decision::Hold;
        };

        if latest.exceeds(previous) {
            if !self.ladder.can_step_down() {
                tracing::debug!(bitrate = last_change.bitrate, "Loss at lowest rung, holding");
                return Decision::Hold;
            }

            let since_change = now.saturating_sub(last_change.timestamp);
            if since_change < self.timing.normalization_delay {
                tracing::debug!(
                    since_change_ms = since_change.as_millis() as u64,
                    "Loss within normalization delay, ignoring"
                );
                return Decision::Hold;
            }

            let lookback = (last_change.timestamp + self.timing.normalization_delay)
                .max(now.saturating_sub(self.timing.lost_estimate_interval));
            let tolerance = last_change.bitrate as u64 / self.timing.lost_tolerance_divisor;
            let lost = losses.lost_since(lookback);
            if lost < tolerance {
                tracing::debug!(lost, tolerance, "Loss below tolerance");
                return Decision::Hold;
            }

            match self.ladder.step_down() {
                Some(bitrate) => {
                    self.history.push(BitrateChange::new(now, bitrate));
                    tracing::info!(
                        from = last_change.bitrate,
                        to = bitrate,
                        index = self.ladder.position(),
                        lost,
                        tolerance,
                        "Bitrate step down"
                    );
                    Decision::StepDown {
                        bitrate,
                        index: self.ladder.position(),
                    }
                }
                None => Decision::Hold,
            }
        } else if latest.same_counts(previous) {
            if last_change.bitrate >= self.ladder.full_bitrate() || !self.can_recover(now) {
                return Decision::Hold;
            }

            match self.ladder.step_up() {
                Some(bitrate) => {
                    self.history.push(BitrateChange::new(now, bitrate));
                    tracing::info!(
                        from = last_change.bitrate,
                        to = bitrate,
                        index = self.ladder.position(),
                        "Bitrate step up"
                    );
                    Decision::StepUp {
                        bitrate,
                        index: self.ladder.position(),
                    }
                }
                None => Decision::Hold,
            }
        } else {
            // Aggregate went backwards: a connection left the set
            tracing::debug!("Loss counters reset, holding");
            Decision::Hold
        }
    }

    /// Whether enough quiet time has passed since recent drops.
    ///
    /// Walks the bitrate history newest-first. Drops within the merge
    /// interval of an already counted drop belong to the same episode. The
    /// j-th episode must be older than `recovery_attempt_intervals[j]`.
    pub fn can_recover(&self, now: Duration) -> bool {
        let intervals = &self.timing.recovery_attempt_intervals;
        let Some(&longest) = intervals.last() else {
            return true;
        };

        let mut drops = 0usize;
        let mut prev_drop: Option<Duration> = None;
        for pair in self.history.changes().windows(2).rev() {
            let (earlier, later) = (pair[0], pair[1]);
            let age = now.saturating_sub(later.timestamp);

            if later.bitrate < earlier.bitrate {
                if let Some(prev) = prev_drop {
                    if prev.saturating_sub(later.timestamp) < self.timing.drop_merge_interval {
                        continue;
                    }
                }
                if let Some(&required) = intervals.get(drops) {
                    if age <= required {
                        return false;
                    }
                }
                drops += 1;
                prev_drop = Some(later.timestamp);
            }

            if drops == intervals.len() || age >= longest {
                break;
            }
        }
        true
    }

    /// Bitrate most recently applied
    pub fn current_bitrate(&self) -> u32 {
        self.history
            .last()
            .map(|change| change.bitrate)
            .unwrap_or_else(|| self.ladder.current_bitrate())
    }

    pub fn full_bitrate(&self) -> u32 {
        self.ladder.full_bitrate()
    }

    pub fn ladder_position(&self) -> usize {
        self.ladder.position()
    }

    pub fn ladder_size(&self) -> usize {
        self.ladder.len()
    }

    pub fn history(&self) -> &BitrateLedger {
        &self.history
    }
}
