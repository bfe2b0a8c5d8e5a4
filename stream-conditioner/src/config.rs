//! Configuration types for the stream conditioner
//!
//! All time values are stored in milliseconds so they read naturally in TOML,
//! and are exposed as [`Duration`] through accessor methods.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConditionerError;

/// Bitrate ladder and the time windows that gate movement along it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderPolicy {
    /// Ascending fractions of the full bitrate
    #[serde(default = "default_steps")]
    pub steps: Vec<f64>,

    /// Ladder index used when a session starts
    #[serde(default = "default_initial_step")]
    pub initial_step: usize,

    /// Loss observed this soon after a bitrate change is blamed on the change
    #[serde(default = "default_normalization_delay")]
    pub normalization_delay_ms: u64,

    /// How far back loss is accumulated when deciding to step down
    #[serde(default = "default_lost_estimate_interval")]
    pub lost_estimate_interval_ms: u64,

    /// Step down once lost units reach `bitrate / lost_tolerance_divisor`
    #[serde(default = "default_lost_tolerance_divisor")]
    pub lost_tolerance_divisor: u64,

    /// Drops closer together than this count as a single congestion episode.
    /// Derived from the ladder length when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_merge_interval_ms: Option<u64>,

    /// Quiet time required after the 1st, 2nd, ... most recent drop
    #[serde(default = "default_recovery_attempt_intervals")]
    pub recovery_attempt_intervals_ms: Vec<u64>,
}

fn default_steps() -> Vec<f64> {
    vec![0.2, 0.25, 1.0 / 3.0, 0.45, 0.6, 0.78, 1.0]
}

fn default_initial_step() -> usize {
    2
}

fn default_normalization_delay() -> u64 {
    2_000
}

fn default_lost_estimate_interval() -> u64 {
    10_000
}

fn default_lost_tolerance_divisor() -> u64 {
    300_000
}

fn default_recovery_attempt_intervals() -> Vec<u64> {
    vec![15_000, 60_000, 180_000]
}

impl Default for LadderPolicy {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            initial_step: default_initial_step(),
            normalization_delay_ms: default_normalization_delay(),
            lost_estimate_interval_ms: default_lost_estimate_interval(),
            lost_tolerance_divisor: default_lost_tolerance_divisor(),
            drop_merge_interval_ms: None,
            recovery_attempt_intervals_ms: default_recovery_attempt_intervals(),
        }
    }
}

impl LadderPolicy {
    pub fn normalization_delay(&self) -> Duration {
        Duration::from_millis(self.normalization_delay_ms)
    }

    pub fn lost_estimate_interval(&self) -> Duration {
        Duration::from_millis(self.lost_estimate_interval_ms)
    }

    /// Merge window for drop events: `steps * normalization_delay * 2` unless set
    pub fn drop_merge_interval(&self) -> Duration {
        let ms = self.drop_merge_interval_ms.unwrap_or_else(|| {
            self.steps.len() as u64 * self.normalization_delay_ms * 2
        });
        Duration::from_millis(ms)
    }

    pub fn recovery_attempt_intervals(&self) -> Vec<Duration> {
        self.recovery_attempt_intervals_ms
            .iter()
            .map(|&ms| Duration::from_millis(ms))
            .collect()
    }

    fn validate(&self) -> Result<(), ConditionerError> {
        if self.steps.is_empty() {
            return Err(invalid("ladder.steps must not be empty"));
        }
        if self.steps.iter().any(|&s| !(s > 0.0 && s <= 1.0)) {
            return Err(invalid("ladder.steps must lie in (0, 1]"));
        }
        if self.steps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("ladder.steps must be strictly ascending"));
        }
        if self.initial_step >= self.steps.len() {
            return Err(invalid(format!(
                "ladder.initial_step {} is outside a ladder of {} steps",
                self.initial_step,
                self.steps.len()
            )));
        }
        if self.lost_tolerance_divisor == 0 {
            return Err(invalid("ladder.lost_tolerance_divisor must be positive"));
        }
        if self.recovery_attempt_intervals_ms.is_empty() {
            return Err(invalid("ladder.recovery_attempt_intervals_ms must not be empty"));
        }
        if self
            .recovery_attempt_intervals_ms
            .windows(2)
            .any(|w| w[0] > w[1])
        {
            return Err(invalid(
                "ladder.recovery_attempt_intervals_ms must be ascending",
            ));
        }
        Ok(())
    }
}

/// Frame rate reduction policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRatePolicy {
    /// Frame rate is reduced only when bitrate/full drops below this ratio
    #[serde(default = "default_reduce_below_ratio")]
    pub reduce_below_ratio: f64,

    /// Lowest frame rate the governor will ask for
    #[serde(default = "default_min_reduced_fps")]
    pub min_reduced_fps: f64,

    /// Reduced frame rates are multiples of this value
    #[serde(default = "default_fps_step")]
    pub fps_step: f64,

    /// Candidates closer than this to the current fps are ignored
    #[serde(default = "default_hysteresis_fps")]
    pub hysteresis_fps: f64,
}

fn default_reduce_below_ratio() -> f64 {
    0.5
}

fn default_min_reduced_fps() -> f64 {
    15.0
}

fn default_fps_step() -> f64 {
    5.0
}

fn default_hysteresis_fps() -> f64 {
    1.0
}

impl Default for FrameRatePolicy {
    fn default() -> Self {
        Self {
            reduce_below_ratio: default_reduce_below_ratio(),
            min_reduced_fps: default_min_reduced_fps(),
            fps_step: default_fps_step(),
            hysteresis_fps: default_hysteresis_fps(),
        }
    }
}

/// Stream conditioner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionerConfig {
    /// Delay before the first tick after start/resume (default: 2000)
    #[serde(default = "default_tick_delay")]
    pub tick_delay_ms: u64,

    /// Time between the end of one tick and the start of the next (default: 2000)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Span of byte deltas kept per connection for bandwidth estimation (default: 5000)
    #[serde(default = "default_bandwidth_window")]
    pub bandwidth_window_ms: u64,

    #[serde(default)]
    pub ladder: LadderPolicy,

    #[serde(default)]
    pub framerate: FrameRatePolicy,
}

fn default_tick_delay() -> u64 {
    2_000
}

fn default_tick_interval() -> u64 {
    2_000
}

fn default_bandwidth_window() -> u64 {
    5_000
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            tick_delay_ms: default_tick_delay(),
            tick_interval_ms: default_tick_interval(),
            bandwidth_window_ms: default_bandwidth_window(),
            ladder: LadderPolicy::default(),
            framerate: FrameRatePolicy::default(),
        }
    }
}

impl ConditionerConfig {
    /// Load config from a TOML file
    pub fn load_from(path: &Path) -> Result<Self, ConditionerError> {
        if !path.exists() {
            return Err(ConditionerError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConditionerError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file
    pub fn save_to(&self, path: &Path) -> Result<(), ConditionerError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConditionerError> {
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms must be positive"));
        }
        if self.framerate.fps_step <= 0.0 {
            return Err(invalid("framerate.fps_step must be positive"));
        }
        self.ladder.validate()
    }

    pub fn tick_delay(&self) -> Duration {
        Duration::from_millis(self.tick_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Number of per-tick deltas kept in each connection's bandwidth window
    pub fn bandwidth_window_capacity(&self) -> usize {
        let per_tick = self.tick_delay_ms.max(1);
        ((self.bandwidth_window_ms / per_tick) as usize).max(1)
    }
}

fn invalid(msg: impl Into<String>) -> ConditionerError {
    ConditionerError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConditionerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ladder.steps.len(), 7);
        assert_eq!(config.ladder.drop_merge_interval(), Duration::from_millis(28_000));
        assert_eq!(config.bandwidth_window_capacity(), 2);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ConditionerConfig::from_toml_str(
            r#"
            tick_interval_ms = 500

            [ladder]
            recovery_attempt_intervals_ms = [10000, 20000]
            "#,
        )
        .unwrap();

        assert_eq!(config.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.tick_delay(), Duration::from_millis(2_000));
        assert_eq!(config.ladder.initial_step, 2);
        assert_eq!(
            config.ladder.recovery_attempt_intervals(),
            vec![Duration::from_secs(10), Duration::from_secs(20)]
        );
    }

    #[test]
    fn test_rejects_descending_ladder() {
        let result = ConditionerConfig::from_toml_str(
            r#"
            [ladder]
            steps = [0.5, 0.25, 1.0]
            initial_step = 0
            "#,
        );
        assert!(matches!(result, Err(ConditionerError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_initial_step_out_of_range() {
        let mut config = ConditionerConfig::default();
        config.ladder.initial_step = 7;
        assert!(matches!(
            config.validate(),
            Err(ConditionerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conditioner.toml");

        let mut config = ConditionerConfig::default();
        config.ladder.drop_merge_interval_ms = Some(12_000);
        config.save_to(&path).unwrap();

        let loaded = ConditionerConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.ladder.drop_merge_interval(), Duration::from_secs(12));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConditionerConfig::load_from(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConditionerError::NotFound(_))));
    }
}
