//! Frame rate governor
//!
//! Lowers the camera frame rate when the bitrate drops well below full, so
//! each frame keeps a usable share of the bits.

use crate::camera::{CameraCapabilities, FpsRange};
use crate::config::FrameRatePolicy;

#[derive(Debug, Clone)]
pub struct FrameRateGovernor {
    policy: FrameRatePolicy,
    camera: CameraCapabilities,
    current_fps: f64,
    current_range: FpsRange,
}

impl FrameRateGovernor {
    pub fn new(policy: FrameRatePolicy, camera: CameraCapabilities) -> Self {
        let current_range = Self::full_range(&camera);
        Self {
            current_fps: camera.max_fps,
            policy,
            camera,
            current_range,
        }
    }

    fn full_range(camera: &CameraCapabilities) -> FpsRange {
        camera
            .find_nearest_fps_range(camera.max_fps.round(), false)
            .unwrap_or_else(|| {
                let max = camera.max_fps.round() as u32;
                FpsRange::new(max, max)
            })
    }

    /// Frame rate to aim for at `bitrate` out of `full_bitrate`
    pub fn candidate_fps(&self, bitrate: u32, full_bitrate: u32) -> f64 {
        let max_fps = self.camera.max_fps;
        if full_bitrate == 0 {
            return max_fps;
        }
        let ratio = bitrate as f64 / full_bitrate as f64;
        if ratio >= self.policy.reduce_below_ratio {
            return max_fps;
        }
        let step = self.policy.fps_step;
        let scaled = max_fps * ratio / self.policy.reduce_below_ratio / step;
        (scaled.floor() * step).max(self.policy.min_reduced_fps)
    }

    /// Recompute the target frame rate. Returns the range to request from
    /// the camera, or `None` when nothing needs to change.
    pub fn update(&mut self, bitrate: u32, full_bitrate: u32) -> Option<FpsRange> {
        if self.camera.fps_ranges.is_empty() {
            return None;
        }

        let candidate = self.candidate_fps(bitrate, full_bitrate);
        if (candidate - self.current_fps).abs() < self.policy.hysteresis_fps {
            return None;
        }
        self.current_fps = candidate;

        let range = self
            .camera
            .find_nearest_fps_range(candidate.round(), false)
            .unwrap_or(FpsRange::new(0, 0));
        if range == self.current_range {
            tracing::debug!(fps = candidate, ?range, "Fps range already active");
            return None;
        }

        tracing::info!(
            fps = candidate,
            min = range.min,
            max = range.max,
            "Frame rate range change"
        );
        self.current_range = range;
        Some(range)
    }

    /// Forget any reduction, as after the camera was restarted
    pub fn reset_to_max(&mut self) {
        self.current_fps = self.camera.max_fps;
        self.current_range = Self::full_range(&self.camera);
    }

    /// Whether the current target is below the camera maximum
    pub fn is_reduced(&self) -> bool {
        self.current_fps < self.camera.max_fps
    }

    pub fn current_fps(&self) -> f64 {
        self.current_fps
    }

    pub fn current_range(&self) -> FpsRange {
        self.current_range
    }

    pub fn max_fps(&self) -> f64 {
        self.camera.max_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: u32 = 3_000_000;

    fn camera() -> CameraCapabilities {
        CameraCapabilities::new(
            30.0,
            vec![
                FpsRange::new(15, 15),
                FpsRange::new(20, 20),
                FpsRange::new(25, 25),
                FpsRange::new(30, 30),
            ],
        )
    }

    fn governor() -> FrameRateGovernor {
        FrameRateGovernor::new(FrameRatePolicy::default(), camera())
    }

    #[test]
    fn test_candidate_fps() {
        let governor = governor();
        assert_eq!(governor.candidate_fps(FULL, FULL), 30.0);
        assert_eq!(governor.candidate_fps(FULL / 2, FULL), 30.0);
        // 30 * 0.45 * 2 / 5 = 5.4 -> 25
        assert_eq!(governor.candidate_fps(1_350_000, FULL), 25.0);
        // 30 * 0.2 * 2 / 5 = 2.4 -> 10, floored at 15
        assert_eq!(governor.candidate_fps(600_000, FULL), 15.0);
    }

    #[test]
    fn test_full_bitrate_keeps_max_range() {
        let mut governor = governor();
        assert_eq!(governor.current_range(), FpsRange::new(30, 30));
        assert_eq!(governor.update(FULL, FULL), None);
        assert!(!governor.is_reduced());
    }

    #[test]
    fn test_reduce_and_restore() {
        let mut governor = governor();
        assert_eq!(
            governor.update(1_350_000, FULL),
            Some(FpsRange::new(25, 25))
        );
        assert!(governor.is_reduced());
        // Same candidate again is within hysteresis
        assert_eq!(governor.update(1_350_000, FULL), None);

        assert_eq!(governor.update(600_000, FULL), Some(FpsRange::new(15, 15)));
        assert_eq!(governor.update(FULL, FULL), Some(FpsRange::new(30, 30)));
        assert_eq!(governor.current_fps(), 30.0);
    }

    #[test]
    fn test_same_range_suppresses_call() {
        let camera = CameraCapabilities::new(30.0, vec![FpsRange::new(7, 30)]);
        let mut governor = FrameRateGovernor::new(FrameRatePolicy::default(), camera);
        assert_eq!(governor.update(600_000, FULL), None);
        assert_eq!(governor.current_fps(), 15.0);
        assert_eq!(governor.update(FULL, FULL), None);
        assert_eq!(governor.current_fps(), 30.0);
    }

    #[test]
    fn test_no_ranges_is_noop() {
        let camera = CameraCapabilities::new(30.0, vec![]);
        let mut governor = FrameRateGovernor::new(FrameRatePolicy::default(), camera);
        assert_eq!(governor.update(600_000, FULL), None);
        assert_eq!(governor.current_fps(), 30.0);
    }

    #[test]
    fn test_reset_to_max() {
        let mut governor = governor();
        governor.update(600_000, FULL);
        governor.reset_to_max();
        assert_eq!(governor.current_fps(), 30.0);
        assert_eq!(governor.current_range(), FpsRange::new(30, 30));
    }
}
