//! Camera frame-rate capabilities

use serde::{Deserialize, Serialize};

/// Inclusive frame rate range supported by the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpsRange {
    pub min: u32,
    pub max: u32,
}

impl FpsRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, fps: f64) -> bool {
        self.min as f64 <= fps && fps <= self.max as f64
    }
}

/// What the capture device can do, supplied when the session is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCapabilities {
    pub max_fps: f64,
    /// Supported ranges in the order the device enumerates them
    pub fps_ranges: Vec<FpsRange>,
}

impl CameraCapabilities {
    pub fn new(max_fps: f64, fps_ranges: Vec<FpsRange>) -> Self {
        Self {
            max_fps,
            fps_ranges,
        }
    }

    /// Find the supported range closest to `target`.
    ///
    /// Distance is `(max - target)^2 + |min - target|`. Ties keep the
    /// earliest range.
    /// With `strict`, ranges that do not contain `target` are skipped.
    pub fn find_nearest_fps_range(&self, target: f64, strict: bool) -> Option<FpsRange> {
        let mut min_distance = f64::MAX;
        let mut nearest = None;
        for range in &self.fps_ranges {
            if strict && !range.contains(target) {
                continue;
            }
            let over = range.max as f64 - target;
            let distance = over * over + (range.min as f64 - target).abs();
            if distance < min_distance {
                nearest = Some(*range);
                if distance < 0.01 {
                    break;
                }
                min_distance = distance;
            }
        }
        nearest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraCapabilities {
        CameraCapabilities::new(
            30.0,
            vec![
                FpsRange::new(15, 15),
                FpsRange::new(7, 30),
                FpsRange::new(20, 20),
                FpsRange::new(30, 30),
            ],
        )
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(
            camera().find_nearest_fps_range(30.0, false),
            Some(FpsRange::new(30, 30))
        );
        assert_eq!(
            camera().find_nearest_fps_range(15.0, false),
            Some(FpsRange::new(15, 15))
        );
    }

    #[test]
    fn test_max_end_weighted() {
        // target 17: 15-15 scores 4 + 2, 20-20 scores 9 + 3
        assert_eq!(
            camera().find_nearest_fps_range(17.0, false),
            Some(FpsRange::new(15, 15))
        );
    }

    #[test]
    fn test_tie_keeps_first() {
        let camera = CameraCapabilities::new(
            30.0,
            vec![FpsRange::new(24, 24), FpsRange::new(24, 24)],
        );
        assert_eq!(
            camera.find_nearest_fps_range(25.0, false),
            Some(FpsRange::new(24, 24))
        );
    }

    #[test]
    fn test_strict_requires_containment() {
        assert_eq!(
            camera().find_nearest_fps_range(25.0, true),
            Some(FpsRange::new(7, 30))
        );
        let empty = CameraCapabilities::new(30.0, vec![]);
        assert_eq!(empty.find_nearest_fps_range(25.0, false), None);
    }
}
