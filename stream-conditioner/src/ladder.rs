//! Bitrate ladder
//!
//! An ascending table of fractions of the full bitrate plus the current
//! position. The position can never leave `[0, len - 1]`.

/// Bitrate ladder - ordered fractions of the session's full bitrate
#[derive(Debug, Clone)]
pub struct BitrateLadder {
    steps: Vec<f64>,
    current_index: usize,
    full_bitrate: u32,
}

impl BitrateLadder {
    /// Create a ladder positioned at `initial_index` (clamped into range)
    pub fn new(steps: Vec<f64>, initial_index: usize, full_bitrate: u32) -> Self {
        let last = steps.len().saturating_sub(1);
        Self {
            steps,
            current_index: initial_index.min(last),
            full_bitrate,
        }
    }

    /// Bitrate for a given ladder index, rounded to whole bits/sec
    pub fn bitrate_at(&self, index: usize) -> u32 {
        let fraction = self.steps.get(index).copied().unwrap_or(1.0);
        (self.full_bitrate as f64 * fraction).round() as u32
    }

    /// Bitrate for the current position
    pub fn current_bitrate(&self) -> u32 {
        self.bitrate_at(self.current_index)
    }

    pub fn can_step_down(&self) -> bool {
        self.current_index > 0
    }

    pub fn can_step_up(&self) -> bool {
        self.current_index + 1 < self.steps.len()
    }

    /// Move one step toward lower bitrate, returns the new bitrate
    pub fn step_down(&mut self) -> Option<u32> {
        if self.can_step_down() {
            self.current_index -= 1;
            Some(self.current_bitrate())
        } else {
            None
        }
    }

    /// Move one step toward higher bitrate, returns the new bitrate
    pub fn step_up(&mut self) -> Option<u32> {
        if self.can_step_up() {
            self.current_index += 1;
            Some(self.current_bitrate())
        } else {
            None
        }
    }

    /// Current position in the ladder (0 = lowest bitrate)
    pub fn position(&self) -> usize {
        self.current_index
    }

    pub fn full_bitrate(&self) -> u32 {
        self.full_bitrate
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[f64] {
        &self.steps
    }
}
