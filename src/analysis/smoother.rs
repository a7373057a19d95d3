// src/analysis/smoother.rs

use std::collections::VecDeque;

/// Sliding-window median over the tracked joint angle. A single outlier
/// frame from the pose estimator cannot flip a threshold on its own.
#[derive(Debug, Clone)]
pub struct AngleSmoother {
    history: VecDeque<f32>,
    window_size: usize,
}

impl AngleSmoother {
    /// `window_size` of 1 (or 0) passes values through unchanged.
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            history: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    pub fn smooth(&mut self, angle: f32) -> f32 {
        self.history.push_back(angle);

        // Maintain window size
        if self.history.len() > self.window_size {
            self.history.pop_front();
        }

        let mut values: Vec<f32> = self.history.iter().copied().collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values[values.len() / 2]
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn history_size(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_rejects_single_spike() {
        let mut smoother = AngleSmoother::new(3);
        smoother.smooth(160.0);
        smoother.smooth(161.0);
        // One bad frame reading 40°
        let smoothed = smoother.smooth(40.0);
        assert_eq!(smoothed, 160.0);
        assert_eq!(smoother.smooth(162.0), 161.0);
    }

    #[test]
    fn test_window_of_one_is_passthrough() {
        let mut smoother = AngleSmoother::new(1);
        assert_eq!(smoother.smooth(10.0), 10.0);
        assert_eq!(smoother.smooth(170.0), 170.0);
        assert_eq!(smoother.history_size(), 1);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut smoother = AngleSmoother::new(5);
        for a in [1.0, 2.0, 3.0] {
            smoother.smooth(a);
        }
        smoother.reset();
        assert_eq!(smoother.history_size(), 0);
        assert_eq!(smoother.smooth(90.0), 90.0);
    }
}
