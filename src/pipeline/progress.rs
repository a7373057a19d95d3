// src/pipeline/progress.rs

use serde::Serialize;
use tokio::sync::watch;

/// Latest state of a batch run, published on a watch channel so a slow
/// observer only ever sees the newest value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchProgress {
    pub frames_processed: u64,
    pub total_frames: Option<u64>,
    /// 0.0 - 1.0, None while the total is unknown.
    pub fraction: Option<f32>,
    pub reps_so_far: u32,
    pub finished: bool,
}

impl BatchProgress {
    pub fn new(frames_processed: u64, total_frames: Option<u64>, reps_so_far: u32) -> Self {
        let fraction = total_frames
            .filter(|total| *total > 0)
            .map(|total| (frames_processed as f32 / total as f32).min(1.0));
        Self {
            frames_processed,
            total_frames,
            fraction,
            reps_so_far,
            finished: false,
        }
    }

    pub fn percent(&self) -> Option<f32> {
        self.fraction.map(|f| f * 100.0)
    }
}

pub fn progress_channel() -> (watch::Sender<BatchProgress>, watch::Receiver<BatchProgress>) {
    watch::channel(BatchProgress::default())
}
