// src/pipeline/metrics.rs
//
// Counters for one batch run or one live controller. Cheap to clone and
// share between tasks; read out with summary().

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub frames_read: Arc<AtomicU64>,
    pub frames_analyzed: Arc<AtomicU64>,
    pub ticks_without_pose: Arc<AtomicU64>,
    pub estimator_errors: Arc<AtomicU64>,
    pub reps_detected: Arc<AtomicU64>,
    pub frames_annotated: Arc<AtomicU64>,
    pub ticks_dropped: Arc<AtomicU64>,
    pub analysis_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            frames_read: Arc::new(AtomicU64::new(0)),
            frames_analyzed: Arc::new(AtomicU64::new(0)),
            ticks_without_pose: Arc::new(AtomicU64::new(0)),
            estimator_errors: Arc::new(AtomicU64::new(0)),
            reps_detected: Arc::new(AtomicU64::new(0)),
            frames_annotated: Arc::new(AtomicU64::new(0)),
            ticks_dropped: Arc::new(AtomicU64::new(0)),
            analysis_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.frames_read.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let analyzed = self.frames_analyzed.load(Ordering::Relaxed);
        let analysis_us = self.analysis_time_us.load(Ordering::Relaxed);
        MetricsSummary {
            frames_read: self.frames_read.load(Ordering::Relaxed),
            frames_analyzed: analyzed,
            ticks_without_pose: self.ticks_without_pose.load(Ordering::Relaxed),
            estimator_errors: self.estimator_errors.load(Ordering::Relaxed),
            reps_detected: self.reps_detected.load(Ordering::Relaxed),
            frames_annotated: self.frames_annotated.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            avg_analysis_us: if analyzed > 0 { analysis_us / analyzed } else { 0 },
            fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub frames_read: u64,
    pub frames_analyzed: u64,
    pub ticks_without_pose: u64,
    pub estimator_errors: u64,
    pub reps_detected: u64,
    pub frames_annotated: u64,
    pub ticks_dropped: u64,
    pub avg_analysis_us: u64,
    pub fps: f64,
    pub elapsed_secs: f64,
}
