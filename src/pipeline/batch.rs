// src/pipeline/batch.rs
//
// Offline pipeline: read every frame, analyse every Nth one, optionally
// write an annotated copy of each frame, return the session summary.

use super::metrics::{MetricsSummary, PipelineMetrics};
use super::progress::BatchProgress;
use super::session::{AnalysisSession, SessionSummary};
use crate::error::{AnalysisError, AnalysisResult};
use crate::exercise::{ExerciseProfile, ExerciseRegistry};
use crate::pose_track::PoseEstimator;
use crate::render::FrameAnnotator;
use crate::types::{BatchConfig, Config, Frame, Pose};
use crate::video_processor::{
    annotated_output_path, create_sink, open_source, FrameSink, FrameSource,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub sample_stride: usize,
    pub annotate: bool,
    pub progress_interval_frames: u64,
    pub carry_pose_between_samples: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from(&BatchConfig::default())
    }
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            sample_stride: config.sample_stride,
            annotate: config.annotate,
            progress_interval_frames: config.progress_interval_frames,
            carry_pose_between_samples: config.carry_pose_between_samples,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// Set when annotation was on.
    pub output_path: Option<PathBuf>,
    pub summary: SessionSummary,
    pub metrics: MetricsSummary,
}

pub struct BatchPipeline {
    config: Config,
    registry: Arc<ExerciseRegistry>,
}

impl BatchPipeline {
    pub fn new(config: Config) -> AnalysisResult<Self> {
        let registry = Arc::new(ExerciseRegistry::from_config(&config)?);
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: Config, registry: Arc<ExerciseRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn registry(&self) -> &Arc<ExerciseRegistry> {
        &self.registry
    }

    /// Analyses the image sequence or video at `input_path`. Annotated
    /// output goes under `video.output_dir`.
    ///
    /// Fails before reading any frame if the exercise is unknown, the input
    /// cannot be opened or the output cannot be created.
    pub fn process_video(
        &self,
        input_path: &Path,
        exercise_id: &str,
        options: &BatchOptions,
        estimator: &mut dyn PoseEstimator,
        progress: Option<&watch::Sender<BatchProgress>>,
        cancel: &CancellationToken,
    ) -> AnalysisResult<BatchOutcome> {
        let profile = self.registry.resolve(exercise_id)?;

        let mut source = open_source(input_path, self.config.video.default_fps).map_err(|e| {
            AnalysisError::InputUnreadable {
                path: input_path.to_path_buf(),
                reason: format!("{e:#}"),
            }
        })?;

        let mut sink = if options.annotate {
            let output = annotated_output_path(input_path, Path::new(&self.config.video.output_dir));
            let sink = create_sink(&output, source.info()).map_err(|e| {
                AnalysisError::OutputUnwritable {
                    path: output.clone(),
                    reason: format!("{e:#}"),
                }
            })?;
            Some(sink)
        } else {
            None
        };

        info!(
            "🏋️ Processing {} as {}",
            input_path.display(),
            profile.label()
        );

        let sink: Option<&mut dyn FrameSink> = match sink.as_mut() {
            Some(sink) => Some(&mut **sink),
            None => None,
        };
        self.run(
            profile,
            source.as_mut(),
            sink,
            options,
            estimator,
            progress,
            cancel,
        )
    }

    /// Same as `process_video` over caller-supplied frame I/O.
    #[allow(clippy::too_many_arguments)]
    pub fn process_stream(
        &self,
        source: &mut dyn FrameSource,
        sink: Option<&mut dyn FrameSink>,
        exercise_id: &str,
        options: &BatchOptions,
        estimator: &mut dyn PoseEstimator,
        progress: Option<&watch::Sender<BatchProgress>>,
        cancel: &CancellationToken,
    ) -> AnalysisResult<BatchOutcome> {
        let profile = self.registry.resolve(exercise_id)?;
        self.run(profile, source, sink, options, estimator, progress, cancel)
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        profile: Arc<ExerciseProfile>,
        source: &mut dyn FrameSource,
        mut sink: Option<&mut dyn FrameSink>,
        options: &BatchOptions,
        estimator: &mut dyn PoseEstimator,
        progress: Option<&watch::Sender<BatchProgress>>,
        cancel: &CancellationToken,
    ) -> AnalysisResult<BatchOutcome> {
        let stride = options.sample_stride.max(1) as u64;
        let progress_interval = options.progress_interval_frames.max(1);
        let total_frames = source.info().total_frames;
        let label = profile.label().to_string();

        let vertices = profile.angle.triples.iter().map(|triple| triple[1]).collect();
        let annotator = FrameAnnotator::new(self.config.overlay.clone(), profile.min_visibility)
            .with_angle_vertices(vertices);
        let mut session = AnalysisSession::new(Arc::clone(&profile), &self.config.analysis);
        let metrics = PipelineMetrics::new();

        let mut last_pose: Option<Pose> = None;
        let mut last_angle: Option<f32> = None;
        let mut frames: u64 = 0;
        let mut reps: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                info!("🛑 Cancelled after {} frames", frames);
                return Err(AnalysisError::Cancelled { frames });
            }

            let frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => return Err(AnalysisError::FrameStream(e)),
            };
            metrics.inc(&metrics.frames_read);

            let sampled = frame.index % stride == 0;
            if sampled {
                let started = Instant::now();
                let pose = match estimator.estimate(&frame) {
                    Ok(pose) => pose,
                    Err(e) => {
                        warn!("Pose estimation failed on frame {}: {:#}", frame.index, e);
                        metrics.inc(&metrics.estimator_errors);
                        None
                    }
                };

                let result = session.tick(pose.as_ref(), frame.timestamp_ms);
                metrics.inc(&metrics.frames_analyzed);
                if result.angle.is_none() {
                    metrics.inc(&metrics.ticks_without_pose);
                }
                if result.rep.is_some() {
                    reps += 1;
                    metrics.inc(&metrics.reps_detected);
                }
                metrics.add_timing(&metrics.analysis_time_us, started.elapsed().as_micros() as u64);
                debug!(
                    "Frame {}: phase {} angle {:?}",
                    frame.index,
                    result.phase.as_str(),
                    result.angle
                );
                last_pose = pose;
                last_angle = result.angle;
            }

            if let Some(sink) = sink.as_deref_mut() {
                let (pose, angle) = if sampled || options.carry_pose_between_samples {
                    (last_pose.as_ref(), last_angle)
                } else {
                    (None, None)
                };
                let image =
                    annotator.annotate(&frame.image, pose, angle, &session.snapshot(), &label);
                let annotated = Frame::new(frame.index, frame.timestamp_ms, image);
                sink.write_frame(&annotated)
                    .map_err(|e| AnalysisError::OutputUnwritable {
                        path: sink.output_path().to_path_buf(),
                        reason: format!("{e:#}"),
                    })?;
                metrics.inc(&metrics.frames_annotated);
            }

            frames += 1;
            if frames % progress_interval == 0 {
                if let Some(tx) = progress {
                    tx.send_replace(BatchProgress::new(frames, total_frames, reps));
                }
                debug!("Progress: {} frames, {} reps", frames, reps);
            }
        }

        let output_path = match sink {
            Some(sink) => {
                sink.finish().map_err(|e| AnalysisError::OutputUnwritable {
                    path: sink.output_path().to_path_buf(),
                    reason: format!("{e:#}"),
                })?;
                Some(sink.output_path().to_path_buf())
            }
            None => None,
        };

        if let Some(tx) = progress {
            let mut last = BatchProgress::new(frames, total_frames, reps);
            last.finished = true;
            tx.send_replace(last);
        }

        let summary = session.summary();
        let metrics = metrics.summary();
        info!(
            "📊 {}: {} reps ({} correct, {} incorrect), {:.0}% accuracy, {} frames @ {:.1} FPS",
            summary.display_name,
            summary.total_reps,
            summary.correct_reps,
            summary.incorrect_reps,
            summary.accuracy_percentage,
            metrics.frames_read,
            metrics.fps
        );

        Ok(BatchOutcome {
            output_path,
            summary,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::squat_pose;
    use crate::pipeline::progress::progress_channel;
    use crate::video_processor::{MemorySink, MemorySource};
    use image::{Rgb, RgbImage};

    /// Knee angle of the 10 s squat: stand, descend to 70°, hold, rise to 160°.
    fn knee_angle(frame: u64) -> f32 {
        match frame {
            0..=59 => 165.0,
            60..=119 => 165.0 - (frame - 60) as f32 * 95.0 / 60.0,
            120..=179 => 70.0,
            180..=239 => 70.0 + (frame - 180) as f32 * 90.0 / 60.0,
            _ => 160.0,
        }
    }

    fn squat_estimator(frame: &Frame) -> anyhow::Result<Option<Pose>> {
        Ok(Some(squat_pose(knee_angle(frame.index), 0.0, 0.9)))
    }

    fn blank_frames(count: usize, width: u32, height: u32) -> Vec<RgbImage> {
        (0..count)
            .map(|_| RgbImage::from_pixel(width, height, Rgb([30, 30, 30])))
            .collect()
    }

    fn no_annotation() -> BatchOptions {
        BatchOptions {
            annotate: false,
            ..BatchOptions::default()
        }
    }

    fn pipeline() -> BatchPipeline {
        BatchPipeline::new(Config::default()).unwrap()
    }

    #[test]
    fn test_squat_video_counts_one_rep() {
        let mut source = MemorySource::new(blank_frames(300, 4, 4), 30.0);
        let mut estimator = squat_estimator;
        let outcome = pipeline()
            .process_stream(
                &mut source,
                None,
                "squats",
                &no_annotation(),
                &mut estimator,
                None,
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(outcome.summary.total_reps, 1);
        assert_eq!(outcome.summary.correct_reps, 1);
        assert_eq!(outcome.metrics.frames_read, 300);
        assert_eq!(outcome.metrics.frames_analyzed, 300);
        assert_eq!(outcome.metrics.reps_detected, 1);
        assert!(outcome.output_path.is_none());
    }

    #[test]
    fn test_stride_analyses_every_nth_frame() {
        let mut source = MemorySource::new(blank_frames(300, 4, 4), 30.0);
        let mut estimator = squat_estimator;
        let options = BatchOptions {
            sample_stride: 2,
            ..no_annotation()
        };
        let outcome = pipeline()
            .process_stream(
                &mut source,
                None,
                "squats",
                &options,
                &mut estimator,
                None,
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(outcome.metrics.frames_read, 300);
        assert_eq!(outcome.metrics.frames_analyzed, 150);
        assert_eq!(outcome.summary.ticks_processed, 150);
        assert_eq!(outcome.summary.total_reps, 1);
    }

    #[test]
    fn test_same_input_same_result() {
        // Full squat with drifting knees mid-rep: one incorrect rep plus
        // advisories, so the compared summaries carry real content
        let run = || {
            let mut source = MemorySource::new(blank_frames(300, 64, 48), 30.0);
            let mut sink = MemorySink::default();
            let mut estimator = |frame: &Frame| -> anyhow::Result<Option<Pose>> {
                let drift = if (100..200).contains(&frame.index) { 0.1 } else { 0.0 };
                Ok(Some(squat_pose(knee_angle(frame.index), drift, 0.9)))
            };
            let outcome = pipeline()
                .process_stream(
                    &mut source,
                    Some(&mut sink),
                    "squats",
                    &BatchOptions::default(),
                    &mut estimator,
                    None,
                    &CancellationToken::new(),
                )
                .unwrap();
            (outcome.summary, sink)
        };

        let (first, first_sink) = run();
        let (second, second_sink) = run();
        assert_eq!(first.total_reps, 1);
        assert_eq!(first.incorrect_reps, 1);
        assert!(!first.recent_feedback.is_empty());
        assert_eq!(first, second);

        assert!(first_sink.finished);
        assert_eq!(first_sink.frames.len(), 300);
        for (a, b) in first_sink.frames.iter().zip(&second_sink.frames) {
            assert_eq!(a.index, b.index);
            assert_eq!(a.image, b.image);
        }
    }

    #[test]
    fn test_unsampled_frames_are_still_written() {
        let mut source = MemorySource::new(blank_frames(6, 320, 240), 30.0);
        let mut sink = MemorySink::default();
        let mut calls = 0u32;
        let mut estimator = |_: &Frame| -> anyhow::Result<Option<Pose>> {
            calls += 1;
            Ok(None)
        };
        let options = BatchOptions {
            sample_stride: 3,
            ..BatchOptions::default()
        };
        let outcome = pipeline()
            .process_stream(
                &mut source,
                Some(&mut sink),
                "squats",
                &options,
                &mut estimator,
                None,
                &CancellationToken::new(),
            )
            .unwrap();
        drop(estimator);

        assert_eq!(calls, 2);
        assert_eq!(sink.frames.len(), 6);
        let indices: Vec<u64> = sink.frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(outcome.metrics.frames_annotated, 6);
        assert_eq!(outcome.metrics.ticks_without_pose, 2);
    }

    #[test]
    fn test_estimator_errors_count_as_missing_pose() {
        let mut source = MemorySource::new(blank_frames(5, 4, 4), 30.0);
        let mut estimator = |frame: &Frame| -> anyhow::Result<Option<Pose>> {
            if frame.index % 2 == 0 {
                anyhow::bail!("model timed out")
            }
            Ok(None)
        };
        let outcome = pipeline()
            .process_stream(
                &mut source,
                None,
                "squats",
                &no_annotation(),
                &mut estimator,
                None,
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(outcome.metrics.estimator_errors, 3);
        assert_eq!(outcome.summary.ticks_without_pose, 5);
    }

    #[test]
    fn test_progress_reports_final_state() {
        let (tx, rx) = progress_channel();
        let mut source = MemorySource::new(blank_frames(10, 4, 4), 30.0);
        let mut estimator = squat_estimator;
        let options = BatchOptions {
            progress_interval_frames: 4,
            ..no_annotation()
        };
        pipeline()
            .process_stream(
                &mut source,
                None,
                "squats",
                &options,
                &mut estimator,
                Some(&tx),
                &CancellationToken::new(),
            )
            .unwrap();

        let last = rx.borrow().clone();
        assert!(last.finished);
        assert_eq!(last.frames_processed, 10);
        assert_eq!(last.total_frames, Some(10));
        assert_eq!(last.fraction, Some(1.0));
    }

    #[test]
    fn test_cancel_stops_at_frame_boundary() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut source = MemorySource::new(blank_frames(20, 4, 4), 30.0);
        let mut sink = MemorySink::default();
        let mut estimator = move |frame: &Frame| -> anyhow::Result<Option<Pose>> {
            if frame.index == 5 {
                trigger.cancel();
            }
            Ok(None)
        };
        let options = BatchOptions {
            annotate: true,
            ..BatchOptions::default()
        };
        let err = pipeline()
            .process_stream(
                &mut source,
                Some(&mut sink),
                "squats",
                &options,
                &mut estimator,
                None,
                &cancel,
            )
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Cancelled { frames: 6 }));
        assert_eq!(sink.frames.len(), 6);
        assert!(!sink.finished);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut source = MemorySource::new(blank_frames(3, 4, 4), 30.0);
        let mut estimator = squat_estimator;
        let err = pipeline()
            .process_stream(
                &mut source,
                None,
                "squats",
                &no_annotation(),
                &mut estimator,
                None,
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled { frames: 0 }));
    }

    fn write_sequence(dir: &Path, count: u32) {
        std::fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            RgbImage::from_pixel(320, 240, Rgb([40, 40, 40]))
                .save(dir.join(format!("{i:04}.png")))
                .unwrap();
        }
    }

    fn pipeline_with_output(output_dir: &Path) -> BatchPipeline {
        let mut config = Config::default();
        config.video.output_dir = output_dir.to_string_lossy().into_owned();
        BatchPipeline::new(config).unwrap()
    }

    #[test]
    fn test_process_video_writes_annotated_sequence() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("set1");
        write_sequence(&input, 3);
        let out = tmp.path().join("out");

        let mut estimator = squat_estimator;
        let outcome = pipeline_with_output(&out)
            .process_video(
                &input,
                "Squats",
                &BatchOptions::default(),
                &mut estimator,
                None,
                &CancellationToken::new(),
            )
            .unwrap();

        let output = outcome.output_path.unwrap();
        assert_eq!(output, out.join("set1_annotated"));
        for i in 0..3 {
            assert!(output.join(format!("frame_{i:06}.png")).is_file());
        }
        assert_eq!(outcome.summary.exercise, "squats");
    }

    #[test]
    fn test_unknown_exercise_fails_before_reading() {
        let tmp = tempfile::tempdir().unwrap();
        let mut calls = 0;
        let mut estimator = |_: &Frame| -> anyhow::Result<Option<Pose>> {
            calls += 1;
            Ok(None)
        };
        let err = pipeline_with_output(tmp.path())
            .process_video(
                Path::new("does/not/matter"),
                "jumping_jacks",
                &BatchOptions::default(),
                &mut estimator,
                None,
                &CancellationToken::new(),
            )
            .unwrap_err();
        drop(estimator);
        assert!(matches!(err, AnalysisError::UnknownExercise(_)));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_missing_input_is_unreadable() {
        let tmp = tempfile::tempdir().unwrap();
        let mut estimator = squat_estimator;
        let err = pipeline_with_output(tmp.path())
            .process_video(
                &tmp.path().join("missing"),
                "squats",
                &BatchOptions::default(),
                &mut estimator,
                None,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InputUnreadable { .. }));
    }

    #[test]
    fn test_blocked_output_is_unwritable() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("set1");
        write_sequence(&input, 1);
        // A regular file where the output directory should go
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let mut estimator = squat_estimator;
        let err = pipeline_with_output(&blocker)
            .process_video(
                &input,
                "squats",
                &BatchOptions::default(),
                &mut estimator,
                None,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, AnalysisError::OutputUnwritable { .. }));
    }
}
