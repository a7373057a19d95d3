// src/main.rs

use anyhow::{Context, Result};
use rep_analyzer::pipeline::{progress_channel, BatchOptions, BatchOutcome, BatchProgress};
use rep_analyzer::video_processor::{InputJob, VideoProcessor};
use rep_analyzer::{BatchPipeline, Config, PoseTrack};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config_found = Path::new(&config_path).is_file();
    let config = if config_found {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rep_analyzer={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🏋️ Rep Analyzer starting");
    if config_found {
        info!("✓ Configuration loaded from {}", config_path);
    } else {
        warn!("⚠️  {} not found, using defaults", config_path);
    }

    let pipeline = Arc::new(BatchPipeline::new(config.clone())?);
    let exercise = pipeline.registry().resolve(&config.video.exercise)?;
    info!(
        "✓ Exercise: {} ({} profiles available)",
        exercise.label(),
        pipeline.registry().len()
    );

    let processor = VideoProcessor::new(config.video.clone());
    let jobs = processor.find_inputs()?;
    if jobs.is_empty() {
        warn!(
            "No inputs with pose tracks under {}",
            config.video.input_dir
        );
        return Ok(());
    }
    std::fs::create_dir_all(processor.output_dir()).with_context(|| {
        format!("cannot create output dir {}", processor.output_dir().display())
    })?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 Interrupt received, stopping after the current frame");
                cancel.cancel();
            }
        });
    }

    let options = BatchOptions::from(&config.batch);
    let semaphore = Arc::new(Semaphore::new(config.batch.max_concurrent_videos));
    let mut tasks = Vec::with_capacity(jobs.len());

    for job in jobs {
        let permit = semaphore.clone().acquire_owned().await?;
        let (progress_tx, progress_rx) = progress_channel();
        tokio::spawn(report_progress(job.stem(), progress_rx));

        let pipeline = Arc::clone(&pipeline);
        let exercise_id = exercise.id.clone();
        let options = options.clone();
        let summary_path = processor.summary_path(&job);
        let cancel = cancel.clone();
        let stem = job.stem();

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_job(
                &pipeline,
                &job,
                &exercise_id,
                &options,
                &progress_tx,
                &cancel,
                &summary_path,
            )
        });
        tasks.push((stem, handle));
    }

    let mut succeeded = 0;
    let mut failed = 0;
    for (stem, handle) in tasks {
        match handle.await {
            Ok(Ok(outcome)) => {
                succeeded += 1;
                log_outcome(&stem, &outcome);
            }
            Ok(Err(e)) => {
                failed += 1;
                error!("❌ {}: {:#}", stem, e);
            }
            Err(e) => {
                failed += 1;
                error!("❌ {}: worker panicked: {}", stem, e);
            }
        }
    }

    info!(
        "Done: {} input(s) processed, {} failed",
        succeeded, failed
    );
    Ok(())
}

fn run_job(
    pipeline: &BatchPipeline,
    job: &InputJob,
    exercise_id: &str,
    options: &BatchOptions,
    progress: &watch::Sender<BatchProgress>,
    cancel: &CancellationToken,
    summary_path: &Path,
) -> Result<BatchOutcome> {
    let mut track = PoseTrack::load(&job.poses)?;
    let outcome = pipeline.process_video(
        &job.path,
        exercise_id,
        options,
        &mut track,
        Some(progress),
        cancel,
    )?;

    let json = serde_json::to_string_pretty(&outcome)?;
    std::fs::write(summary_path, json)
        .with_context(|| format!("cannot write {}", summary_path.display()))?;
    info!("💾 Summary written to {}", summary_path.display());
    Ok(outcome)
}

async fn report_progress(stem: String, mut progress: watch::Receiver<BatchProgress>) {
    while progress.changed().await.is_ok() {
        let current = progress.borrow_and_update().clone();
        match current.percent() {
            Some(percent) => info!(
                "{}: {:.1}% ({} frames) | reps: {}",
                stem, percent, current.frames_processed, current.reps_so_far
            ),
            None => info!(
                "{}: {} frames | reps: {}",
                stem, current.frames_processed, current.reps_so_far
            ),
        }
        if current.finished {
            break;
        }
    }
}

fn log_outcome(stem: &str, outcome: &BatchOutcome) {
    let summary = &outcome.summary;
    info!("\n📊 Final Report: {}", stem);
    info!("  Exercise: {}", summary.display_name);
    info!("  Total Reps: {}", summary.total_reps);
    info!("  ✅ Correct: {}", summary.correct_reps);
    info!("  ❌ Incorrect: {}", summary.incorrect_reps);
    info!(
        "  Accuracy: {:.1}% ({:?})",
        summary.accuracy_percentage, summary.performance_rating
    );
    info!("  🔥 Calories: {:.1}", summary.calories_burned);
    for suggestion in &summary.suggestions {
        info!("  💡 {}", suggestion);
    }
    if summary.ticks_without_pose > 0 {
        warn!(
            "  👀 {} of {} analysed frames had no usable pose",
            summary.ticks_without_pose, summary.ticks_processed
        );
    }
    if let Some(path) = &outcome.output_path {
        info!("  🎬 Annotated output: {}", path.display());
    }
    info!("  Processing Speed: {:.1} FPS", outcome.metrics.fps);
}
