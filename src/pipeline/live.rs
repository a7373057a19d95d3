// src/pipeline/live.rs
//
// Live sessions: each session is owned by one worker task that applies
// ticks in arrival order from a bounded queue. The controller only keeps
// the queue handle and the task's JoinHandle.

use super::metrics::{MetricsSummary, PipelineMetrics};
use super::session::{AnalysisSession, SessionSummary};
use super::tick_queue::TickQueue;
use crate::analysis::AccumulatorSnapshot;
use crate::error::{AnalysisError, AnalysisResult};
use crate::exercise::ExerciseRegistry;
use crate::types::{Config, ExercisePhase, Pose};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// UPDATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepCounters {
    pub correct: u32,
    pub incorrect: u32,
}

/// What the caller gets back for one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickUpdate {
    pub session_id: Uuid,
    pub timestamp_ms: f64,
    pub rep_occurred: bool,
    /// Set only when a rep was confirmed on this tick.
    pub rep_correct: Option<bool>,
    pub feedback: Vec<String>,
    pub counters: RepCounters,
    pub phase: ExercisePhase,
    pub angle: Option<f32>,
    pub snapshot: AccumulatorSnapshot,
}

type TickReply = oneshot::Sender<AnalysisResult<TickUpdate>>;

struct PendingTick {
    pose: Option<Pose>,
    timestamp_ms: f64,
    reply: TickReply,
}

/// A tick that has been queued. Await it with `wait`.
pub struct TickHandle {
    session_id: Uuid,
    reply: oneshot::Receiver<AnalysisResult<TickUpdate>>,
}

impl TickHandle {
    pub async fn wait(self) -> AnalysisResult<TickUpdate> {
        let session_id = self.session_id;
        self.reply.await.map_err(|_| AnalysisError::WorkerFailed {
            id: session_id,
            reason: "worker stopped before replying".into(),
        })?
    }
}

// ============================================================================
// WORKER
// ============================================================================

struct SessionWorker {
    exercise: String,
    queue: Arc<TickQueue<PendingTick>>,
    handle: JoinHandle<SessionSummary>,
}

/// Owned by the worker future. However the worker stops (drained, panicked
/// or aborted), dropping it closes the queue and fails the ticks still
/// waiting in it.
struct QueueGuard {
    session_id: Uuid,
    queue: Arc<TickQueue<PendingTick>>,
}

impl Drop for QueueGuard {
    fn drop(&mut self) {
        let stranded = self.queue.close_and_drain();
        if stranded.is_empty() {
            return;
        }
        warn!(
            "Session {}: worker stopped with {} pending ticks",
            self.session_id,
            stranded.len()
        );
        for tick in stranded {
            let _ = tick.reply.send(Err(AnalysisError::WorkerFailed {
                id: self.session_id,
                reason: "worker stopped before this tick ran".into(),
            }));
        }
    }
}

async fn run_worker(
    session_id: Uuid,
    mut session: AnalysisSession,
    guard: QueueGuard,
    metrics: PipelineMetrics,
) -> SessionSummary {
    while let Some(tick) = guard.queue.pop().await {
        let started = std::time::Instant::now();
        let result = session.tick(tick.pose.as_ref(), tick.timestamp_ms);

        metrics.inc(&metrics.frames_analyzed);
        if result.angle.is_none() {
            metrics.inc(&metrics.ticks_without_pose);
        }
        if result.rep.is_some() {
            metrics.inc(&metrics.reps_detected);
        }
        metrics.add_timing(&metrics.analysis_time_us, started.elapsed().as_micros() as u64);

        let snapshot = session.snapshot();
        let update = TickUpdate {
            session_id,
            timestamp_ms: tick.timestamp_ms,
            rep_occurred: result.rep.is_some(),
            rep_correct: result.rep.as_ref().map(|rep| rep.correct),
            feedback: result.feedback.into_iter().map(|m| m.text).collect(),
            counters: RepCounters {
                correct: snapshot.correct_count,
                incorrect: snapshot.incorrect_count,
            },
            phase: result.phase,
            angle: result.angle,
            snapshot,
        };
        if tick.reply.send(Ok(update)).is_err() {
            debug!("Session {}: caller went away before its update", session_id);
        }
    }
    session.summary()
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct LiveSessionController {
    config: Config,
    registry: Arc<ExerciseRegistry>,
    sessions: Mutex<HashMap<Uuid, SessionWorker>>,
    metrics: PipelineMetrics,
    clock: Instant,
}

impl LiveSessionController {
    pub fn new(config: Config) -> AnalysisResult<Self> {
        let registry = Arc::new(ExerciseRegistry::from_config(&config)?);
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: Config, registry: Arc<ExerciseRegistry>) -> Self {
        Self {
            config,
            registry,
            sessions: Mutex::new(HashMap::new()),
            metrics: PipelineMetrics::new(),
            clock: Instant::now(),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, SessionWorker>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Milliseconds since the controller was created.
    pub fn now_ms(&self) -> f64 {
        self.clock.elapsed().as_secs_f64() * 1000.0
    }

    /// Spawns the session's worker task; must be called inside a Tokio
    /// runtime. Nothing is created for an unknown exercise.
    pub fn start_session(&self, exercise_id: &str) -> AnalysisResult<Uuid> {
        let profile = self.registry.resolve(exercise_id)?;
        let session_id = Uuid::new_v4();

        let session = AnalysisSession::new(Arc::clone(&profile), &self.config.analysis);
        let queue = Arc::new(TickQueue::new(self.config.live.queue_capacity));
        let guard = QueueGuard {
            session_id,
            queue: Arc::clone(&queue),
        };
        let handle = tokio::spawn(run_worker(
            session_id,
            session,
            guard,
            self.metrics.clone(),
        ));

        self.sessions().insert(
            session_id,
            SessionWorker {
                exercise: profile.id.clone(),
                queue,
                handle,
            },
        );
        info!("▶️ Session {} started ({})", session_id, profile.label());
        Ok(session_id)
    }

    /// Queues a tick stamped with the controller clock and waits for it.
    pub async fn process_tick(
        &self,
        session_id: Uuid,
        pose: Option<Pose>,
    ) -> AnalysisResult<TickUpdate> {
        let timestamp_ms = self.now_ms();
        self.process_tick_at(session_id, pose, timestamp_ms).await
    }

    pub async fn process_tick_at(
        &self,
        session_id: Uuid,
        pose: Option<Pose>,
        timestamp_ms: f64,
    ) -> AnalysisResult<TickUpdate> {
        self.submit_tick(session_id, pose, timestamp_ms)?.wait().await
    }

    /// Queues a tick without waiting for it. If the session's queue is
    /// full, the oldest pending tick is dropped and its caller receives
    /// `TickDropped`. A session whose worker has stopped fails with
    /// `WorkerFailed` until it is ended.
    pub fn submit_tick(
        &self,
        session_id: Uuid,
        pose: Option<Pose>,
        timestamp_ms: f64,
    ) -> AnalysisResult<TickHandle> {
        let (reply, receiver) = oneshot::channel();
        let tick = PendingTick {
            pose,
            timestamp_ms,
            reply,
        };

        let sessions = self.sessions();
        let worker = sessions
            .get(&session_id)
            .ok_or(AnalysisError::SessionNotFound(session_id))?;
        if worker.handle.is_finished() {
            return Err(AnalysisError::WorkerFailed {
                id: session_id,
                reason: "worker is no longer running".into(),
            });
        }
        self.metrics.inc(&self.metrics.frames_read);

        match worker.queue.push(tick) {
            Ok(None) => {}
            Ok(Some(evicted)) => {
                self.metrics.inc(&self.metrics.ticks_dropped);
                warn!(
                    "Session {}: dropped tick at {:.0} ms",
                    session_id, evicted.timestamp_ms
                );
                let _ = evicted.reply.send(Err(AnalysisError::TickDropped(session_id)));
            }
            Err(_) => {
                return Err(AnalysisError::WorkerFailed {
                    id: session_id,
                    reason: "worker is no longer running".into(),
                })
            }
        }

        Ok(TickHandle {
            session_id,
            reply: receiver,
        })
    }

    /// Ends the session once its pending ticks are applied and returns the
    /// final summary.
    pub async fn end_session(&self, session_id: Uuid) -> AnalysisResult<SessionSummary> {
        let worker = self
            .sessions()
            .remove(&session_id)
            .ok_or(AnalysisError::SessionNotFound(session_id))?;

        worker.queue.close();
        let summary = worker
            .handle
            .await
            .map_err(|e| AnalysisError::WorkerFailed {
                id: session_id,
                reason: e.to_string(),
            })?;

        info!(
            "⏹️ Session {} ended ({}): {} reps, {} correct, {:.0}% accuracy",
            session_id,
            worker.exercise,
            summary.total_reps,
            summary.correct_reps,
            summary.accuracy_percentage
        );
        Ok(summary)
    }

    pub fn active_sessions(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.sessions().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Ends every session. Sessions whose worker failed are logged and left
    /// out.
    pub async fn shutdown(&self) -> Vec<(Uuid, SessionSummary)> {
        let ids = self.active_sessions();
        info!("Shutting down {} live sessions", ids.len());

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            match self.end_session(id).await {
                Ok(summary) => summaries.push((id, summary)),
                Err(e) => warn!("Session {}: {}", id, e),
            }
        }
        summaries
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }
}
