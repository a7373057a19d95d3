// src/error.rs

use std::path::PathBuf;
use uuid::Uuid;

/// Failures surfaced to callers of the analysis core.
///
/// Pose quality problems are deliberately absent: a missing or low-confidence
/// pose is a no-op tick, never an error.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("unknown exercise '{0}'")]
    UnknownExercise(String),

    #[error("invalid profile for '{exercise}': {reason}")]
    InvalidProfile { exercise: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("tick dropped: session {0} queue is full")]
    TickDropped(Uuid),

    #[error("session {id} worker stopped: {reason}")]
    WorkerFailed { id: Uuid, reason: String },

    #[error("cannot read input {path}: {reason}")]
    InputUnreadable { path: PathBuf, reason: String },

    #[error("cannot write output {path}: {reason}")]
    OutputUnwritable { path: PathBuf, reason: String },

    #[error("frame stream failed: {0:#}")]
    FrameStream(anyhow::Error),

    #[error("processing cancelled after {frames} frames")]
    Cancelled { frames: u64 },
}

impl AnalysisError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AnalysisError::SessionNotFound(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AnalysisError::UnknownExercise(_)
                | AnalysisError::InvalidProfile { .. }
                | AnalysisError::Config(_)
        )
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
