// src/lib.rs
//
// Exercise rep counting and form feedback from pose landmarks, with a
// batch pipeline for recorded video and a controller for live sessions.

pub mod analysis;
pub mod config;
pub mod error;
pub mod exercise;
pub mod geometry;
pub mod pipeline;
pub mod pose_track;
pub mod render;
pub mod types;
pub mod video_processor;

pub use error::{AnalysisError, AnalysisResult};
pub use exercise::{ExerciseProfile, ExerciseRegistry};
pub use pipeline::{BatchPipeline, LiveSessionController, SessionSummary};
pub use pose_track::{PoseEstimator, PoseTrack};
pub use types::{Config, Frame, Joint, Landmark, Pose};
