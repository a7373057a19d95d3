// src/types.rs

use crate::exercise::ExerciseProfile;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Extra exercise profiles. An entry whose id matches a built-in profile
    /// replaces it.
    #[serde(default)]
    pub exercises: Vec<ExerciseProfile>,
}

/// Per-session analysis settings shared by batch and live modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Capacity of the recent-feedback ring buffer.
    #[serde(default = "default_feedback_capacity")]
    pub feedback_capacity: usize,
    /// Number of recent angle values kept for trend checks.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Upper bound on samples kept for the rep in progress.
    #[serde(default = "default_max_cycle_samples")]
    pub max_cycle_samples: usize,
    /// Minimum spacing between two positive messages.
    #[serde(default = "default_praise_interval")]
    pub praise_interval_seconds: f64,
    /// Consecutive unusable ticks before a visibility warning is emitted.
    #[serde(default = "default_visibility_warning_ticks")]
    pub visibility_warning_ticks: u32,
    /// Emit form advisories while a rep is in progress, not only when it
    /// is confirmed.
    #[serde(default = "default_true")]
    pub live_feedback: bool,
    /// Minimum spacing between two advisories with the same text.
    #[serde(default = "default_live_feedback_interval")]
    pub live_feedback_interval_seconds: f64,
}

fn default_feedback_capacity() -> usize {
    10
}

fn default_history_capacity() -> usize {
    90
}

fn default_max_cycle_samples() -> usize {
    900
}

fn default_praise_interval() -> f64 {
    5.0
}

fn default_visibility_warning_ticks() -> u32 {
    15
}

fn default_live_feedback_interval() -> f64 {
    3.0
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            feedback_capacity: default_feedback_capacity(),
            history_capacity: default_history_capacity(),
            max_cycle_samples: default_max_cycle_samples(),
            praise_interval_seconds: default_praise_interval(),
            visibility_warning_ticks: default_visibility_warning_ticks(),
            live_feedback: true,
            live_feedback_interval_seconds: default_live_feedback_interval(),
        }
    }
}

/// Which overlay layers the annotator draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_true")]
    pub draw_skeleton: bool,
    #[serde(default = "default_true")]
    pub draw_counters: bool,
    #[serde(default = "default_true")]
    pub draw_feedback: bool,
    #[serde(default = "default_true")]
    pub draw_branding: bool,
    /// Tracked joint angle printed next to its vertex.
    #[serde(default = "default_true")]
    pub draw_angle: bool,
    #[serde(default = "default_max_feedback_items")]
    pub max_feedback_items: usize,
    /// Feedback lines longer than this are cut and end with "...".
    #[serde(default = "default_max_feedback_chars")]
    pub max_feedback_chars: usize,
    #[serde(default = "default_brand_text")]
    pub brand_text: String,
}

fn default_true() -> bool {
    true
}

fn default_max_feedback_items() -> usize {
    3
}

fn default_max_feedback_chars() -> usize {
    30
}

fn default_brand_text() -> String {
    "REP ANALYZER".to_string()
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            draw_skeleton: true,
            draw_counters: true,
            draw_feedback: true,
            draw_branding: true,
            draw_angle: true,
            max_feedback_items: default_max_feedback_items(),
            max_feedback_chars: default_max_feedback_chars(),
            brand_text: default_brand_text(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Analyse every Nth frame. 1 analyses every frame.
    #[serde(default = "default_sample_stride")]
    pub sample_stride: usize,
    #[serde(default = "default_true")]
    pub annotate: bool,
    /// Frames between two progress events.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_frames: u64,
    /// Draw the last observed pose on frames that were not sampled.
    #[serde(default = "default_true")]
    pub carry_pose_between_samples: bool,
    #[serde(default = "default_max_concurrent_videos")]
    pub max_concurrent_videos: usize,
}

fn default_sample_stride() -> usize {
    1
}

fn default_progress_interval() -> u64 {
    30
}

fn default_max_concurrent_videos() -> usize {
    2
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            sample_stride: default_sample_stride(),
            annotate: true,
            progress_interval_frames: default_progress_interval(),
            carry_pose_between_samples: true,
            max_concurrent_videos: default_max_concurrent_videos(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Pending ticks per session. When full the oldest pending tick is dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    8
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Exercise analysed by the CLI.
    #[serde(default = "default_exercise")]
    pub exercise: String,
    /// Frame rate assumed for image sequences.
    #[serde(default = "default_fps")]
    pub default_fps: f64,
}

fn default_input_dir() -> String {
    "input".to_string()
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_exercise() -> String {
    "squats".to_string()
}

fn default_fps() -> f64 {
    30.0
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            exercise: default_exercise(),
            default_fps: default_fps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

// ============================================================================
// FRAMES
// ============================================================================

#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub timestamp_ms: f64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, timestamp_ms: f64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp_ms,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

// ============================================================================
// POSE
// ============================================================================

/// Tracked anatomical points, in estimator order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub const COUNT: usize = 17;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Joint::Nose => "nose",
            Joint::LeftEye => "left_eye",
            Joint::RightEye => "right_eye",
            Joint::LeftEar => "left_ear",
            Joint::RightEar => "right_ear",
            Joint::LeftShoulder => "left_shoulder",
            Joint::RightShoulder => "right_shoulder",
            Joint::LeftElbow => "left_elbow",
            Joint::RightElbow => "right_elbow",
            Joint::LeftWrist => "left_wrist",
            Joint::RightWrist => "right_wrist",
            Joint::LeftHip => "left_hip",
            Joint::RightHip => "right_hip",
            Joint::LeftKnee => "left_knee",
            Joint::RightKnee => "right_knee",
            Joint::LeftAnkle => "left_ankle",
            Joint::RightAnkle => "right_ankle",
        }
    }
}

/// One estimated joint position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Normalized X (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Normalized Y (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Depth relative to the hips, same scale as x
    #[serde(default)]
    pub z: f32,
    /// Estimator confidence that the joint is visible (0.0 - 1.0)
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }

    pub fn position(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32) as i32;
        let py = (self.y * height as f32) as i32;
        (px, py)
    }
}

/// All landmarks estimated for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose {
    landmarks: BTreeMap<Joint, Landmark>,
}

impl Pose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, joint: Joint, landmark: Landmark) -> Self {
        self.landmarks.insert(joint, landmark);
        self
    }

    pub fn insert(&mut self, joint: Joint, landmark: Landmark) {
        self.landmarks.insert(joint, landmark);
    }

    pub fn get(&self, joint: Joint) -> Option<&Landmark> {
        self.landmarks.get(&joint)
    }

    /// The landmark, only if its visibility reaches `threshold`.
    pub fn visible(&self, joint: Joint, threshold: f32) -> Option<&Landmark> {
        self.get(joint).filter(|lm| lm.is_visible(threshold))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Joint, &Landmark)> {
        self.landmarks.iter()
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn average_visibility(&self) -> f32 {
        if self.landmarks.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.landmarks.values().map(|lm| lm.visibility).sum();
        sum / self.landmarks.len() as f32
    }
}

impl FromIterator<(Joint, Landmark)> for Pose {
    fn from_iter<I: IntoIterator<Item = (Joint, Landmark)>>(iter: I) -> Self {
        Self {
            landmarks: iter.into_iter().collect(),
        }
    }
}

/// Phase of a repetition. Which extreme is UP depends on the exercise: a
/// squat is UP when standing, a bicep curl is UP when the weight is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExercisePhase {
    Up,
    Down,
    Transition,
}

impl ExercisePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExercisePhase::Up => "UP",
            ExercisePhase::Down => "DOWN",
            ExercisePhase::Transition => "TRANSITION",
        }
    }

    pub fn opposite(&self) -> ExercisePhase {
        match self {
            ExercisePhase::Up => ExercisePhase::Down,
            ExercisePhase::Down => ExercisePhase::Up,
            ExercisePhase::Transition => ExercisePhase::Transition,
        }
    }
}

// ============================================================================
// FEEDBACK & REPS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    pub severity: Severity,
    pub text: String,
    pub timestamp_ms: f64,
}

impl FeedbackMessage {
    pub fn new(severity: Severity, text: impl Into<String>, timestamp_ms: f64) -> Self {
        Self {
            severity,
            text: text.into(),
            timestamp_ms,
        }
    }

    pub fn info(text: impl Into<String>, timestamp_ms: f64) -> Self {
        Self::new(Severity::Info, text, timestamp_ms)
    }

    pub fn warning(text: impl Into<String>, timestamp_ms: f64) -> Self {
        Self::new(Severity::Warning, text, timestamp_ms)
    }

    pub fn error(text: impl Into<String>, timestamp_ms: f64) -> Self {
        Self::new(Severity::Error, text, timestamp_ms)
    }
}

/// A repetition confirmed by the state machine and classified by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepEvent {
    pub exercise: String,
    /// 1-based, increases by one per confirmed rep
    pub rep_index: u32,
    pub correct: bool,
    pub feedback: Vec<String>,
    pub timestamp_ms: f64,
    /// Most flexed angle reached during the rep (degrees)
    pub deepest_angle: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_to_pixel() {
        let lm = Landmark::new(0.5, 0.25, 0.0, 1.0);
        assert_eq!(lm.to_pixel(640, 480), (320, 120));
    }

    #[test]
    fn test_pose_visible_filters_low_confidence() {
        let pose = Pose::new()
            .with(Joint::LeftKnee, Landmark::new(0.4, 0.6, 0.0, 0.9))
            .with(Joint::RightKnee, Landmark::new(0.6, 0.6, 0.0, 0.2));

        assert!(pose.visible(Joint::LeftKnee, 0.5).is_some());
        assert!(pose.visible(Joint::RightKnee, 0.5).is_none());
        assert!(pose.visible(Joint::Nose, 0.0).is_none());
    }

    #[test]
    fn test_pose_json_uses_joint_names() {
        let pose = Pose::new().with(Joint::LeftShoulder, Landmark::new(0.1, 0.2, 0.0, 0.8));
        let json = serde_json::to_string(&pose).unwrap();
        assert!(json.contains("\"left_shoulder\""));

        let back: Pose = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pose);
    }

    #[test]
    fn test_joint_all_is_ordered() {
        assert_eq!(Joint::ALL.len(), Joint::COUNT);
        assert!(Joint::ALL.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_config_defaults_from_empty_yaml() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.analysis.feedback_capacity, 10);
        assert_eq!(config.overlay.max_feedback_items, 3);
        assert_eq!(config.batch.sample_stride, 1);
        assert_eq!(config.live.queue_capacity, 8);
        assert!(config.exercises.is_empty());
    }
}
