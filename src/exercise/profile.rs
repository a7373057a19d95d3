// src/exercise/profile.rs

use crate::error::{AnalysisError, AnalysisResult};
use crate::geometry;
use crate::types::{ExercisePhase, Joint, Pose};
use serde::{Deserialize, Serialize};

// ============================================================================
// ANGLE DEFINITION
// ============================================================================

/// How several joint triples are folded into one angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleCombine {
    /// Mean over all triples; every triple must be visible.
    #[default]
    Average,
    /// The triple whose weakest landmark is the most confident.
    MostVisible,
}

/// The joint angle a profile tracks, e.g. the knee angle hip→knee→ankle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleDefinition {
    pub name: String,
    /// `[outer, vertex, outer]` triples, one per body side.
    pub triples: Vec<[Joint; 3]>,
    #[serde(default)]
    pub combine: AngleCombine,
    /// Use estimator depth as well. Off by default, z is much noisier than x/y.
    #[serde(default)]
    pub use_depth: bool,
}

/// One angle reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AngleMeasurement {
    pub name: String,
    pub degrees: f32,
    /// Lowest visibility among the contributing landmarks.
    pub confidence: f32,
}

impl AngleDefinition {
    /// Returns None when any contributing landmark falls below
    /// `min_visibility` or the geometry is degenerate.
    pub fn measure(&self, pose: &Pose, min_visibility: f32) -> Option<AngleMeasurement> {
        let readings: Vec<Option<(f32, f32)>> = self
            .triples
            .iter()
            .map(|triple| self.measure_triple(pose, triple, min_visibility))
            .collect();

        let (degrees, confidence) = match self.combine {
            AngleCombine::Average => {
                let values: Option<Vec<(f32, f32)>> = readings.into_iter().collect();
                let values = values?;
                if values.is_empty() {
                    return None;
                }
                let n = values.len() as f32;
                let degrees = values.iter().map(|(d, _)| d).sum::<f32>() / n;
                let confidence = values
                    .iter()
                    .map(|(_, c)| *c)
                    .fold(f32::INFINITY, f32::min);
                (degrees, confidence)
            }
            AngleCombine::MostVisible => readings
                .into_iter()
                .flatten()
                .fold(None, |best: Option<(f32, f32)>, reading| match best {
                    Some(b) if b.1 >= reading.1 => Some(b),
                    _ => Some(reading),
                })?,
        };

        Some(AngleMeasurement {
            name: self.name.clone(),
            degrees,
            confidence,
        })
    }

    fn measure_triple(
        &self,
        pose: &Pose,
        triple: &[Joint; 3],
        min_visibility: f32,
    ) -> Option<(f32, f32)> {
        let a = pose.visible(triple[0], min_visibility)?;
        let b = pose.visible(triple[1], min_visibility)?;
        let c = pose.visible(triple[2], min_visibility)?;

        let degrees = if self.use_depth {
            geometry::angle_between(a.position(), b.position(), c.position())?
        } else {
            geometry::angle_between_2d(a.position(), b.position(), c.position())?
        };
        let confidence = a.visibility.min(b.visibility).min(c.visibility);
        Some((degrees, confidence))
    }
}

// ============================================================================
// FORM CHECKS
// ============================================================================

/// Range-of-motion requirement at the flexed extreme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthCheck {
    /// Angle the joint should reach at the bottom of the rep.
    pub target_angle: f32,
    pub tolerance: f32,
    pub feedback: String,
}

impl DepthCheck {
    pub fn is_satisfied(&self, deepest_angle: f32) -> bool {
        deepest_angle <= self.target_angle + self.tolerance
    }
}

/// A posture constraint evaluated on every sample of a rep. Each reading must
/// stay at or below its bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum AlignmentCheck {
    /// Horizontal knee-to-ankle offset, worst visible side (normalized x).
    KneeOverAnkle { max_offset: f32, feedback: String },
    /// Elbow spread divided by shoulder width.
    ElbowFlare { max_ratio: f32, feedback: String },
    /// How far shoulder→hip→ankle bends away from a straight line (degrees).
    BodyLine { max_deviation: f32, feedback: String },
    /// Hip→shoulder inclination from vertical (degrees).
    TorsoLean { max_degrees: f32, feedback: String },
    /// Horizontal elbow-to-shoulder offset, worst visible side.
    ElbowPinned { max_offset: f32, feedback: String },
}

const SIDES: [(Joint, Joint, Joint, Joint, Joint); 2] = [
    // shoulder, elbow, hip, knee, ankle
    (
        Joint::LeftShoulder,
        Joint::LeftElbow,
        Joint::LeftHip,
        Joint::LeftKnee,
        Joint::LeftAnkle,
    ),
    (
        Joint::RightShoulder,
        Joint::RightElbow,
        Joint::RightHip,
        Joint::RightKnee,
        Joint::RightAnkle,
    ),
];

impl AlignmentCheck {
    pub fn name(&self) -> &'static str {
        match self {
            AlignmentCheck::KneeOverAnkle { .. } => "knee_over_ankle",
            AlignmentCheck::ElbowFlare { .. } => "elbow_flare",
            AlignmentCheck::BodyLine { .. } => "body_line",
            AlignmentCheck::TorsoLean { .. } => "torso_lean",
            AlignmentCheck::ElbowPinned { .. } => "elbow_pinned",
        }
    }

    pub fn feedback(&self) -> &str {
        match self {
            AlignmentCheck::KneeOverAnkle { feedback, .. }
            | AlignmentCheck::ElbowFlare { feedback, .. }
            | AlignmentCheck::BodyLine { feedback, .. }
            | AlignmentCheck::TorsoLean { feedback, .. }
            | AlignmentCheck::ElbowPinned { feedback, .. } => feedback,
        }
    }

    pub fn limit(&self) -> f32 {
        match *self {
            AlignmentCheck::KneeOverAnkle { max_offset, .. } => max_offset,
            AlignmentCheck::ElbowFlare { max_ratio, .. } => max_ratio,
            AlignmentCheck::BodyLine { max_deviation, .. } => max_deviation,
            AlignmentCheck::TorsoLean { max_degrees, .. } => max_degrees,
            AlignmentCheck::ElbowPinned { max_offset, .. } => max_offset,
        }
    }

    /// Current reading, or None if the landmarks it needs are not visible.
    pub fn measure(&self, pose: &Pose, min_visibility: f32) -> Option<f32> {
        let vis = |joint| pose.visible(joint, min_visibility).map(|lm| lm.position());

        match self {
            AlignmentCheck::KneeOverAnkle { .. } => SIDES
                .iter()
                .filter_map(|&(_, _, _, knee, ankle)| {
                    Some((vis(knee)?[0] - vis(ankle)?[0]).abs())
                })
                .reduce(f32::max),
            AlignmentCheck::ElbowFlare { .. } => {
                let shoulders = (vis(Joint::LeftShoulder)?[0] - vis(Joint::RightShoulder)?[0]).abs();
                let elbows = (vis(Joint::LeftElbow)?[0] - vis(Joint::RightElbow)?[0]).abs();
                if shoulders < 1e-6 {
                    return None;
                }
                Some(elbows / shoulders)
            }
            AlignmentCheck::BodyLine { .. } => SIDES
                .iter()
                .filter_map(|&(shoulder, _, hip, _, ankle)| {
                    let angle = geometry::angle_between_2d(vis(shoulder)?, vis(hip)?, vis(ankle)?)?;
                    Some(180.0 - angle)
                })
                .reduce(f32::max),
            AlignmentCheck::TorsoLean { .. } => {
                let hips = geometry::midpoint(vis(Joint::LeftHip)?, vis(Joint::RightHip)?);
                let shoulders =
                    geometry::midpoint(vis(Joint::LeftShoulder)?, vis(Joint::RightShoulder)?);
                geometry::inclination_from_vertical(hips, shoulders)
            }
            AlignmentCheck::ElbowPinned { .. } => SIDES
                .iter()
                .filter_map(|&(shoulder, elbow, _, _, _)| {
                    Some((vis(elbow)?[0] - vis(shoulder)?[0]).abs())
                })
                .reduce(f32::max),
        }
    }
}

// ============================================================================
// PROFILE
// ============================================================================

/// Everything that makes one exercise different from another. The state
/// machine and validator are generic over this data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub angle: AngleDefinition,
    /// Phase reported while the tracked joint is extended.
    #[serde(default = "default_extended_phase")]
    pub extended_phase: ExercisePhase,
    /// Above this the joint counts as extended.
    pub high_threshold: f32,
    /// Below this the joint counts as flexed.
    pub low_threshold: f32,
    #[serde(default = "default_hysteresis_margin")]
    pub hysteresis_margin: f32,
    #[serde(default = "default_min_stable_frames")]
    pub min_stable_frames: u32,
    #[serde(default = "default_min_rep_interval")]
    pub min_rep_interval_seconds: f64,
    #[serde(default = "default_min_visibility")]
    pub min_visibility: f32,
    /// Median window over the tracked angle. 1 disables smoothing.
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
    pub depth: DepthCheck,
    #[serde(default)]
    pub alignment_checks: Vec<AlignmentCheck>,
    #[serde(default = "default_alignment_violation_frames")]
    pub alignment_violation_frames: u32,
    #[serde(default)]
    pub calories_per_rep: f32,
}

fn default_extended_phase() -> ExercisePhase {
    ExercisePhase::Up
}

fn default_hysteresis_margin() -> f32 {
    10.0
}

fn default_min_stable_frames() -> u32 {
    3
}

fn default_min_rep_interval() -> f64 {
    1.5
}

fn default_min_visibility() -> f32 {
    0.5
}

fn default_smoothing_window() -> usize {
    3
}

fn default_alignment_violation_frames() -> u32 {
    3
}

impl ExerciseProfile {
    pub fn push_ups() -> Self {
        Self {
            id: "push_ups".into(),
            display_name: "Push-ups".into(),
            angle: AngleDefinition {
                name: "elbow".into(),
                triples: vec![
                    [Joint::LeftShoulder, Joint::LeftElbow, Joint::LeftWrist],
                    [Joint::RightShoulder, Joint::RightElbow, Joint::RightWrist],
                ],
                combine: AngleCombine::Average,
                use_depth: false,
            },
            extended_phase: ExercisePhase::Up,
            high_threshold: 150.0,
            low_threshold: 90.0,
            hysteresis_margin: 10.0,
            min_stable_frames: 3,
            min_rep_interval_seconds: 1.5,
            min_visibility: 0.5,
            smoothing_window: 3,
            depth: DepthCheck {
                target_angle: 90.0,
                tolerance: 10.0,
                feedback: "Go deeper - lower your chest more".into(),
            },
            alignment_checks: vec![
                AlignmentCheck::ElbowFlare {
                    max_ratio: 1.3,
                    feedback: "Keep elbows closer to your body".into(),
                },
                AlignmentCheck::BodyLine {
                    max_deviation: 20.0,
                    feedback: "Keep your body in a straight line".into(),
                },
            ],
            alignment_violation_frames: 3,
            calories_per_rep: 0.5,
        }
    }

    pub fn squats() -> Self {
        Self {
            id: "squats".into(),
            display_name: "Squats".into(),
            angle: AngleDefinition {
                name: "knee".into(),
                triples: vec![
                    [Joint::LeftHip, Joint::LeftKnee, Joint::LeftAnkle],
                    [Joint::RightHip, Joint::RightKnee, Joint::RightAnkle],
                ],
                combine: AngleCombine::Average,
                use_depth: false,
            },
            extended_phase: ExercisePhase::Up,
            high_threshold: 150.0,
            low_threshold: 90.0,
            hysteresis_margin: 10.0,
            min_stable_frames: 5,
            min_rep_interval_seconds: 2.0,
            min_visibility: 0.5,
            smoothing_window: 3,
            depth: DepthCheck {
                target_angle: 90.0,
                tolerance: 10.0,
                feedback: "Go deeper - squat until thighs are parallel to ground".into(),
            },
            alignment_checks: vec![
                AlignmentCheck::KneeOverAnkle {
                    max_offset: 0.05,
                    feedback: "Keep knees aligned over your toes".into(),
                },
                AlignmentCheck::TorsoLean {
                    max_degrees: 60.0,
                    feedback: "Keep your chest up and back straight".into(),
                },
            ],
            alignment_violation_frames: 3,
            calories_per_rep: 0.8,
        }
    }

    pub fn bicep_curls() -> Self {
        Self {
            id: "bicep_curls".into(),
            display_name: "Bicep Curls".into(),
            angle: AngleDefinition {
                name: "elbow".into(),
                triples: vec![
                    [Joint::RightShoulder, Joint::RightElbow, Joint::RightWrist],
                    [Joint::LeftShoulder, Joint::LeftElbow, Joint::LeftWrist],
                ],
                combine: AngleCombine::MostVisible,
                use_depth: false,
            },
            extended_phase: ExercisePhase::Down,
            high_threshold: 150.0,
            low_threshold: 50.0,
            hysteresis_margin: 10.0,
            min_stable_frames: 3,
            min_rep_interval_seconds: 1.5,
            min_visibility: 0.5,
            smoothing_window: 3,
            depth: DepthCheck {
                target_angle: 45.0,
                tolerance: 15.0,
                feedback: "Curl higher for full range of motion".into(),
            },
            alignment_checks: vec![AlignmentCheck::ElbowPinned {
                max_offset: 0.1,
                feedback: "Keep your elbow stable at your side".into(),
            }],
            alignment_violation_frames: 3,
            calories_per_rep: 0.3,
        }
    }

    pub fn builtin() -> Vec<Self> {
        vec![Self::push_ups(), Self::squats(), Self::bicep_curls()]
    }

    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }

    pub fn flexed_phase(&self) -> ExercisePhase {
        self.extended_phase.opposite()
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        let invalid = |reason: &str| AnalysisError::InvalidProfile {
            exercise: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id is empty"));
        }
        if self.angle.triples.is_empty() {
            return Err(invalid("angle needs at least one joint triple"));
        }
        if self.extended_phase == ExercisePhase::Transition {
            return Err(invalid("extended_phase must be UP or DOWN"));
        }
        if !self.low_threshold.is_finite() || !self.high_threshold.is_finite() {
            return Err(invalid("thresholds must be finite"));
        }
        if self.low_threshold >= self.high_threshold {
            return Err(invalid("low_threshold must be below high_threshold"));
        }
        if !(self.hysteresis_margin >= 0.0) {
            return Err(invalid("hysteresis_margin must be >= 0"));
        }
        if self.min_stable_frames == 0 {
            return Err(invalid("min_stable_frames must be at least 1"));
        }
        if !(self.min_rep_interval_seconds >= 0.0) {
            return Err(invalid("min_rep_interval_seconds must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.min_visibility) {
            return Err(invalid("min_visibility must be within [0, 1]"));
        }
        if self.smoothing_window == 0 {
            return Err(invalid("smoothing_window must be at least 1"));
        }
        if !(self.depth.tolerance >= 0.0) {
            return Err(invalid("depth tolerance must be >= 0"));
        }
        if self.alignment_violation_frames == 0 {
            return Err(invalid("alignment_violation_frames must be at least 1"));
        }
        if let Some(check) = self.alignment_checks.iter().find(|c| !(c.limit() >= 0.0)) {
            return Err(invalid(&format!("{} bound must be >= 0", check.name())));
        }
        Ok(())
    }
}
