// src/pipeline/session.rs
//
// One exercise session: pose ticks in, rep events and feedback out.
// Shared by the batch pipeline and the live controller so both modes
// count and judge reps identically.

use crate::analysis::{
    AccumulatorSnapshot, FormValidator, RepStateMachine, SessionAccumulator, StateMachineLimits,
};
use crate::exercise::ExerciseProfile;
use crate::types::{AnalysisConfig, ExercisePhase, FeedbackMessage, Pose, RepEvent, Severity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// INPUT / OUTPUT
// ============================================================================

#[derive(Debug, Clone)]
pub struct TickResult {
    pub rep: Option<RepEvent>,
    /// Every message produced on this tick, in emission order.
    pub feedback: Vec<FeedbackMessage>,
    pub phase: ExercisePhase,
    pub angle: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceRating {
    Excellent,
    Good,
    Fair,
    #[serde(rename = "Needs Improvement")]
    NeedsImprovement,
}

impl PerformanceRating {
    pub fn from_percentage(accuracy_percentage: f32) -> Self {
        if accuracy_percentage >= 90.0 {
            PerformanceRating::Excellent
        } else if accuracy_percentage >= 80.0 {
            PerformanceRating::Good
        } else if accuracy_percentage >= 70.0 {
            PerformanceRating::Fair
        } else {
            PerformanceRating::NeedsImprovement
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackCount {
    pub text: String,
    pub severity: Severity,
    pub occurrences: u32,
}

/// Final read-out of a session. Times are media/session time, so replaying
/// the same input yields an equal summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub exercise: String,
    pub display_name: String,
    pub total_reps: u32,
    pub correct_reps: u32,
    pub incorrect_reps: u32,
    pub accuracy: f32,
    pub accuracy_percentage: f32,
    pub performance_rating: PerformanceRating,
    pub duration_ms: f64,
    pub ticks_processed: u64,
    pub ticks_without_pose: u64,
    pub calories_burned: f32,
    /// Corrective messages in first-seen order with occurrence counts.
    pub feedback_summary: Vec<FeedbackCount>,
    pub suggestions: Vec<String>,
    pub reps: Vec<RepEvent>,
    pub recent_feedback: Vec<FeedbackMessage>,
}

// ============================================================================
// SESSION
// ============================================================================

pub struct AnalysisSession {
    profile: Arc<ExerciseProfile>,
    state_machine: RepStateMachine,
    validator: FormValidator,
    accumulator: SessionAccumulator,
    reps: Vec<RepEvent>,
    feedback_counts: Vec<FeedbackCount>,
    ticks_processed: u64,
    ticks_without_pose: u64,
    first_tick_ms: Option<f64>,
    last_tick_ms: Option<f64>,
}

impl AnalysisSession {
    pub fn new(profile: Arc<ExerciseProfile>, config: &AnalysisConfig) -> Self {
        let limits = StateMachineLimits {
            history_capacity: config.history_capacity,
            max_cycle_samples: config.max_cycle_samples,
        };
        let mut validator = FormValidator::new(
            Arc::clone(&profile),
            config.praise_interval_seconds,
            config.visibility_warning_ticks,
        );
        if config.live_feedback {
            validator = validator.with_advisories(config.live_feedback_interval_seconds);
        }
        Self {
            state_machine: RepStateMachine::new(Arc::clone(&profile), limits),
            validator,
            accumulator: SessionAccumulator::new(config.feedback_capacity),
            profile,
            reps: Vec::new(),
            feedback_counts: Vec::new(),
            ticks_processed: 0,
            ticks_without_pose: 0,
            first_tick_ms: None,
            last_tick_ms: None,
        }
    }

    pub fn tick(&mut self, pose: Option<&Pose>, timestamp_ms: f64) -> TickResult {
        self.ticks_processed += 1;
        self.first_tick_ms.get_or_insert(timestamp_ms);
        self.last_tick_ms = Some(timestamp_ms);
        self.accumulator.touch(timestamp_ms);

        let outcome = self.state_machine.update(pose, timestamp_ms);
        let usable = outcome.angle.is_some();
        if !usable {
            self.ticks_without_pose += 1;
        }

        let mut feedback = Vec::new();
        if let Some(message) = self.validator.observe_visibility(usable, timestamp_ms) {
            warn!(
                "👀 {}: no usable pose for {} ticks",
                self.profile.id, self.ticks_without_pose
            );
            feedback.push(message);
        }

        // Mid-rep advisories show on the overlay but are left out of the
        // per-rep feedback counts
        let advisories = if usable {
            self.validator.advise(
                &outcome.readings,
                self.state_machine.recent_angles(),
                timestamp_ms,
            )
        } else {
            Vec::new()
        };

        let mut rep = None;
        if let Some(cycle) = outcome.completed {
            let verdict = self.validator.evaluate(&cycle);
            let event = RepEvent {
                exercise: self.profile.id.clone(),
                rep_index: cycle.rep_index,
                correct: verdict.correct,
                feedback: verdict.corrections(),
                timestamp_ms: cycle.confirmed_ms,
                deepest_angle: cycle.deepest_angle,
            };
            self.accumulator.record_rep(&event);

            if event.correct {
                info!(
                    "✅ {} rep #{} correct (deepest {:.1}°)",
                    self.profile.id, event.rep_index, event.deepest_angle
                );
            } else {
                info!(
                    "❌ {} rep #{} incorrect: {}",
                    self.profile.id,
                    event.rep_index,
                    event.feedback.join("; ")
                );
            }

            feedback.extend(verdict.messages);
            self.reps.push(event.clone());
            rep = Some(event);
        }

        for message in &feedback {
            self.count_feedback(message);
            self.accumulator.record_feedback(message.clone());
        }
        if rep.is_none() {
            for message in advisories {
                self.accumulator.record_feedback(message.clone());
                feedback.push(message);
            }
        }

        TickResult {
            rep,
            feedback,
            phase: outcome.phase,
            angle: outcome.angle,
        }
    }

    fn count_feedback(&mut self, message: &FeedbackMessage) {
        if message.severity == Severity::Info {
            return;
        }
        match self
            .feedback_counts
            .iter_mut()
            .find(|c| c.text == message.text)
        {
            Some(entry) => entry.occurrences += 1,
            None => self.feedback_counts.push(FeedbackCount {
                text: message.text.clone(),
                severity: message.severity,
                occurrences: 1,
            }),
        }
    }

    pub fn snapshot(&self) -> AccumulatorSnapshot {
        self.accumulator.snapshot()
    }

    pub fn profile(&self) -> &Arc<ExerciseProfile> {
        &self.profile
    }

    pub fn phase(&self) -> ExercisePhase {
        self.state_machine.phase()
    }

    pub fn ticks_processed(&self) -> u64 {
        self.ticks_processed
    }

    pub fn summary(&self) -> SessionSummary {
        let snapshot = self.accumulator.snapshot();
        let total = snapshot.total();
        let accuracy_percentage = snapshot.accuracy * 100.0;

        let mut suggestions = Vec::new();
        if total > 0 && accuracy_percentage < 70.0 {
            suggestions.push("Focus on maintaining proper form throughout the exercise".to_string());
        }
        // First-seen wins ties
        let most_common = self
            .feedback_counts
            .iter()
            .fold(None::<&FeedbackCount>, |best, c| match best {
                Some(b) if b.occurrences >= c.occurrences => Some(b),
                _ => Some(c),
            });
        if let Some(common) = most_common {
            suggestions.push(format!("Work on: {}", common.text));
        }

        let duration_ms = match (self.first_tick_ms, self.last_tick_ms) {
            (Some(first), Some(last)) => (last - first).max(0.0),
            _ => 0.0,
        };

        SessionSummary {
            exercise: self.profile.id.clone(),
            display_name: self.profile.label().to_string(),
            total_reps: total,
            correct_reps: snapshot.correct_count,
            incorrect_reps: snapshot.incorrect_count,
            accuracy: snapshot.accuracy,
            accuracy_percentage,
            performance_rating: PerformanceRating::from_percentage(accuracy_percentage),
            duration_ms,
            ticks_processed: self.ticks_processed,
            ticks_without_pose: self.ticks_without_pose,
            calories_burned: self.profile.calories_per_rep * total as f32,
            feedback_summary: self.feedback_counts.clone(),
            suggestions,
            reps: self.reps.clone(),
            recent_feedback: snapshot.recent_feedback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::squat_pose;

    /// 10 s at 30 fps: stand at 165°, squat to 70°, stand back up at 160°.
    fn squat_scenario(session: &mut AnalysisSession, knee_drift: f32) -> u32 {
        let mut reps = 0;
        for frame in 0..300u32 {
            let t = frame as f64 * 1000.0 / 30.0;
            let angle = match frame {
                0..=59 => 165.0,
                60..=119 => 165.0 - (frame - 60) as f32 * 95.0 / 60.0,
                120..=179 => 70.0,
                180..=239 => 70.0 + (frame - 180) as f32 * 90.0 / 60.0,
                _ => 160.0,
            };
            let drift = if (100..200).contains(&frame) { knee_drift } else { 0.0 };
            let pose = squat_pose(angle, drift, 0.9);
            if session.tick(Some(&pose), t).rep.is_some() {
                reps += 1;
            }
        }
        reps
    }

    fn squats_session() -> AnalysisSession {
        AnalysisSession::new(Arc::new(ExerciseProfile::squats()), &AnalysisConfig::default())
    }

    #[test]
    fn test_squat_scenario_aligned_knees_is_correct() {
        let mut session = squats_session();
        assert_eq!(squat_scenario(&mut session, 0.0), 1);

        let summary = session.summary();
        assert_eq!(summary.total_reps, 1);
        assert_eq!(summary.correct_reps, 1);
        assert_eq!(summary.performance_rating, PerformanceRating::Excellent);
        assert!(summary.reps[0].deepest_angle < 71.0);
        assert!((summary.calories_burned - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_squat_scenario_drifting_knees_is_incorrect() {
        let mut session = squats_session();
        assert_eq!(squat_scenario(&mut session, 0.1), 1);

        let summary = session.summary();
        assert_eq!(summary.total_reps, 1);
        assert_eq!(summary.incorrect_reps, 1);
        assert_eq!(
            summary.reps[0].feedback,
            vec!["Keep knees aligned over your toes".to_string()]
        );
        assert_eq!(summary.feedback_summary[0].occurrences, 1);
        assert_eq!(
            summary.suggestions,
            vec![
                "Focus on maintaining proper form throughout the exercise".to_string(),
                "Work on: Keep knees aligned over your toes".to_string(),
            ]
        );
    }

    #[test]
    fn test_drifting_knees_are_advised_before_the_rep() {
        let mut session = squats_session();
        let mut first_advice = None;
        let mut rep_frame = None;
        for frame in 0..300u32 {
            let t = frame as f64 * 1000.0 / 30.0;
            let angle = match frame {
                0..=59 => 165.0,
                60..=119 => 165.0 - (frame - 60) as f32 * 95.0 / 60.0,
                120..=179 => 70.0,
                180..=239 => 70.0 + (frame - 180) as f32 * 90.0 / 60.0,
                _ => 160.0,
            };
            let drift = if (100..200).contains(&frame) { 0.1 } else { 0.0 };
            let result = session.tick(Some(&squat_pose(angle, drift, 0.9)), t);
            if result.rep.is_some() {
                rep_frame = Some(frame);
            }
            let advised = result
                .feedback
                .iter()
                .any(|m| m.text == "Keep knees aligned over your toes");
            if advised && first_advice.is_none() {
                first_advice = Some(frame);
            }
        }

        let (first_advice, rep_frame) = (first_advice.unwrap(), rep_frame.unwrap());
        assert!((100..110).contains(&first_advice), "advised at {first_advice}");
        assert!(first_advice < rep_frame);

        // The overlay sees the advisory, the report counts the rep once
        let summary = session.summary();
        assert!(summary
            .recent_feedback
            .iter()
            .any(|m| m.text == "Keep knees aligned over your toes" && m.timestamp_ms < 4000.0));
        assert_eq!(summary.feedback_summary[0].occurrences, 1);
    }

    #[test]
    fn test_live_feedback_can_be_disabled() {
        let config = AnalysisConfig {
            live_feedback: false,
            ..AnalysisConfig::default()
        };
        let mut session = AnalysisSession::new(Arc::new(ExerciseProfile::squats()), &config);
        for frame in 0..30u32 {
            let result = session.tick(Some(&squat_pose(120.0, 0.1, 0.9)), frame as f64 * 33.0);
            assert!(result.feedback.is_empty());
        }
    }

    #[test]
    fn test_missing_pose_ticks_warn_once() {
        let mut session = squats_session();
        let mut warnings = 0;
        for i in 0..40 {
            let result = session.tick(None, i as f64 * 33.0);
            warnings += result.feedback.len();
            assert!(result.angle.is_none());
        }
        assert_eq!(warnings, 1);

        let summary = session.summary();
        assert_eq!(summary.ticks_processed, 40);
        assert_eq!(summary.ticks_without_pose, 40);
        assert_eq!(summary.total_reps, 0);
        assert_eq!(summary.accuracy, 0.0);
        assert!((summary.duration_ms - 39.0 * 33.0).abs() < 1e-9);
    }

    #[test]
    fn test_rating_bands() {
        assert_eq!(PerformanceRating::from_percentage(95.0), PerformanceRating::Excellent);
        assert_eq!(PerformanceRating::from_percentage(80.0), PerformanceRating::Good);
        assert_eq!(PerformanceRating::from_percentage(70.0), PerformanceRating::Fair);
        assert_eq!(
            PerformanceRating::from_percentage(10.0),
            PerformanceRating::NeedsImprovement
        );
        let json = serde_json::to_string(&PerformanceRating::NeedsImprovement).unwrap();
        assert_eq!(json, "\"Needs Improvement\"");
    }
}
