// src/analysis/form_validator.rs

use super::state_machine::CompletedCycle;
use crate::exercise::ExerciseProfile;
use crate::types::FeedbackMessage;
use std::sync::Arc;
use tracing::debug;

const PRAISE_TEXT: &str = "Good form! Keep it up";
const VISIBILITY_TEXT: &str = "Make sure your whole body is visible to the camera";

/// Consecutive rising ticks that mark the bottom of a dip.
const TURNAROUND_TICKS: usize = 3;
/// Rebound from the deepest angle needed before a dip counts as abandoned.
const TURNAROUND_DEGREES: f32 = 5.0;

/// Classification of one completed rep.
#[derive(Debug, Clone)]
pub struct RepVerdict {
    pub correct: bool,
    /// Depth failure (ERROR) first, then failed alignment checks (WARNING),
    /// or a single INFO praise for a correct rep.
    pub messages: Vec<FeedbackMessage>,
    pub failed_checks: Vec<&'static str>,
}

impl RepVerdict {
    /// Texts of the corrective messages only.
    pub fn corrections(&self) -> Vec<String> {
        if self.correct {
            return Vec::new();
        }
        self.messages.iter().map(|m| m.text.clone()).collect()
    }
}

/// Descent from the extended region that has not reached the flexed one yet.
#[derive(Debug, Clone, Copy)]
struct Dip {
    deepest: f32,
    reached_flexed: bool,
    reported: bool,
}

/// Judges completed cycles against the profile's depth and alignment rules,
/// and tracks pose visibility streaks between reps.
pub struct FormValidator {
    profile: Arc<ExerciseProfile>,
    praise_interval_ms: f64,
    last_praise_ms: Option<f64>,

    visibility_warning_ticks: u32,
    unusable_streak: u32,
    warned_this_streak: bool,

    // Mid-rep advisories
    advisory_interval_ms: Option<f64>,
    live_streaks: Vec<u32>,
    /// One slot per alignment check, then one for depth.
    last_advisory_ms: Vec<Option<f64>>,
    dip: Option<Dip>,
}

impl FormValidator {
    pub fn new(
        profile: Arc<ExerciseProfile>,
        praise_interval_seconds: f64,
        visibility_warning_ticks: u32,
    ) -> Self {
        let checks = profile.alignment_checks.len();
        Self {
            profile,
            praise_interval_ms: praise_interval_seconds * 1000.0,
            last_praise_ms: None,
            visibility_warning_ticks,
            unusable_streak: 0,
            warned_this_streak: false,
            advisory_interval_ms: None,
            live_streaks: vec![0; checks],
            last_advisory_ms: vec![None; checks + 1],
            dip: None,
        }
    }

    /// Turns on mid-rep advisories, each text repeated at most once per
    /// `interval_seconds`.
    pub fn with_advisories(mut self, interval_seconds: f64) -> Self {
        self.advisory_interval_ms = Some(interval_seconds.max(0.0) * 1000.0);
        self
    }

    pub fn evaluate(&mut self, cycle: &CompletedCycle) -> RepVerdict {
        let ts = cycle.confirmed_ms;
        let mut messages = Vec::new();
        let mut failed_checks = Vec::new();

        if !self.profile.depth.is_satisfied(cycle.deepest_angle) {
            failed_checks.push("depth");
            messages.push(FeedbackMessage::error(self.profile.depth.feedback.clone(), ts));
        }

        let needed = self.profile.alignment_violation_frames;
        for (i, check) in self.profile.alignment_checks.iter().enumerate() {
            let limit = check.limit();
            let mut streak = 0u32;
            let mut failed = false;

            for reading in cycle.samples.iter().filter_map(|s| s.readings.get(i).copied().flatten()) {
                if reading > limit {
                    streak += 1;
                    if streak >= needed {
                        failed = true;
                        break;
                    }
                } else {
                    streak = 0;
                }
            }

            if failed {
                failed_checks.push(check.name());
                messages.push(FeedbackMessage::warning(check.feedback(), ts));
            }
        }

        let correct = failed_checks.is_empty();
        if correct {
            let due = self
                .last_praise_ms
                .map_or(true, |last| ts - last >= self.praise_interval_ms);
            if due {
                self.last_praise_ms = Some(ts);
                messages.push(FeedbackMessage::info(PRAISE_TEXT, ts));
            }
        }

        debug!(
            "{} rep {}: correct={} deepest={:.1}° failed={:?}",
            self.profile.id, cycle.rep_index, correct, cycle.deepest_angle, failed_checks
        );

        RepVerdict {
            correct,
            messages,
            failed_checks,
        }
    }

    /// Advisories for a usable tick while the rep is still in progress.
    ///
    /// An alignment check is flagged once its reading has exceeded the limit
    /// for `alignment_violation_frames` ticks in a row. A dip that turns back
    /// up (the last few `recent_angles` rising) before reaching the flexed
    /// region and short of the depth target is flagged once per dip.
    pub fn advise(
        &mut self,
        readings: &[Option<f32>],
        recent_angles: impl DoubleEndedIterator<Item = f32>,
        timestamp_ms: f64,
    ) -> Vec<FeedbackMessage> {
        let Some(interval_ms) = self.advisory_interval_ms else {
            return Vec::new();
        };
        let profile = Arc::clone(&self.profile);
        let mut messages = Vec::new();

        let needed = profile.alignment_violation_frames.max(1);
        for (i, check) in profile.alignment_checks.iter().enumerate() {
            let Some(reading) = readings.get(i).copied().flatten() else {
                continue;
            };
            if reading <= check.limit() {
                self.live_streaks[i] = 0;
                continue;
            }
            self.live_streaks[i] += 1;
            if self.live_streaks[i] >= needed
                && self.advisory_due(i, timestamp_ms, interval_ms)
            {
                messages.push(FeedbackMessage::warning(check.feedback(), timestamp_ms));
            }
        }

        // Newest first
        let tail: Vec<f32> = recent_angles.rev().take(TURNAROUND_TICKS + 1).collect();
        let Some(&latest) = tail.first() else {
            return messages;
        };

        if latest > profile.high_threshold {
            self.dip = None;
            return messages;
        }
        let dip = self.dip.get_or_insert(Dip {
            deepest: latest,
            reached_flexed: false,
            reported: false,
        });
        dip.deepest = dip.deepest.min(latest);
        dip.reached_flexed |= latest < profile.low_threshold;

        let rising = tail.len() == TURNAROUND_TICKS + 1 && tail.windows(2).all(|w| w[0] > w[1]);
        let shallow_turn = rising
            && !dip.reached_flexed
            && !dip.reported
            && dip.deepest < profile.high_threshold - profile.hysteresis_margin
            && latest - dip.deepest >= TURNAROUND_DEGREES
            && !profile.depth.is_satisfied(dip.deepest);

        if shallow_turn {
            dip.reported = true;
            debug!(
                "{}: dip turned at {:.1}°, short of {:.1}°",
                profile.id, dip.deepest, profile.depth.target_angle
            );
            let slot = profile.alignment_checks.len();
            if self.advisory_due(slot, timestamp_ms, interval_ms) {
                messages.push(FeedbackMessage::warning(
                    profile.depth.feedback.clone(),
                    timestamp_ms,
                ));
            }
        }
        messages
    }

    fn advisory_due(&mut self, slot: usize, timestamp_ms: f64, interval_ms: f64) -> bool {
        let due = self.last_advisory_ms[slot]
            .map_or(true, |last| timestamp_ms - last >= interval_ms);
        if due {
            self.last_advisory_ms[slot] = Some(timestamp_ms);
        }
        due
    }

    /// Feeds whether this tick had a usable angle. Returns a warning once per
    /// streak of `visibility_warning_ticks` unusable ticks.
    pub fn observe_visibility(&mut self, usable: bool, timestamp_ms: f64) -> Option<FeedbackMessage> {
        if usable {
            self.unusable_streak = 0;
            self.warned_this_streak = false;
            return None;
        }

        self.unusable_streak += 1;
        if self.visibility_warning_ticks > 0
            && !self.warned_this_streak
            && self.unusable_streak >= self.visibility_warning_ticks
        {
            self.warned_this_streak = true;
            return Some(FeedbackMessage::warning(VISIBILITY_TEXT, timestamp_ms));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::state_machine::CycleSample;
    use crate::types::Severity;

    fn cycle(deepest: f32, knee_offsets: &[Option<f32>], confirmed_ms: f64) -> CompletedCycle {
        CompletedCycle {
            rep_index: 1,
            started_ms: 0.0,
            confirmed_ms,
            deepest_angle: deepest,
            samples: knee_offsets
                .iter()
                .map(|o| CycleSample {
                    timestamp_ms: 0.0,
                    angle: deepest,
                    // knee_over_ankle, torso_lean
                    readings: vec![*o, Some(5.0)],
                })
                .collect(),
        }
    }

    fn validator() -> FormValidator {
        FormValidator::new(Arc::new(ExerciseProfile::squats()), 5.0, 3)
    }

    #[test]
    fn test_clean_rep_is_correct_with_praise() {
        let mut v = validator();
        let verdict = v.evaluate(&cycle(75.0, &[Some(0.01); 10], 1000.0));
        assert!(verdict.correct);
        assert_eq!(verdict.messages.len(), 1);
        assert_eq!(verdict.messages[0].severity, Severity::Info);
        assert!(verdict.corrections().is_empty());
    }

    #[test]
    fn test_shallow_rep_is_error() {
        let mut v = validator();
        let verdict = v.evaluate(&cycle(120.0, &[Some(0.0); 10], 1000.0));
        assert!(!verdict.correct);
        assert_eq!(verdict.failed_checks, vec!["depth"]);
        assert_eq!(verdict.messages[0].severity, Severity::Error);
    }

    #[test]
    fn test_alignment_needs_consecutive_violations() {
        let mut v = validator();
        // Two bad samples in a row, never three
        let offsets = [Some(0.1), Some(0.1), Some(0.0), Some(0.1), Some(0.1), Some(0.0)];
        assert!(v.evaluate(&cycle(80.0, &offsets, 1000.0)).correct);

        let offsets = [Some(0.0), Some(0.1), Some(0.1), Some(0.1)];
        let verdict = v.evaluate(&cycle(80.0, &offsets, 9000.0));
        assert!(!verdict.correct);
        assert_eq!(verdict.failed_checks, vec!["knee_over_ankle"]);
        assert_eq!(verdict.messages[0].severity, Severity::Warning);
        assert_eq!(verdict.corrections(), vec!["Keep knees aligned over your toes"]);
    }

    #[test]
    fn test_hidden_samples_are_skipped() {
        let mut v = validator();
        let offsets = [Some(0.1), None, Some(0.1), None, Some(0.1)];
        assert!(!v.evaluate(&cycle(80.0, &offsets, 1000.0)).correct);
    }

    #[test]
    fn test_praise_is_rate_limited() {
        let mut v = validator();
        let clean = [Some(0.0); 5];
        assert_eq!(v.evaluate(&cycle(80.0, &clean, 1000.0)).messages.len(), 1);
        assert!(v.evaluate(&cycle(80.0, &clean, 3000.0)).messages.is_empty());
        assert_eq!(v.evaluate(&cycle(80.0, &clean, 6000.0)).messages.len(), 1);
    }

    fn advising() -> FormValidator {
        validator().with_advisories(3.0)
    }

    /// Feeds `angles` at 100 ms spacing with aligned knees, returning every
    /// advisory text.
    fn feed_angles(
        v: &mut FormValidator,
        history: &mut Vec<f32>,
        angles: &[f32],
        t: &mut f64,
    ) -> Vec<String> {
        let mut texts = Vec::new();
        for &angle in angles {
            history.push(angle);
            let aligned = [Some(0.0), Some(5.0)];
            for m in v.advise(&aligned, history.iter().copied(), *t) {
                texts.push(m.text);
            }
            *t += 100.0;
        }
        texts
    }

    #[test]
    fn test_misalignment_is_advised_mid_rep() {
        let mut v = advising();
        let drift = [Some(0.1), Some(5.0)];
        let angles = [120.0];

        assert!(v.advise(&drift, angles.iter().copied(), 0.0).is_empty());
        assert!(v.advise(&drift, angles.iter().copied(), 100.0).is_empty());
        let third = v.advise(&drift, angles.iter().copied(), 200.0);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].text, "Keep knees aligned over your toes");
        assert_eq!(third[0].severity, Severity::Warning);

        // Rate-limited while the violation lasts
        assert!(v.advise(&drift, angles.iter().copied(), 1000.0).is_empty());
        assert_eq!(v.advise(&drift, angles.iter().copied(), 3200.0).len(), 1);
    }

    #[test]
    fn test_advisories_off_by_default() {
        let mut v = validator();
        let drift = [Some(0.1), Some(5.0)];
        for i in 0..10 {
            assert!(v.advise(&drift, [120.0].into_iter(), i as f64 * 100.0).is_empty());
        }
    }

    #[test]
    fn test_shallow_turnaround_is_advised_once_per_dip() {
        let mut v = advising();
        let mut history = Vec::new();
        let mut t = 0.0;

        let down_up = [165.0, 150.0, 135.0, 120.0, 115.0, 118.0, 122.0, 127.0, 133.0, 140.0];
        let texts = feed_angles(&mut v, &mut history, &down_up, &mut t);
        assert_eq!(texts, vec!["Go deeper - squat until thighs are parallel to ground"]);

        // Back to standing re-arms; the next shallow dip is flagged again
        t += 5000.0;
        let texts = feed_angles(&mut v, &mut history, &down_up, &mut t);
        assert_eq!(texts.len(), 1);
    }

    #[test]
    fn test_deep_dip_is_not_advised() {
        let mut v = advising();
        let mut history = Vec::new();
        let mut t = 0.0;
        let down_up = [165.0, 130.0, 100.0, 85.0, 80.0, 84.0, 95.0, 110.0, 130.0, 160.0];
        assert!(feed_angles(&mut v, &mut history, &down_up, &mut t).is_empty());
    }

    #[test]
    fn test_visibility_warning_once_per_streak() {
        let mut v = validator();
        assert!(v.observe_visibility(false, 0.0).is_none());
        assert!(v.observe_visibility(false, 1.0).is_none());
        let warning = v.observe_visibility(false, 2.0).unwrap();
        assert_eq!(warning.severity, Severity::Warning);
        assert!(v.observe_visibility(false, 3.0).is_none());

        assert!(v.observe_visibility(true, 4.0).is_none());
        for t in 0..2 {
            assert!(v.observe_visibility(false, 5.0 + t as f64).is_none());
        }
        assert!(v.observe_visibility(false, 8.0).is_some());
    }
}
