// src/analysis/state_machine.rs

use super::smoother::AngleSmoother;
use crate::exercise::{AngleMeasurement, ExerciseProfile};
use crate::types::{ExercisePhase, Pose};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// The two ends of a repetition's range of motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extreme {
    Extended,
    Flexed,
}

/// One analysed tick inside the rep in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSample {
    pub timestamp_ms: f64,
    pub angle: f32,
    /// One entry per profile alignment check, None when its landmarks were hidden.
    pub readings: Vec<Option<f32>>,
}

/// A full extended → flexed → extended cycle that passed the interval check.
#[derive(Debug, Clone)]
pub struct CompletedCycle {
    pub rep_index: u32,
    pub started_ms: f64,
    pub confirmed_ms: f64,
    pub deepest_angle: f32,
    pub samples: Vec<CycleSample>,
}

#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub phase: ExercisePhase,
    /// Smoothed tracked angle, None on a no-op tick.
    pub angle: Option<f32>,
    pub measurement: Option<AngleMeasurement>,
    /// Alignment readings of this tick, empty on a no-op tick.
    pub readings: Vec<Option<f32>>,
    pub completed: Option<CompletedCycle>,
}

/// Settings that are per-session rather than per-exercise.
#[derive(Debug, Clone, Copy)]
pub struct StateMachineLimits {
    pub history_capacity: usize,
    pub max_cycle_samples: usize,
}

impl Default for StateMachineLimits {
    fn default() -> Self {
        Self {
            history_capacity: 90,
            max_cycle_samples: 900,
        }
    }
}

/// Hysteresis rep counter, generic over the exercise profile.
///
/// An extreme becomes *settled* once the angle has stayed in its entry region
/// for `min_stable_frames` analysed ticks. While the angle sits inside the
/// candidate's hysteresis band (but outside its entry region) the counter
/// holds; leaving the band resets it. A rep is an extended → flexed →
/// extended sequence of settled extremes.
pub struct RepStateMachine {
    profile: Arc<ExerciseProfile>,
    limits: StateMachineLimits,
    smoother: AngleSmoother,
    phase: ExercisePhase,

    settled: Option<Extreme>,
    candidate: Option<Extreme>,
    stable_frames: u32,

    // Cycle tracking
    cycle_open: bool,
    seen_flexed: bool,
    cycle: VecDeque<CycleSample>,
    cycle_started_ms: f64,
    cycle_deepest: f32,

    last_rep_ms: Option<f64>,
    rep_count: u32,
    discarded_cycles: u32,
    history: VecDeque<f32>,
}

impl RepStateMachine {
    pub fn new(profile: Arc<ExerciseProfile>, limits: StateMachineLimits) -> Self {
        let smoother = AngleSmoother::new(profile.smoothing_window);
        Self {
            profile,
            limits,
            smoother,
            phase: ExercisePhase::Transition,
            settled: None,
            candidate: None,
            stable_frames: 0,
            cycle_open: false,
            seen_flexed: false,
            cycle: VecDeque::new(),
            cycle_started_ms: 0.0,
            cycle_deepest: f32::INFINITY,
            last_rep_ms: None,
            rep_count: 0,
            discarded_cycles: 0,
            history: VecDeque::with_capacity(limits.history_capacity),
        }
    }

    pub fn update(&mut self, pose: Option<&Pose>, timestamp_ms: f64) -> TickOutcome {
        let profile = Arc::clone(&self.profile);
        let measured = pose.and_then(|p| {
            profile
                .angle
                .measure(p, profile.min_visibility)
                .filter(|m| m.degrees.is_finite())
                .map(|m| (p, m))
        });

        // Undefined angle: nothing moves
        let Some((pose, measurement)) = measured else {
            return TickOutcome {
                phase: self.phase,
                angle: None,
                measurement: None,
                readings: Vec::new(),
                completed: None,
            };
        };

        let angle = self.smoother.smooth(measurement.degrees);
        self.history.push_back(angle);
        if self.history.len() > self.limits.history_capacity {
            self.history.pop_front();
        }

        let sample = CycleSample {
            timestamp_ms,
            angle,
            readings: profile
                .alignment_checks
                .iter()
                .map(|check| check.measure(pose, profile.min_visibility))
                .collect(),
        };
        let readings = sample.readings.clone();

        let mut completed = None;
        match self.classify(angle) {
            Some(Extreme::Extended) => {
                if self.cycle_open && self.seen_flexed {
                    self.push_sample(sample.clone());
                    completed = self.close_cycle(timestamp_ms);
                }
                self.open_cycle(sample);
            }
            Some(Extreme::Flexed) => {
                if self.cycle_open {
                    self.seen_flexed = true;
                }
                self.push_sample(sample);
            }
            None => self.push_sample(sample),
        }

        self.phase = self.reported_phase(angle);

        TickOutcome {
            phase: self.phase,
            angle: Some(angle),
            measurement: Some(measurement),
            readings,
            completed,
        }
    }

    /// Advances the stable-frame counter. Returns the extreme that settled on
    /// this tick, if any.
    fn classify(&mut self, angle: f32) -> Option<Extreme> {
        let region = self.entry_region(angle);

        match region {
            Some(extreme) if Some(extreme) == self.settled => {
                // Settled extreme wins over a pending candidate
                self.candidate = None;
                self.stable_frames = 0;
                None
            }
            Some(extreme) => {
                if self.candidate == Some(extreme) {
                    self.stable_frames += 1;
                } else {
                    self.candidate = Some(extreme);
                    self.stable_frames = 1;
                }

                if self.stable_frames >= self.profile.min_stable_frames {
                    debug!(
                        "{}: {:?} settled at {:.1}° after {} frames",
                        self.profile.id, extreme, angle, self.stable_frames
                    );
                    self.settled = Some(extreme);
                    self.candidate = None;
                    self.stable_frames = 0;
                    Some(extreme)
                } else {
                    None
                }
            }
            None => {
                if let Some(pending) = self.candidate {
                    if !self.in_band(pending, angle) {
                        self.candidate = None;
                        self.stable_frames = 0;
                    }
                }
                None
            }
        }
    }

    fn entry_region(&self, angle: f32) -> Option<Extreme> {
        if angle < self.profile.low_threshold {
            Some(Extreme::Flexed)
        } else if angle > self.profile.high_threshold {
            Some(Extreme::Extended)
        } else {
            None
        }
    }

    fn in_band(&self, extreme: Extreme, angle: f32) -> bool {
        match extreme {
            Extreme::Flexed => angle <= self.profile.low_threshold + self.profile.hysteresis_margin,
            Extreme::Extended => {
                angle >= self.profile.high_threshold - self.profile.hysteresis_margin
            }
        }
    }

    fn reported_phase(&self, angle: f32) -> ExercisePhase {
        if self.candidate.is_some() {
            return ExercisePhase::Transition;
        }
        match self.settled {
            Some(extreme) if self.in_band(extreme, angle) => self.phase_of(extreme),
            _ => ExercisePhase::Transition,
        }
    }

    fn phase_of(&self, extreme: Extreme) -> ExercisePhase {
        match extreme {
            Extreme::Extended => self.profile.extended_phase,
            Extreme::Flexed => self.profile.flexed_phase(),
        }
    }

    fn open_cycle(&mut self, first: CycleSample) {
        self.cycle.clear();
        self.cycle_open = true;
        self.seen_flexed = false;
        self.cycle_started_ms = first.timestamp_ms;
        self.cycle_deepest = f32::INFINITY;
        self.push_sample(first);
    }

    fn push_sample(&mut self, sample: CycleSample) {
        if !self.cycle_open {
            return;
        }
        self.cycle_deepest = self.cycle_deepest.min(sample.angle);
        self.cycle.push_back(sample);
        if self.cycle.len() > self.limits.max_cycle_samples {
            self.cycle.pop_front();
        }
    }

    fn close_cycle(&mut self, timestamp_ms: f64) -> Option<CompletedCycle> {
        let min_gap_ms = self.profile.min_rep_interval_seconds * 1000.0;
        if let Some(last) = self.last_rep_ms {
            if timestamp_ms - last < min_gap_ms {
                self.discarded_cycles += 1;
                debug!(
                    "{}: cycle discarded, {:.0}ms since last rep (min {:.0}ms)",
                    self.profile.id,
                    timestamp_ms - last,
                    min_gap_ms
                );
                return None;
            }
        }

        self.rep_count += 1;
        self.last_rep_ms = Some(timestamp_ms);

        Some(CompletedCycle {
            rep_index: self.rep_count,
            started_ms: self.cycle_started_ms,
            confirmed_ms: timestamp_ms,
            deepest_angle: self.cycle_deepest,
            samples: self.cycle.drain(..).collect(),
        })
    }

    pub fn phase(&self) -> ExercisePhase {
        self.phase
    }

    pub fn settled(&self) -> Option<Extreme> {
        self.settled
    }

    pub fn candidate(&self) -> Option<Extreme> {
        self.candidate
    }

    pub fn stable_frames(&self) -> u32 {
        self.stable_frames
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_count
    }

    pub fn discarded_cycles(&self) -> u32 {
        self.discarded_cycles
    }

    /// Smoothed angles of the last `history_capacity` usable ticks, oldest first.
    pub fn recent_angles(&self) -> impl DoubleEndedIterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    pub fn profile(&self) -> &ExerciseProfile {
        &self.profile
    }
}
