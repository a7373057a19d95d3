// src/analysis/accumulator.rs

use crate::types::{FeedbackMessage, RepEvent};
use serde::Serialize;
use std::collections::VecDeque;

/// Read-only view of a session's counters, handed to the annotator and
/// included in live updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccumulatorSnapshot {
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub accuracy: f32,
    /// Newest last
    pub recent_feedback: Vec<FeedbackMessage>,
    pub first_tick_ms: Option<f64>,
    pub last_rep_ms: Option<f64>,
    pub last_update_ms: Option<f64>,
}

impl AccumulatorSnapshot {
    pub fn total(&self) -> u32 {
        self.correct_count + self.incorrect_count
    }

    /// Up to `n` messages, newest first.
    pub fn latest_feedback(&self, n: usize) -> impl Iterator<Item = &FeedbackMessage> {
        self.recent_feedback.iter().rev().take(n)
    }
}

/// Running counters for one session. Counters only ever grow.
#[derive(Debug, Clone)]
pub struct SessionAccumulator {
    correct_count: u32,
    incorrect_count: u32,
    recent_feedback: VecDeque<FeedbackMessage>,
    capacity: usize,
    first_tick_ms: Option<f64>,
    last_rep_ms: Option<f64>,
    last_update_ms: Option<f64>,
}

impl SessionAccumulator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            correct_count: 0,
            incorrect_count: 0,
            recent_feedback: VecDeque::with_capacity(capacity),
            capacity,
            first_tick_ms: None,
            last_rep_ms: None,
            last_update_ms: None,
        }
    }

    pub fn touch(&mut self, timestamp_ms: f64) {
        self.first_tick_ms.get_or_insert(timestamp_ms);
        self.last_update_ms = Some(timestamp_ms);
    }

    pub fn record_rep(&mut self, event: &RepEvent) {
        if event.correct {
            self.correct_count += 1;
        } else {
            self.incorrect_count += 1;
        }
        self.last_rep_ms = Some(event.timestamp_ms);
        self.touch(event.timestamp_ms);
    }

    pub fn record_feedback(&mut self, message: FeedbackMessage) {
        self.touch(message.timestamp_ms);
        // Drop oldest if full
        if self.recent_feedback.len() >= self.capacity {
            self.recent_feedback.pop_front();
        }
        self.recent_feedback.push_back(message);
    }

    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    pub fn incorrect_count(&self) -> u32 {
        self.incorrect_count
    }

    pub fn total(&self) -> u32 {
        self.correct_count + self.incorrect_count
    }

    pub fn accuracy(&self) -> f32 {
        self.correct_count as f32 / self.total().max(1) as f32
    }

    pub fn snapshot(&self) -> AccumulatorSnapshot {
        AccumulatorSnapshot {
            correct_count: self.correct_count,
            incorrect_count: self.incorrect_count,
            accuracy: self.accuracy(),
            recent_feedback: self.recent_feedback.iter().cloned().collect(),
            first_tick_ms: self.first_tick_ms,
            last_rep_ms: self.last_rep_ms,
            last_update_ms: self.last_update_ms,
        }
    }
}
