// src/analysis/mod.rs
//
// Per-exercise rep analysis.
//
// Signal flow:
//   Pose → profile angle → smoother → state_machine ─→ CompletedCycle
//                                                        ↓
//                                        form_validator → RepVerdict
//                                                        ↓
//                                          accumulator → AccumulatorSnapshot
//
// Orchestrated per session by pipeline::session::AnalysisSession.

pub mod accumulator;
pub mod form_validator;
pub mod smoother;
pub mod state_machine;

#[cfg(test)]
pub(crate) mod testing;

pub use accumulator::{AccumulatorSnapshot, SessionAccumulator};
pub use form_validator::{FormValidator, RepVerdict};
pub use smoother::AngleSmoother;
pub use state_machine::{
    CompletedCycle, CycleSample, Extreme, RepStateMachine, StateMachineLimits, TickOutcome,
};
