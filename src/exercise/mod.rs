// src/exercise/mod.rs

pub mod profile;
pub mod registry;

pub use profile::{
    AlignmentCheck, AngleCombine, AngleDefinition, AngleMeasurement, DepthCheck, ExerciseProfile,
};
pub use registry::{normalize_id, ExerciseRegistry};
