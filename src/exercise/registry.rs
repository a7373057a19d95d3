// src/exercise/registry.rs

use super::profile::ExerciseProfile;
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::Config;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Lowercases and maps `-` and spaces to `_`, so "Push-Ups" finds `push_ups`.
pub fn normalize_id(id: &str) -> String {
    id.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Read-only lookup of exercise profiles by normalized id.
#[derive(Debug, Clone)]
pub struct ExerciseRegistry {
    profiles: BTreeMap<String, Arc<ExerciseProfile>>,
}

impl ExerciseRegistry {
    pub fn builtin() -> Self {
        let profiles = ExerciseProfile::builtin()
            .into_iter()
            .map(|p| (p.id.clone(), Arc::new(p)))
            .collect();
        Self { profiles }
    }

    /// Built-in profiles plus the ones declared in `config.exercises`.
    pub fn from_config(config: &Config) -> AnalysisResult<Self> {
        let mut registry = Self::builtin();
        for profile in &config.exercises {
            registry.register(profile.clone())?;
        }
        Ok(registry)
    }

    /// Adds a profile, replacing any profile with the same normalized id.
    pub fn register(&mut self, mut profile: ExerciseProfile) -> AnalysisResult<()> {
        profile.id = normalize_id(&profile.id);
        profile.validate()?;

        if self.profiles.contains_key(&profile.id) {
            info!("🔁 Overriding exercise profile '{}'", profile.id);
        } else {
            debug!("Registered exercise profile '{}'", profile.id);
        }
        self.profiles.insert(profile.id.clone(), Arc::new(profile));
        Ok(())
    }

    pub fn resolve(&self, id: &str) -> AnalysisResult<Arc<ExerciseProfile>> {
        self.profiles
            .get(&normalize_id(id))
            .cloned()
            .ok_or_else(|| AnalysisError::UnknownExercise(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for ExerciseRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("Push-Ups"), "push_ups");
        assert_eq!(normalize_id(" bicep curls "), "bicep_curls");
    }

    #[test]
    fn test_resolve_builtin_and_unknown() {
        let registry = ExerciseRegistry::builtin();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.resolve("SQUATS").unwrap().id, "squats");

        let err = registry.resolve("jumping_jacks").unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownExercise(ref id) if id == "jumping_jacks"));
    }

    #[test]
    fn test_config_overrides_builtin() {
        let mut custom = ExerciseProfile::squats();
        custom.id = "Squats".into();
        custom.min_stable_frames = 8;

        let config = Config {
            exercises: vec![custom],
            ..Default::default()
        };
        let registry = ExerciseRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.resolve("squats").unwrap().min_stable_frames, 8);
    }

    #[test]
    fn test_invalid_profile_is_rejected() {
        let mut broken = ExerciseProfile::push_ups();
        broken.id = "wall_sits".into();
        broken.min_stable_frames = 0;

        let mut registry = ExerciseRegistry::builtin();
        assert!(registry.register(broken).is_err());
        assert!(registry.resolve("wall_sits").is_err());
    }
}
