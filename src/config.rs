// src/config.rs

use crate::error::AnalysisError;
use crate::exercise::ExerciseRegistry;
use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with. Exercise profiles are
    /// checked by building the registry they would produce.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.analysis.feedback_capacity == 0 {
            return Err(AnalysisError::Config(
                "analysis.feedback_capacity must be at least 1".into(),
            ));
        }
        if self.analysis.history_capacity == 0 {
            return Err(AnalysisError::Config(
                "analysis.history_capacity must be at least 1".into(),
            ));
        }
        if !(self.analysis.praise_interval_seconds >= 0.0) {
            return Err(AnalysisError::Config(
                "analysis.praise_interval_seconds must be >= 0".into(),
            ));
        }
        if !(self.analysis.live_feedback_interval_seconds >= 0.0) {
            return Err(AnalysisError::Config(
                "analysis.live_feedback_interval_seconds must be >= 0".into(),
            ));
        }
        if self.batch.sample_stride == 0 {
            return Err(AnalysisError::Config(
                "batch.sample_stride must be at least 1".into(),
            ));
        }
        if self.batch.max_concurrent_videos == 0 {
            return Err(AnalysisError::Config(
                "batch.max_concurrent_videos must be at least 1".into(),
            ));
        }
        if self.live.queue_capacity == 0 {
            return Err(AnalysisError::Config(
                "live.queue_capacity must be at least 1".into(),
            ));
        }
        if !(self.video.default_fps > 0.0) {
            return Err(AnalysisError::Config(
                "video.default_fps must be positive".into(),
            ));
        }

        ExerciseRegistry::from_config(self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_overrides_and_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "batch:\n  sample_stride: 2\noverlay:\n  brand_text: GYM\nlogging:\n  level: debug"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.batch.sample_stride, 2);
        assert!(config.batch.annotate);
        assert_eq!(config.overlay.brand_text, "GYM");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.live.queue_capacity, 8);
    }

    #[test]
    fn test_validate_rejects_zero_stride() {
        let mut config = Config::default();
        config.batch.sample_stride = 0;
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load("/definitely/not/here.yaml").is_err());
    }

    #[test]
    fn test_shipped_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.yaml");
        let config = Config::load(path).unwrap();
        let registry = ExerciseRegistry::from_config(&config).unwrap();
        assert!(registry.resolve("lunges").is_ok());
        assert!(registry.resolve(&config.video.exercise).is_ok());
    }
}
