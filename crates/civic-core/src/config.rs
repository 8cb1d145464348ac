//! Engine configuration
//!
//! Loaded from YAML. Every key is optional; missing keys fall back to the
//! defaults below.
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG/IO: {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("CONFIG/PARSE: {0}")]
    Parse(String),

    #[error("CONFIG/INVALID: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Progress percentage from which a running SLA is reported NEAR_DUE.
    pub near_due_percent: f64,

    /// Count SLA days on Monday to Friday only.
    pub business_days: bool,

    /// Compare-and-swap attempts before a transition gives up.
    pub max_conflict_retries: u32,

    /// Default look-ahead for near-due listings.
    pub near_due_window_days: i64,

    /// Locale of the validation message catalog.
    pub locale: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            near_due_percent: 80.0,
            business_days: false,
            max_conflict_retries: 3,
            near_due_window_days: 3,
            locale: "pt-BR".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load config from a YAML file
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    /// Parse config from YAML content
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.near_due_percent) {
            return Err(ConfigError::Invalid(format!(
                "nearDuePercent must be within 0..=100, got {}",
                self.near_due_percent
            )));
        }
        if self.max_conflict_retries == 0 {
            return Err(ConfigError::Invalid(
                "maxConflictRetries must be at least 1".to_string(),
            ));
        }
        if self.near_due_window_days < 0 {
            return Err(ConfigError::Invalid(
                "nearDueWindowDays cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.near_due_percent, 80.0);
        assert!(!config.business_days);
        assert_eq!(config.max_conflict_retries, 3);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml("businessDays: true\n").unwrap();
        assert!(config.business_days);
        assert_eq!(config.near_due_percent, 80.0);
        assert_eq!(config.locale, "pt-BR");
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = EngineConfig::from_yaml("nearDuePercent: 150\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EngineConfig::from_yaml("maxConflictRetries: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load("/nonexistent/engine.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
