//! Configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (via STONETRACK_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stonetrack_core::measure::{DEFAULT_HEIGHT_ALLOWANCE_IN, DEFAULT_LENGTH_ALLOWANCE_IN};
use stonetrack_core::Allowance;

/// Largest number of decimals the output may be rounded to.
const MAX_DISPLAY_DECIMALS: u32 = 6;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Measurement defaults.
    pub measurement: MeasurementConfig,
    /// Transition journal.
    pub journal: JournalConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from `path` (if any), applies environment
    /// overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.measurement.apply_env_overrides();
        self.journal.apply_env_overrides();
        self.logging.apply_env_overrides();
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.measurement.allowance().map_err(|e| {
            ConfigError::ValidationError(format!("measurement allowance: {}", e))
        })?;
        if self.measurement.display_decimals > MAX_DISPLAY_DECIMALS {
            return Err(ConfigError::ValidationError(format!(
                "display_decimals must be at most {}",
                MAX_DISPLAY_DECIMALS
            )));
        }
        Ok(())
    }
}

/// Measurement defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Length allowance added during cutting planning, in inches.
    pub length_allowance_in: f64,
    /// Height allowance added during cutting planning, in inches.
    pub height_allowance_in: f64,
    /// Decimals used when printing figures.
    pub display_decimals: u32,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            length_allowance_in: DEFAULT_LENGTH_ALLOWANCE_IN,
            height_allowance_in: DEFAULT_HEIGHT_ALLOWANCE_IN,
            display_decimals: 2,
        }
    }
}

impl MeasurementConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("STONETRACK_LENGTH_ALLOWANCE") {
            if let Ok(parsed) = value.parse() {
                self.length_allowance_in = parsed;
            }
        }

        if let Ok(value) = std::env::var("STONETRACK_HEIGHT_ALLOWANCE") {
            if let Ok(parsed) = value.parse() {
                self.height_allowance_in = parsed;
            }
        }

        if let Ok(value) = std::env::var("STONETRACK_DISPLAY_DECIMALS") {
            if let Ok(parsed) = value.parse() {
                self.display_decimals = parsed;
            }
        }
    }

    /// Returns the configured allowance.
    pub fn allowance(&self) -> Result<Allowance, stonetrack_core::CoreError> {
        Allowance::new(self.length_allowance_in, self.height_allowance_in)
    }
}

/// Transition journal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// File that `replay` appends transition records to.
    pub path: Option<PathBuf>,
}

impl JournalConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("STONETRACK_JOURNAL") {
            if !path.is_empty() {
                self.path = Some(PathBuf::from(path));
            }
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("STONETRACK_LOG_LEVEL") {
            if !level.is_empty() {
                self.level = level;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.measurement.length_allowance_in, 6.0);
        assert_eq!(config.measurement.height_allowance_in, 2.0);
        assert_eq!(config.measurement.display_decimals, 2);
        assert!(config.journal.path.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_allowance_from_config() {
        let config = MeasurementConfig {
            length_allowance_in: 4.0,
            height_allowance_in: 1.5,
            display_decimals: 2,
        };
        let allowance = config.allowance().unwrap();
        assert_eq!(allowance.length_in(), 4.0);
        assert_eq!(allowance.height_in(), 1.5);
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "measurement:\n  length_allowance_in: 3.0\njournal:\n  path: /tmp/j.log").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.measurement.length_allowance_in, 3.0);
        assert_eq!(config.measurement.height_allowance_in, 2.0);
        assert_eq!(config.journal.path, Some(PathBuf::from("/tmp/j.log")));
    }

    #[test]
    fn test_validation_rejects_negative_allowance() {
        let mut config = Config::default();
        config.measurement.height_allowance_in = -2.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.measurement.display_decimals = 12;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/stonetrack.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(..))));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            parsed.measurement.length_allowance_in,
            config.measurement.length_allowance_in
        );
    }
}
