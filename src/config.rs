//! Loading and validating [`AudioConfig`]

use crate::audio::AudioConfig;
use crate::frame::{validate_bin_count, FrameError};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    BinCount(#[from] FrameError),

    #[error("min_decibels must be finite and below 0, got {0}")]
    Floor(f32),

    #[error("refresh_interval_ms must be positive")]
    RefreshInterval,

    #[error("rolloff_fraction must be in (0, 1], got {0}")]
    RolloffFraction(f32),
}

impl AudioConfig {
    /// Parse a JSON document. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bin_count(self.frequency_bin_count)?;
        if !self.min_decibels.is_finite() || self.min_decibels >= 0.0 {
            return Err(ConfigError::Floor(self.min_decibels));
        }
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::RefreshInterval);
        }
        if !(self.rolloff_fraction > 0.0 && self.rolloff_fraction <= 1.0) {
            return Err(ConfigError::RolloffFraction(self.rolloff_fraction));
        }
        Ok(())
    }
}
