//! Per-frame metric snapshot

use serde::{Deserialize, Serialize};

/// Metrics computed from one frame. Replaced wholesale every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMetrics {
    /// Peak sample level in dBFS (floored)
    pub peak_level_db: f32,

    /// RMS level in dBFS (floored), never above `peak_level_db`
    pub rms_level_db: f32,

    /// Peak / RMS in the linear domain, at least 1
    pub crest_factor: f32,

    /// `peak_level_db - rms_level_db`
    pub dynamic_range_db: f32,

    /// Magnitude-weighted mean frequency in Hz
    pub spectral_centroid_hz: f32,

    /// Geometric / arithmetic mean of linear magnitudes, in [0, 1]
    pub spectral_flatness: f32,

    /// Frequency below which the rolloff fraction of magnitude lies, in Hz
    pub spectral_rolloff_hz: f32,

    /// Sign changes between adjacent samples
    pub zero_crossings: u32,

    /// Gated loudness is not measured per frame; always `None`
    pub loudness_lufs: Option<f32>,
}

impl AudioMetrics {
    /// Metrics of a silent frame at the given floor
    pub fn silent(floor_db: f32) -> Self {
        Self {
            peak_level_db: floor_db,
            rms_level_db: floor_db,
            crest_factor: 1.0,
            dynamic_range_db: 0.0,
            spectral_centroid_hz: 0.0,
            spectral_flatness: 0.0,
            spectral_rolloff_hz: 0.0,
            zero_crossings: 0,
            loudness_lufs: None,
        }
    }

    /// True when every numeric field is finite
    pub fn is_finite(&self) -> bool {
        [
            self.peak_level_db,
            self.rms_level_db,
            self.crest_factor,
            self.dynamic_range_db,
            self.spectral_centroid_hz,
            self.spectral_flatness,
            self.spectral_rolloff_hz,
        ]
        .iter()
        .all(|v| v.is_finite())
            && self.loudness_lufs.map_or(true, f32::is_finite)
    }
}

impl Default for AudioMetrics {
    fn default() -> Self {
        Self::silent(crate::analyzer::DEFAULT_FLOOR_DB)
    }
}
