//! Audio capture and spectrum analysis

mod capture;
mod fft;
mod sources;

pub use capture::{AudioCaptureHandle, CaptureError, CpalBackend};
pub use fft::{amplitude_to_db, SpectrumAnalyser};
pub use sources::{list_sources, AudioSource, SourceError, SourceType, SYSTEM_AUDIO_ID};

use serde::{Deserialize, Serialize};

/// Audio processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Number of frequency bins per frame (N). The analysis window is 2N samples.
    pub frequency_bin_count: usize,

    /// Silence floor in dB; every level and bin is clamped to this
    pub min_decibels: f32,

    /// Interval between analysis ticks in milliseconds
    pub refresh_interval_ms: u64,

    /// Fraction of spectral energy below the rolloff frequency
    pub rolloff_fraction: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            frequency_bin_count: 1024,
            min_decibels: -140.0,
            refresh_interval_ms: 16,
            rolloff_fraction: 0.85,
        }
    }
}

impl AudioConfig {
    /// Number of time-domain samples fed to the FFT
    pub fn fft_size(&self) -> usize {
        self.frequency_bin_count * 2
    }
}
