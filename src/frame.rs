//! One synchronized pair of time-domain and frequency-domain buffers

use thiserror::Error;

/// Smallest and largest bin counts a stream can be opened with
pub const MIN_BIN_COUNT: usize = 16;
pub const MAX_BIN_COUNT: usize = 16384;

/// Frame construction errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Buffer lengths differ: {frequency} frequency bins, {time} time samples")]
    LengthMismatch { frequency: usize, time: usize },

    #[error("Frame length {0} is not a power of two")]
    NotPowerOfTwo(usize),

    #[error("Bin count {0} is not a power of two in 16..=16384")]
    InvalidBinCount(usize),

    #[error("Sample rate must be positive")]
    InvalidSampleRate,
}

/// Check that `bin_count` is a supported stream bin count
pub fn validate_bin_count(bin_count: usize) -> Result<(), FrameError> {
    if bin_count.is_power_of_two() && (MIN_BIN_COUNT..=MAX_BIN_COUNT).contains(&bin_count) {
        Ok(())
    } else {
        Err(FrameError::InvalidBinCount(bin_count))
    }
}

/// A frame captured at a single instant.
///
/// Both buffers have the same length N, fixed when the stream is opened.
/// Bin `i` is centred on `i * sample_rate / (2 * N)` Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrame {
    frequency_magnitudes_db: Vec<f32>,
    time_domain_samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleFrame {
    /// Build a frame from owned buffers
    pub fn new(
        frequency_magnitudes_db: Vec<f32>,
        time_domain_samples: Vec<f32>,
        sample_rate: u32,
    ) -> Result<Self, FrameError> {
        if frequency_magnitudes_db.len() != time_domain_samples.len() {
            return Err(FrameError::LengthMismatch {
                frequency: frequency_magnitudes_db.len(),
                time: time_domain_samples.len(),
            });
        }
        if !time_domain_samples.len().is_power_of_two() {
            return Err(FrameError::NotPowerOfTwo(time_domain_samples.len()));
        }
        if sample_rate == 0 {
            return Err(FrameError::InvalidSampleRate);
        }

        Ok(Self {
            frequency_magnitudes_db,
            time_domain_samples,
            sample_rate,
        })
    }

    /// A frame of `bin_count` zero samples and floor-level bins, reused across ticks
    pub(crate) fn silent(bin_count: usize, sample_rate: u32, floor_db: f32) -> Self {
        Self {
            frequency_magnitudes_db: vec![floor_db; bin_count],
            time_domain_samples: vec![0.0; bin_count],
            sample_rate,
        }
    }

    /// Per-bin magnitudes in dB
    pub fn frequency_magnitudes_db(&self) -> &[f32] {
        &self.frequency_magnitudes_db
    }

    /// Waveform amplitudes in [-1, 1]
    pub fn time_domain_samples(&self) -> &[f32] {
        &self.time_domain_samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of bins (N)
    pub fn len(&self) -> usize {
        self.time_domain_samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_domain_samples.is_empty()
    }

    /// Half the sample rate
    pub fn nyquist_hz(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }

    /// Centre frequency of bin `i` in Hz
    pub fn bin_frequency(&self, i: usize) -> f32 {
        bin_frequency(i, self.sample_rate, self.len())
    }

    pub(crate) fn buffers_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (
            &mut self.frequency_magnitudes_db,
            &mut self.time_domain_samples,
        )
    }
}

/// `i * sample_rate / (2 * bin_count)`
pub fn bin_frequency(i: usize, sample_rate: u32, bin_count: usize) -> f32 {
    (i as f64 * sample_rate as f64 / (2 * bin_count) as f64) as f32
}
