//! Frame analyzer - levels, spectral shape and zero crossings of one frame
//!
//! [`analyze`] is a pure function of the frame. Degenerate input (silence,
//! an all-floor spectrum) resolves to fixed values instead of NaN or
//! infinity:
//!
//! | metric              | degenerate value        |
//! |---------------------|-------------------------|
//! | peak / RMS level    | the floor (−140 dB)     |
//! | crest factor        | 1.0                     |
//! | spectral centroid   | 0 Hz                    |
//! | spectral flatness   | 0.0                     |
//! | spectral rolloff    | 0 Hz                    |

use crate::audio::{amplitude_to_db, AudioConfig};
use crate::frame::SampleFrame;
use crate::metrics::AudioMetrics;

/// Default silence floor for every dB value
pub const DEFAULT_FLOOR_DB: f32 = -140.0;

/// Default fraction of spectral magnitude below the rolloff frequency
pub const DEFAULT_ROLLOFF_FRACTION: f32 = 0.85;

/// Added inside the geometric-mean log so silent bins do not hit `ln(0)`
const FLATNESS_EPSILON: f64 = 1e-10;

/// Analyze a frame with the default floor and rolloff fraction
pub fn analyze(frame: &SampleFrame) -> AudioMetrics {
    FrameAnalyzer::default().analyze(frame)
}

/// Frame analyzer parameters. Holds no per-frame state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAnalyzer {
    floor_db: f32,
    rolloff_fraction: f32,
}

impl Default for FrameAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_FLOOR_DB, DEFAULT_ROLLOFF_FRACTION)
    }
}

impl From<&AudioConfig> for FrameAnalyzer {
    fn from(config: &AudioConfig) -> Self {
        Self::new(config.min_decibels, config.rolloff_fraction)
    }
}

impl FrameAnalyzer {
    /// A floor that is not finite and negative falls back to
    /// [`DEFAULT_FLOOR_DB`]; a NaN fraction falls back to
    /// [`DEFAULT_ROLLOFF_FRACTION`], others are clamped into (0, 1].
    pub fn new(floor_db: f32, rolloff_fraction: f32) -> Self {
        let floor_db = if floor_db.is_finite() && floor_db < 0.0 {
            floor_db
        } else {
            DEFAULT_FLOOR_DB
        };
        let rolloff_fraction = if rolloff_fraction.is_nan() {
            DEFAULT_ROLLOFF_FRACTION
        } else {
            rolloff_fraction.clamp(f32::EPSILON, 1.0)
        };
        Self {
            floor_db,
            rolloff_fraction,
        }
    }

    pub fn floor_db(&self) -> f32 {
        self.floor_db
    }

    /// Compute all metrics for one frame
    pub fn analyze(&self, frame: &SampleFrame) -> AudioMetrics {
        let samples = frame.time_domain_samples();
        let levels = Levels::measure(samples);

        let peak_level_db = amplitude_to_db(levels.peak as f32, self.floor_db);
        let rms_level_db = amplitude_to_db(levels.rms as f32, self.floor_db).min(peak_level_db);

        let spectrum = Spectrum::new(frame, self.floor_db);

        AudioMetrics {
            peak_level_db,
            rms_level_db,
            crest_factor: levels.crest_factor(),
            dynamic_range_db: peak_level_db - rms_level_db,
            spectral_centroid_hz: spectrum.centroid_hz(),
            spectral_flatness: spectrum.flatness(),
            spectral_rolloff_hz: spectrum.rolloff_hz(self.rolloff_fraction),
            zero_crossings: zero_crossings(samples),
            loudness_lufs: None,
        }
    }
}

/// Peak and RMS amplitude of a waveform, linear
struct Levels {
    peak: f64,
    rms: f64,
}

impl Levels {
    fn measure(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self { peak: 0.0, rms: 0.0 };
        }

        let mut peak = 0.0f64;
        let mut sum_sq = 0.0f64;
        for &s in samples {
            let s = sanitize(s) as f64;
            peak = peak.max(s.abs());
            sum_sq += s * s;
        }
        let rms = (sum_sq / samples.len() as f64).sqrt();

        // Rounding in the sum must not push RMS above peak
        Self {
            peak,
            rms: rms.min(peak),
        }
    }

    fn crest_factor(&self) -> f32 {
        if self.rms > 0.0 {
            (self.peak / self.rms).max(1.0) as f32
        } else {
            1.0
        }
    }
}

/// Linear-domain sums over the spectrum of one frame
struct Spectrum<'a> {
    frame: &'a SampleFrame,
    floor_db: f32,
    total: f64,
    weighted_freq: f64,
    log_sum: f64,
}

impl<'a> Spectrum<'a> {
    fn new(frame: &'a SampleFrame, floor_db: f32) -> Self {
        let mut total = 0.0;
        let mut weighted_freq = 0.0;
        let mut log_sum = 0.0;

        for (i, &db) in frame.frequency_magnitudes_db().iter().enumerate() {
            let mag = db_to_linear(db, floor_db);
            total += mag;
            weighted_freq += frame.bin_frequency(i) as f64 * mag;
            log_sum += (mag + FLATNESS_EPSILON).ln();
        }

        Self {
            frame,
            floor_db,
            total,
            weighted_freq,
            log_sum,
        }
    }

    fn centroid_hz(&self) -> f32 {
        if self.total <= 0.0 {
            return 0.0;
        }
        let centroid = (self.weighted_freq / self.total) as f32;
        centroid.clamp(0.0, self.frame.nyquist_hz())
    }

    fn flatness(&self) -> f32 {
        let n = self.frame.len() as f64;
        let arithmetic_mean = self.total / n;
        if arithmetic_mean <= 0.0 {
            return 0.0;
        }
        let geometric_mean = (self.log_sum / n).exp();
        ((geometric_mean / arithmetic_mean) as f32).clamp(0.0, 1.0)
    }

    fn rolloff_hz(&self, fraction: f32) -> f32 {
        if self.total <= 0.0 {
            return 0.0;
        }

        let threshold = self.total * fraction as f64;
        let bins = self.frame.frequency_magnitudes_db();
        let mut cumulative = 0.0;
        for (k, &db) in bins.iter().enumerate() {
            cumulative += db_to_linear(db, self.floor_db);
            if cumulative >= threshold {
                return self.frame.bin_frequency(k);
            }
        }

        // Only reachable through rounding when fraction == 1
        self.frame.bin_frequency(bins.len() - 1)
    }
}

/// Count sign changes between adjacent samples. Zero counts as non-negative.
pub fn zero_crossings(samples: &[f32]) -> u32 {
    samples
        .windows(2)
        .filter(|pair| (sanitize(pair[0]) >= 0.0) != (sanitize(pair[1]) >= 0.0))
        .count() as u32
}

/// `10^(db/20)`, with non-finite bins and bins at or below the floor treated
/// as silent
fn db_to_linear(db: f32, floor_db: f32) -> f64 {
    if !db.is_finite() || db <= floor_db {
        return 0.0;
    }
    let mag = 10f64.powf(db as f64 / 20.0);
    if mag.is_finite() {
        mag
    } else {
        0.0
    }
}

/// Samples outside [-1, 1] are clipped, non-finite samples read as 0
fn sanitize(sample: f32) -> f32 {
    if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
