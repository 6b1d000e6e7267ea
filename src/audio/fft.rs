//! Spectrum analysis - dB magnitudes per frequency bin

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Turns a window of `2N` time-domain samples into `N` dB magnitudes.
///
/// Blackman window, forward FFT, magnitude scaled by `1 / 2N`, converted with
/// `20 * log10` and floored at `min_decibels`. Nothing is carried between
/// calls: the same window always produces the same spectrum.
///
/// All buffers are allocated once in [`SpectrumAnalyser::new`].
pub struct SpectrumAnalyser {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    min_decibels: f32,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyser {
    /// Create an analyser producing `bin_count` bins from `2 * bin_count` samples
    pub fn new(bin_count: usize, min_decibels: f32) -> Self {
        let fft_size = bin_count * 2;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft,
            fft_size,
            min_decibels,
            window: blackman_window(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
        }
    }

    /// Number of time-domain samples consumed per call
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins produced per call
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Compute the spectrum of `samples` into `out_db`.
    ///
    /// `samples` must hold `fft_size()` values and `out_db` `bin_count()`;
    /// shorter inputs are zero-padded, extra output bins are left at the floor.
    pub fn process(&mut self, samples: &[f32], out_db: &mut [f32]) {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let bins = self.bin_count();
        for (k, slot) in out_db.iter_mut().enumerate() {
            *slot = if k < bins {
                amplitude_to_db(self.buffer[k].norm() * scale, self.min_decibels)
            } else {
                self.min_decibels
            };
        }
    }
}

/// Linear amplitude to dB, clamped below at `floor_db`
pub fn amplitude_to_db(amplitude: f32, floor_db: f32) -> f32 {
    if amplitude > 0.0 {
        (20.0 * amplitude.log10()).max(floor_db)
    } else {
        floor_db
    }
}

/// Blackman window (alpha = 0.16) over `size` samples
fn blackman_window(size: usize) -> Vec<f32> {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn silence_sits_at_the_floor() {
        let mut analyser = SpectrumAnalyser::new(512, -140.0);
        let mut out = vec![0.0; analyser.bin_count()];

        analyser.process(&vec![0.0; analyser.fft_size()], &mut out);

        assert!(out.iter().all(|&db| db == -140.0));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let bins = 1024;
        let sample_rate = 48000.0;
        let mut analyser = SpectrumAnalyser::new(bins, -140.0);
        let mut out = vec![0.0; bins];

        // Bin 100 sits at 100 * 48000 / 2048 Hz
        let freq = 100.0 * sample_rate / (2 * bins) as f32;
        analyser.process(&sine(freq, sample_rate, 2 * bins, 0.8), &mut out);

        let (peak_bin, peak_db) = out
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, db)| if db > best.1 { (i, db) } else { best });
        assert_eq!(peak_bin, 100);
        assert!(peak_db < 0.0, "peak should stay below 0 dBFS, got {peak_db}");
        assert!(out[400] < peak_db - 60.0);
    }

    #[test]
    fn same_window_gives_same_spectrum() {
        let mut analyser = SpectrumAnalyser::new(256, -140.0);
        let samples = sine(1000.0, 44100.0, 512, 0.5);
        let mut first = vec![0.0; 256];
        let mut second = vec![0.0; 256];

        analyser.process(&samples, &mut first);
        analyser.process(&samples, &mut second);

        assert_eq!(first, second);
    }

    #[test]
    fn amplitude_to_db_clamps_at_floor() {
        assert_eq!(amplitude_to_db(0.0, -140.0), -140.0);
        assert_eq!(amplitude_to_db(1e-12, -140.0), -140.0);
        assert!((amplitude_to_db(1.0, -140.0)).abs() < 1e-6);
        assert!((amplitude_to_db(0.1, -140.0) + 20.0).abs() < 1e-4);
    }

    #[test]
    fn blackman_window_is_zero_at_start_and_one_at_center() {
        let window = blackman_window(1024);
        assert!(window[0].abs() < 1e-6);
        assert!((window[512] - 1.0).abs() < 1e-4);
    }
}
