//! Spectrum analysis over capture windows using FFT.

use std::sync::Arc;

use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::errors::{ModemError, Result};

/// One FFT output bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBin {
    pub frequency: f32,
    pub magnitude: f32,
}

/// Forward FFT planned once for a fixed window size, reusing its buffers
/// across calls so the capture path does not allocate per window.
pub struct SpectrumAnalyzer {
    frame_count: usize,
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl SpectrumAnalyzer {
    pub fn new(frame_count: usize, sample_rate: u32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_count);
        let scratch = vec![Complex32::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            frame_count,
            sample_rate,
            fft,
            buffer: vec![Complex32::new(0.0, 0.0); frame_count],
            scratch,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Magnitude spectrum of one window: `frame_count / 2 + 1` bins with
    /// `frequency = i * sample_rate / frame_count` and unnormalized `|X_i|`.
    /// The window must match the planned size exactly.
    pub fn magnitudes(&mut self, samples: &[f32]) -> Result<Vec<FrequencyBin>> {
        if samples.len() != self.frame_count {
            return Err(ModemError::invalid(format!(
                "window of {} samples, analyzer planned for {}",
                samples.len(),
                self.frame_count
            )));
        }

        for (slot, &sample) in self.buffer.iter_mut().zip(samples) {
            *slot = Complex32::new(sample, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let bin_hz = self.sample_rate as f32 / self.frame_count as f32;
        Ok((0..=self.frame_count / 2)
            .map(|i| FrequencyBin {
                frequency: i as f32 * bin_hz,
                magnitude: self.buffer[i].norm(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn tone(freq: f64, count: usize, rate: u32) -> Vec<f32> {
        (0..count)
            .map(|i| (TAU * freq * i as f64 / rate as f64).sin() as f32)
            .collect()
    }

    #[test]
    fn bin_count_and_spacing() {
        let mut analyzer = SpectrumAnalyzer::new(3_600, 48_000);
        let bins = analyzer.magnitudes(&vec![0.0; 3_600]).unwrap();
        assert_eq!(bins.len(), 1_801);
        let spacing = bins[1].frequency - bins[0].frequency;
        assert!((spacing - 48_000.0 / 3_600.0).abs() < 1e-3);
    }

    #[test]
    fn peak_lands_on_tone() {
        let mut analyzer = SpectrumAnalyzer::new(3_600, 48_000);
        let bins = analyzer.magnitudes(&tone(1_000.0, 3_600, 48_000)).unwrap();
        let peak = bins
            .iter()
            .max_by(|a, b| a.magnitude.total_cmp(&b.magnitude))
            .unwrap();
        assert!((peak.frequency - 1_000.0).abs() < 48_000.0 / 3_600.0);
        assert!(peak.magnitude > 100.0);
    }

    #[test]
    fn silence_stays_below_threshold() {
        let mut analyzer = SpectrumAnalyzer::new(3_600, 48_000);
        let bins = analyzer.magnitudes(&vec![0.0; 3_600]).unwrap();
        assert!(bins.iter().all(|bin| bin.magnitude < 0.1));
    }

    #[test]
    fn rejects_mismatched_window() {
        let mut analyzer = SpectrumAnalyzer::new(3_600, 48_000);
        assert!(analyzer.magnitudes(&vec![0.0; 1_024]).is_err());
    }
}
