//! Analysis node for visualization.
//!
//! Keeps the most recent `fft_size` mono samples of the capture stream and
//! exposes them as byte snapshots, either in the time domain (for the
//! waveform) or the frequency domain (for the spectrum). The node never
//! alters the signal it observes.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::{Arc, Mutex, MutexGuard};

use super::bus::SampleSink;
use crate::session::AcquisitionError;

pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32768;

const SMOOTHING_TIME_CONSTANT: f32 = 0.8;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

struct AnalyserState {
    ring: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
}

impl AnalyserState {
    /// Returns the ring contents ordered oldest to newest.
    fn ordered(&self) -> Vec<f32> {
        let mut samples = Vec::with_capacity(self.ring.len());
        samples.extend_from_slice(&self.ring[self.write_pos..]);
        samples.extend_from_slice(&self.ring[..self.write_pos]);
        samples
    }
}

/// Time/frequency snapshot source fed from a capture stream.
pub struct Analyser {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    state: Mutex<AnalyserState>,
}

impl Analyser {
    /// Creates an analyser with the given FFT resolution.
    ///
    /// # Errors
    /// - If `fft_size` is not a power of two within 32..=32768
    pub fn new(fft_size: usize) -> Result<Self, AcquisitionError> {
        if !is_valid_fft_size(fft_size) {
            return Err(AcquisitionError::Graph(format!(
                "fft size {fft_size} must be a power of two between {MIN_FFT_SIZE} and {MAX_FFT_SIZE}"
            )));
        }

        Ok(Self {
            fft_size,
            fft: FftPlanner::<f32>::new().plan_fft_forward(fft_size),
            state: Mutex::new(AnalyserState {
                ring: vec![0.0; fft_size],
                write_pos: 0,
                smoothed: vec![0.0; fft_size / 2],
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, AnalyserState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Copies the most recent samples into `out` as bytes, 128 being silence.
    ///
    /// Fills at most `fft_size` bytes; the rest of `out` is left untouched.
    pub fn byte_time_domain_data(&self, out: &mut [u8]) {
        let samples = self.lock().ordered();
        for (byte, &sample) in out.iter_mut().zip(samples.iter()) {
            *byte = sample_to_byte(sample);
        }
    }

    /// Computes the smoothed magnitude spectrum of the most recent samples
    /// and copies it into `out` as bytes scaled between -100 and -30 dB.
    pub fn byte_frequency_data(&self, out: &mut [u8]) {
        let mut state = self.lock();
        let samples = state.ordered();
        let n = samples.len();

        // Blackman window
        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
                let window = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
                Complex::new(s * window, 0.0)
            })
            .collect();

        self.fft.process(&mut buffer);

        for (smoothed, bin) in state.smoothed.iter_mut().zip(buffer.iter()) {
            let magnitude = bin.norm() / n as f32;
            *smoothed =
                SMOOTHING_TIME_CONSTANT * *smoothed + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
        }

        for (byte, &magnitude) in out.iter_mut().zip(state.smoothed.iter()) {
            let db = if magnitude > 1e-10 {
                20.0 * magnitude.log10()
            } else {
                MIN_DECIBELS
            };
            let scaled = (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS) * 255.0;
            *byte = scaled.clamp(0.0, 255.0) as u8;
        }
    }
}

impl SampleSink for Analyser {
    fn accept(&self, samples: &[f32]) {
        let mut state = self.lock();
        let len = state.ring.len();
        for &sample in samples {
            let pos = state.write_pos;
            state.ring[pos] = sample;
            state.write_pos = (pos + 1) % len;
        }
    }
}

pub fn is_valid_fft_size(fft_size: usize) -> bool {
    fft_size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size)
}

/// Maps a sample in [-1, 1] to a byte with 128 at zero.
pub fn sample_to_byte(sample: f32) -> u8 {
    (128.0 * (sample + 1.0)).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_fft_sizes() {
        assert!(Analyser::new(1000).is_err());
        assert!(Analyser::new(16).is_err());
        assert!(Analyser::new(65536).is_err());
        assert!(Analyser::new(2048).is_ok());
    }

    #[test]
    fn test_silence_reads_as_midline() {
        let analyser = Analyser::new(32).unwrap();
        let mut out = [0u8; 32];
        analyser.byte_time_domain_data(&mut out);
        assert!(out.iter().all(|&b| b == 128));
    }

    #[test]
    fn test_time_domain_keeps_most_recent_samples_in_order() {
        let analyser = Analyser::new(32).unwrap();
        let old = vec![-1.0f32; 40];
        analyser.accept(&old);
        analyser.accept(&[1.0, 0.0]);

        let mut out = [0u8; 32];
        analyser.byte_time_domain_data(&mut out);
        assert_eq!(out[29], 0);
        assert_eq!(out[30], 255);
        assert_eq!(out[31], 128);
    }

    #[test]
    fn test_sample_to_byte_clamps() {
        assert_eq!(sample_to_byte(0.0), 128);
        assert_eq!(sample_to_byte(-1.0), 0);
        assert_eq!(sample_to_byte(1.0), 255);
        assert_eq!(sample_to_byte(3.0), 255);
        assert_eq!(sample_to_byte(-3.0), 0);
    }

    #[test]
    fn test_sine_peaks_in_matching_frequency_bin() {
        let analyser = Analyser::new(1024).unwrap();
        // 32 cycles across the window lands exactly in bin 32
        let samples: Vec<f32> = (0..1024)
            .map(|i| 0.01 * (2.0 * std::f32::consts::PI * 32.0 * i as f32 / 1024.0).sin())
            .collect();
        analyser.accept(&samples);

        let mut out = vec![0u8; analyser.frequency_bin_count()];
        for _ in 0..20 {
            analyser.byte_frequency_data(&mut out);
        }

        let peak = out
            .iter()
            .enumerate()
            .max_by_key(|&(_, v)| *v)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 32);
        assert_eq!(out[400], 0);
    }
}
