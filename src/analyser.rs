//! Byte magnitude frames from time-domain audio.
//!
//! Mirrors what a platform analyser node hands out: a windowed real FFT,
//! magnitudes scaled by `1/N`, exponential smoothing across frames, then a
//! linear mapping of a decibel range onto `0..=255`.

use std::f32::consts::PI;
use std::sync::Arc;

use clap::ValueEnum;
use log::{debug, error};
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::utils::{DEFAULT_SMOOTHING, MAX_DECIBELS, MIN_DECIBELS};

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    Rectangular,
    Hanning,
    #[default]
    Blackman,
    BlackmanHarris,
}

impl WindowType {
    pub fn coefficients(self, len: usize) -> Vec<f32> {
        let phase = |i: usize| 2.0 * PI * i as f32 / len as f32;
        match self {
            WindowType::Rectangular => vec![1.0; len],
            WindowType::Hanning => (0..len).map(|i| 0.5 * (1.0 - phase(i).cos())).collect(),
            WindowType::Blackman => {
                let (a0, a1, a2) = (0.42, 0.5, 0.08);
                (0..len)
                    .map(|i| {
                        let x = phase(i);
                        a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
                    })
                    .collect()
            }
            WindowType::BlackmanHarris => {
                let (a0, a1, a2, a3) = (0.35875, 0.48829, 0.14128, 0.01168);
                (0..len)
                    .map(|i| {
                        let x = phase(i);
                        a0 - a1 * x.cos() + a2 * (2.0 * x).cos() - a3 * (3.0 * x).cos()
                    })
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserSettings {
    /// Weight of the previous frame, 0 disables smoothing.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    pub window: WindowType,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            smoothing: DEFAULT_SMOOTHING,
            min_decibels: MIN_DECIBELS,
            max_decibels: MAX_DECIBELS,
            window: WindowType::Blackman,
        }
    }
}

pub struct ByteAnalyser {
    settings: AnalyserSettings,
    fft_size: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
}

impl ByteAnalyser {
    /// `fft_size` must already be validated (power of two).
    pub fn new(fft_size: usize, settings: AnalyserSettings) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let bins = fft_size / 2;
        debug!("Planned {}-point analyser ({} bins)", fft_size, bins);
        Self {
            settings,
            fft_size,
            window: settings.window.coefficients(fft_size),
            input: fft.make_input_vec(),
            spectrum: fft.make_output_vec(),
            fft,
            smoothed: vec![0.0; bins],
            bytes: vec![0; bins],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Re-plans for a new size and drops smoothing history.
    pub fn resize(&mut self, fft_size: usize) {
        if fft_size != self.fft_size {
            *self = Self::new(fft_size, self.settings);
        }
    }

    /// Analyses the most recent `fft_size` samples of `samples`.
    ///
    /// Shorter input is treated as preceded by silence.
    pub fn process(&mut self, samples: &[f32]) -> &[u8] {
        let n = self.fft_size;
        let take = samples.len().min(n);
        let offset = n - take;
        self.input[..offset].fill(0.0);
        for (i, &s) in samples[samples.len() - take..].iter().enumerate() {
            self.input[offset + i] = s * self.window[offset + i];
        }

        if let Err(e) = self.fft.process(&mut self.input, &mut self.spectrum) {
            error!("FFT computation error: {:?}", e);
            return &self.bytes;
        }

        let scale = 1.0 / n as f32;
        let tau = self.settings.smoothing.clamp(0.0, 1.0);
        let range = (self.settings.max_decibels - self.settings.min_decibels).max(f32::EPSILON);

        for (k, (smoothed, byte)) in self.smoothed.iter_mut().zip(self.bytes.iter_mut()).enumerate() {
            let magnitude = self.spectrum[k].norm() * scale;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
            let db = 20.0 * smoothed.log10();
            let scaled = 255.0 * (db - self.settings.min_decibels) / range;
            *byte = if scaled.is_nan() { 0 } else { scaled.clamp(0.0, 255.0) as u8 };
        }

        &self.bytes
    }
}
