//! Spectral feature extraction
//!
//! Turns a single-channel sample buffer into ClinicalQ band amplitudes using a
//! Hann-windowed amplitude spectrum. Band values are RMS aggregates of the
//! spectrum bins inside each closed `[low_hz, high_hz]` range.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::Serialize;
use std::cell::RefCell;
use std::f64::consts::PI;

use crate::types::FeatureVector;

// Thread-local FFT planner so repeated live recomputation reuses cached plans
thread_local! {
    static FFT_PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

/// Shortest buffer the extractor analyses; anything shorter is replaced by zeros
pub const MIN_SAMPLES: usize = 4;

/// ClinicalQ frequency bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    LoAlpha,
    HiAlpha,
    Smr,
    Beta,
    #[serde(rename = "hibeta")]
    HiBeta,
}

impl Band {
    pub const ALL: [Band; 8] = [
        Band::Delta,
        Band::Theta,
        Band::Alpha,
        Band::LoAlpha,
        Band::HiAlpha,
        Band::Smr,
        Band::Beta,
        Band::HiBeta,
    ];

    /// Closed frequency range in Hz
    pub fn range_hz(&self) -> (f64, f64) {
        match self {
            Band::Delta => (1.5, 2.5),
            Band::Theta => (3.0, 7.0),
            Band::Alpha => (8.0, 12.0),
            Band::LoAlpha => (8.0, 9.0),
            Band::HiAlpha => (11.0, 12.0),
            Band::Smr => (12.0, 15.0),
            Band::Beta => (16.0, 25.0),
            Band::HiBeta => (28.0, 40.0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Band::Delta => "delta",
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::LoAlpha => "lo_alpha",
            Band::HiAlpha => "hi_alpha",
            Band::Smr => "smr",
            Band::Beta => "beta",
            Band::HiBeta => "hibeta",
        }
    }
}

/// One-sided amplitude spectrum
#[derive(Debug, Clone)]
pub struct AmplitudeSpectrum {
    pub frequencies: Vec<f64>,
    pub amplitudes: Vec<f64>,
}

impl AmplitudeSpectrum {
    /// Compute the Hann-windowed amplitude spectrum of `signal`.
    ///
    /// The mean is removed first and amplitudes are scaled by `2 / sum(window)`
    /// so that a sinusoid sitting on a bin reads back at its physical amplitude.
    pub fn compute(signal: &[f64], sampling_rate: u32) -> Self {
        let mut x = sanitize(signal);
        let n = x.len();

        let mean = x.iter().sum::<f64>() / n as f64;
        x.iter_mut().for_each(|v| *v -= mean);

        let window = hann_window(n);
        let window_sum: f64 = window.iter().sum();

        let mut buffer: Vec<Complex<f64>> = x
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();

        FFT_PLANNER.with(|planner| {
            let fft = planner.borrow_mut().plan_fft_forward(n);
            fft.process(&mut buffer);
        });

        let n_positive = n / 2 + 1;
        let scale = if window_sum > 0.0 { 2.0 / window_sum } else { 0.0 };
        let resolution = f64::from(sampling_rate) / n as f64;

        Self {
            frequencies: (0..n_positive).map(|k| k as f64 * resolution).collect(),
            amplitudes: buffer[..n_positive].iter().map(|c| c.norm() * scale).collect(),
        }
    }

    fn bins_in(&self, low_hz: f64, high_hz: f64) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.frequencies
            .iter()
            .copied()
            .zip(self.amplitudes.iter().copied())
            .filter(move |(f, _)| *f >= low_hz && *f <= high_hz)
    }

    /// RMS aggregate of the bins inside `[low_hz, high_hz]`; 0 when no bin falls inside
    pub fn band_amplitude(&self, low_hz: f64, high_hz: f64) -> f64 {
        self.bins_in(low_hz, high_hz)
            .map(|(_, a)| a * a)
            .sum::<f64>()
            .sqrt()
    }

    /// Frequency of the largest bin inside the alpha band, or 0 when there is none
    pub fn peak_alpha_frequency(&self) -> f64 {
        let (low, high) = Band::Alpha.range_hz();
        let mut peak: Option<(f64, f64)> = None;
        for (freq, amp) in self.bins_in(low, high) {
            match peak {
                Some((_, best)) if amp <= best => {}
                _ => peak = Some((freq, amp)),
            }
        }
        peak.map(|(freq, _)| freq).unwrap_or(0.0)
    }
}

/// Amplitude of `signal` within `[low_hz, high_hz]`
pub fn band_amplitude(signal: &[f64], sampling_rate: u32, low_hz: f64, high_hz: f64) -> f64 {
    AmplitudeSpectrum::compute(signal, sampling_rate).band_amplitude(low_hz, high_hz)
}

/// Peak alpha frequency of `signal`; 0 when the spectrum has no alpha bin
pub fn peak_alpha_frequency(signal: &[f64], sampling_rate: u32) -> f64 {
    AmplitudeSpectrum::compute(signal, sampling_rate).peak_alpha_frequency()
}

/// Full ClinicalQ feature vector for one channel buffer. Never fails.
pub fn extract_features(signal: &[f64], sampling_rate: u32) -> FeatureVector {
    let spectrum = AmplitudeSpectrum::compute(signal, sampling_rate);

    let mut features = FeatureVector::default();
    for band in Band::ALL {
        let (low, high) = band.range_hz();
        features.set_band(band, spectrum.band_amplitude(low, high));
    }
    features.total_amp_basic = features.theta + features.alpha + features.beta;
    features.hibeta_plus_beta = features.hibeta + features.beta;
    features.peak_alpha = spectrum.peak_alpha_frequency();
    features
}

/// Replace degenerate input with something the FFT can digest: short buffers
/// become `MIN_SAMPLES` zeros, non-finite samples become 0.
fn sanitize(signal: &[f64]) -> Vec<f64> {
    if signal.len() < MIN_SAMPLES {
        return vec![0.0; MIN_SAMPLES];
    }
    signal
        .iter()
        .map(|&v| if v.is_finite() { v } else { 0.0 })
        .collect()
}

/// Symmetric Hann window
fn hann_window(size: usize) -> Vec<f64> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (size - 1) as f64).cos())
        .collect()
}
