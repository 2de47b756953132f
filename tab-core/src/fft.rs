//! # Fast Fourier Transform (FFT) Module
//!
//! Frequency-domain helpers shared by the onset detector and the pitch
//! refinement step.
//!
//! ## Features
//! - High-performance FFT using RustFFT
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal for accurate analysis
//! - A reusable planner for frame-by-frame analysis of long recordings

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the input buffer to reduce spectral leakage.
fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Short-time analysis helper holding one planned FFT of a fixed size.
///
/// Planning is the expensive part of RustFFT, so a whole recording is
/// analysed with a single `Stft`.
pub struct Stft {
    size: usize,
    fft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for Stft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stft").field("size", &self.size).finish()
    }
}

impl Stft {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Self { size, fft }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// DC removal, Hann window and forward FFT of one frame.
    ///
    /// Frames shorter than the FFT size are zero-padded; longer frames are
    /// truncated.
    pub fn spectrum(&self, frame: &[f32]) -> Vec<Complex<f32>> {
        let mut processed: Vec<f32> = frame.iter().take(self.size).copied().collect();
        remove_dc_offset(&mut processed);
        apply_hann_window(&mut processed);
        processed.resize(self.size, 0.0);

        let mut buffer: Vec<Complex<f32>> = processed
            .into_iter()
            .map(|sample| Complex { re: sample, im: 0.0 })
            .collect();
        self.fft.process(&mut buffer);
        buffer
    }

    /// Magnitudes of the non-negative frequency bins of one frame.
    pub fn magnitudes(&self, frame: &[f32]) -> Vec<f32> {
        spectrum_to_magnitudes(&self.spectrum(frame))
    }
}

/// Performs a forward FFT on a frame of any length.
pub fn perform_fft(signal: &[f32]) -> Vec<Complex<f32>> {
    Stft::new(signal.len()).spectrum(signal)
}

/// Magnitude of the first half of a spectrum (up to Nyquist).
pub fn spectrum_to_magnitudes(spectrum: &[Complex<f32>]) -> Vec<f32> {
    spectrum
        .iter()
        .take(spectrum.len() / 2)
        .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
        .collect()
}

/// Centre frequency of an FFT bin.
pub fn bin_frequency(bin: usize, fft_size: usize, sample_rate: u32) -> f32 {
    bin as f32 * sample_rate as f32 / fft_size as f32
}
