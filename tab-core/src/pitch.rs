//! # Pitch Detection Module
//!
//! Frame-by-frame fundamental frequency estimation for monophonic guitar
//! recordings, producing the observation sequence the sequence mapper
//! consumes.
//!
//! ## Features
//! - YIN pitch detection restricted to the instrument's frequency range
//! - Noise rejection using an RMS gate and a clarity check
//! - Parabolic interpolation for sub-sample accuracy
//! - Optional spectrum refinement and median smoothing of the pitch track

use crate::audio::AudioBuffer;
use crate::fft::Stft;
use crate::model::PitchObservation;
use crate::tuning;

/// Lowest pitch considered, a little under low E (82.41 Hz).
pub const DEFAULT_FMIN: f32 = 80.0;
/// Highest pitch considered, covering the top frets of the high E string.
pub const DEFAULT_FMAX: f32 = 1200.0;

const CLARITY_THRESHOLD: f32 = 0.1;

/// YIN pitch detection over a single frame.
///
/// Only lags that correspond to `fmin..=fmax` are searched. The frame must
/// be at least twice as long as the period of `fmin` for the lowest notes to
/// be found.
///
/// # Returns
/// * `Some(frequency)` - Detected frequency in Hz
/// * `None` - No pitch detected (silence, noise, or out of range)
pub fn detect_pitch_yin(
    signal: &[f32],
    sample_rate: u32,
    amplitude_threshold: f32,
    fmin: f32,
    fmax: f32,
) -> Option<f32> {
    let frame_size = signal.len();
    let window = frame_size / 2;
    if window < 4 || fmin <= 0.0 || fmax <= fmin {
        return None;
    }

    // --- Noise Gate: Calculate RMS to filter out silence/noise ---
    if rms(signal) < amplitude_threshold {
        return None;
    }

    let tau_min = ((sample_rate as f32 / fmax).floor() as usize).max(2);
    let tau_max = ((sample_rate as f32 / fmin).ceil() as usize).min(window - 2);
    if tau_min >= tau_max {
        return None;
    }

    // --- Step 1 & 2: Difference function ---
    let mut yin_buffer = vec![0.0_f32; tau_max + 2];
    for tau in 1..=tau_max + 1 {
        let mut diff = 0.0;
        for i in 0..window {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }

    // --- Step 3: Cumulative mean normalized difference ---
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..=tau_max + 1 {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }

    // --- Step 4: First dip close to the global minimum, to avoid octave errors ---
    let min_val = yin_buffer[tau_min..=tau_max]
        .iter()
        .copied()
        .fold(f32::INFINITY, f32::min);
    let threshold = min_val + 0.05;

    let mut period = (tau_min..=tau_max).find(|&tau| yin_buffer[tau] < threshold)?;
    while period < tau_max && yin_buffer[period + 1] < yin_buffer[period] {
        period += 1;
    }

    // --- Step 5: Clarity check to reject noise ---
    if yin_buffer[period] > CLARITY_THRESHOLD {
        return None;
    }

    // --- Step 6: Parabolic interpolation for better precision ---
    let y1 = yin_buffer[period - 1];
    let y2 = yin_buffer[period];
    let y3 = yin_buffer[period + 1];
    let denominator = y1 - 2.0 * y2 + y3;
    let period_float = if denominator != 0.0 {
        period as f32 + (y1 - y3) / (2.0 * denominator)
    } else {
        period as f32
    };

    let frequency = sample_rate as f32 / period_float;
    if frequency.is_finite() && frequency >= fmin * 0.97 && frequency <= fmax * 1.03 {
        Some(frequency)
    } else {
        None
    }
}

/// Refines a frequency estimate using a pre-computed magnitude spectrum.
///
/// Looks for the strongest bin within two bins of the estimate and
/// interpolates its log-magnitude peak.
///
/// # Returns
/// * `Some(refined_freq)` - Refined frequency estimate
/// * `None` - The rough estimate was not a valid frequency
pub fn refine_from_spectrum(
    spectrum_magnitudes: &[f32],
    rough_freq: f32,
    sample_rate: u32,
) -> Option<f32> {
    if rough_freq <= 0.0 {
        return None;
    }
    if spectrum_magnitudes.len() < 3 {
        return Some(rough_freq);
    }
    let buffer_size = spectrum_magnitudes.len() * 2;
    let target_bin = (rough_freq * buffer_size as f32) / sample_rate as f32;
    let search_radius = 2.0;
    let start_bin = (target_bin - search_radius).max(0.0) as usize;
    let end_bin =
        (target_bin + search_radius).min((spectrum_magnitudes.len() - 1) as f32) as usize;
    if start_bin >= end_bin {
        return Some(rough_freq);
    }

    let peak_bin = match spectrum_magnitudes[start_bin..=end_bin]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    {
        Some((offset, _)) => start_bin + offset,
        None => return Some(rough_freq),
    };

    if peak_bin == 0 || peak_bin >= spectrum_magnitudes.len() - 1 {
        return Some(rough_freq);
    }

    let y1 = spectrum_magnitudes[peak_bin - 1].ln();
    let y2 = spectrum_magnitudes[peak_bin].ln();
    let y3 = spectrum_magnitudes[peak_bin + 1].ln();
    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return Some(rough_freq);
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return Some(rough_freq);
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let final_freq = ((peak_bin as f32 + peak_shift) * sample_rate as f32) / buffer_size as f32;

    if final_freq.is_finite() && final_freq > 0.0 {
        Some(final_freq)
    } else {
        Some(rough_freq)
    }
}

/// Root-mean-square level of a frame.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Maps a frame RMS to a MIDI velocity; a full-scale sine gives 127.
pub fn rms_to_velocity(rms: f32) -> u8 {
    (rms * std::f32::consts::SQRT_2 * 127.0).round().clamp(1.0, 127.0) as u8
}

/// Continuous pitch tracking over a whole recording.
#[derive(Debug, Clone)]
pub struct PitchDetector {
    pub fmin: f32,
    pub fmax: f32,
    pub frame_length: usize,
    pub hop_length: usize,
    pub amplitude_threshold: f32,
    /// Median window over consecutive voiced frames; 0 or 1 disables.
    pub smoothing_window: usize,
    /// Snap each YIN estimate to the interpolated spectral peak.
    pub spectral_refinement: bool,
}

impl Default for PitchDetector {
    fn default() -> Self {
        Self {
            fmin: DEFAULT_FMIN,
            fmax: DEFAULT_FMAX,
            frame_length: 2048,
            hop_length: 512,
            amplitude_threshold: 0.01,
            smoothing_window: 5,
            spectral_refinement: false,
        }
    }
}

impl PitchDetector {
    /// Detects one observation per voiced frame.
    ///
    /// Frame `i` starts at sample `i * hop_length` and is stamped with the
    /// time of its centre. Unvoiced frames produce nothing.
    pub fn detect(&self, audio: &AudioBuffer) -> Vec<PitchObservation> {
        let audio = audio.to_mono();
        let sr = audio.sample_rate;
        let frame_length = self.frame_length.max(8);
        let hop = self.hop_length.max(1);
        if audio.samples.len() < frame_length || sr == 0 {
            log::debug!("[PITCH] Audio shorter than one frame; nothing to detect");
            return Vec::new();
        }

        let stft = self.spectral_refinement.then(|| Stft::new(frame_length));
        let frame_count = (audio.samples.len() - frame_length) / hop + 1;

        // (frame index, frequency, velocity) of voiced frames
        let mut voiced: Vec<(usize, f64, u8)> = Vec::new();
        for index in 0..frame_count {
            let start = index * hop;
            let frame = &audio.samples[start..start + frame_length];
            let Some(mut freq) =
                detect_pitch_yin(frame, sr, self.amplitude_threshold, self.fmin, self.fmax)
            else {
                continue;
            };
            if let Some(stft) = &stft {
                freq = refine_from_spectrum(&stft.magnitudes(frame), freq, sr).unwrap_or(freq);
            }
            voiced.push((index, freq as f64, rms_to_velocity(rms(frame))));
        }

        if self.smoothing_window > 1 {
            median_smooth(&mut voiced, self.smoothing_window);
        }

        log::info!(
            "[PITCH] {} voiced frames out of {} ({} Hz, hop {})",
            voiced.len(),
            frame_count,
            sr,
            hop
        );

        voiced
            .into_iter()
            .map(|(index, freq, velocity)| {
                let time = (index * hop + frame_length / 2) as f64 / sr as f64;
                PitchObservation {
                    time,
                    freq,
                    note: tuning::freq_to_note_name(freq).unwrap_or_default(),
                    velocity: Some(velocity),
                    duration: None,
                }
            })
            .collect()
    }
}

/// Median-filters frequencies within runs of consecutive frame indices.
fn median_smooth(voiced: &mut [(usize, f64, u8)], window: usize) {
    let half = window / 2;
    let mut run_start = 0;
    while run_start < voiced.len() {
        let mut run_end = run_start + 1;
        while run_end < voiced.len() && voiced[run_end].0 == voiced[run_end - 1].0 + 1 {
            run_end += 1;
        }

        let original: Vec<f64> = voiced[run_start..run_end].iter().map(|v| v.1).collect();
        for (offset, entry) in voiced[run_start..run_end].iter_mut().enumerate() {
            let lo = offset.saturating_sub(half);
            let hi = (offset + half + 1).min(original.len());
            entry.1 = median(&original[lo..hi]);
        }
        run_start = run_end;
    }
}

pub(crate) fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.is_empty() {
        0.0
    } else if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}
