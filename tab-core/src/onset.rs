//! # Onset Detection Module
//!
//! Finds where notes begin, using spectral flux and adaptive peak picking.
//!
//! The onset strength envelope is the half-wave rectified frame-to-frame
//! increase in log magnitude, one value per hop. Peaks are accepted when
//! they are a local maximum, stand `delta` above the local average, and are
//! at least `wait` frames after the previous onset.

use crate::audio::AudioBuffer;
use crate::fft::Stft;

/// Spectral-flux onset detector.
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    pub frame_length: usize,
    pub hop_length: usize,
    /// Move each onset back to the preceding minimum of the envelope.
    pub backtrack: bool,
    /// Scales the peak threshold; lower finds more onsets.
    pub sensitivity: f32,
}

impl Default for OnsetDetector {
    fn default() -> Self {
        Self {
            frame_length: 2048,
            hop_length: 512,
            backtrack: true,
            sensitivity: 1.0,
        }
    }
}

/// Peak-picking windows, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeakWindows {
    pre_max: usize,
    post_max: usize,
    pre_avg: usize,
    post_avg: usize,
    wait: usize,
}

impl PeakWindows {
    fn for_rate(sample_rate: u32, hop_length: usize) -> Self {
        let frames = |seconds: f64| {
            ((seconds * sample_rate as f64 / hop_length as f64) as usize).max(1)
        };
        Self {
            pre_max: frames(0.03),
            post_max: frames(0.03),
            pre_avg: frames(0.1),
            post_avg: frames(0.1),
            wait: frames(0.03),
        }
    }
}

impl OnsetDetector {
    /// Onset strength per hop, not normalized.
    pub fn onset_strength(&self, audio: &AudioBuffer) -> Vec<f32> {
        let audio = audio.to_mono();
        let hop = self.hop_length.max(1);
        if audio.samples.is_empty() {
            return Vec::new();
        }

        let stft = Stft::new(self.frame_length.max(8));
        let frame_count = audio.samples.len().div_ceil(hop);
        let mut previous: Option<Vec<f32>> = None;
        let mut envelope = Vec::with_capacity(frame_count);

        for index in 0..frame_count {
            let start = index * hop;
            let end = (start + stft.size()).min(audio.samples.len());
            let log_mags: Vec<f32> = stft
                .magnitudes(&audio.samples[start..end])
                .into_iter()
                .map(|m| (1.0 + m).ln())
                .collect();

            let flux = match &previous {
                Some(prev) => log_mags
                    .iter()
                    .zip(prev)
                    .map(|(cur, old)| (cur - old).max(0.0))
                    .sum(),
                None => 0.0,
            };
            envelope.push(flux);
            previous = Some(log_mags);
        }
        envelope
    }

    /// Onset times in seconds, ascending.
    ///
    /// Each time is the centre of the analysis frame the onset was found in.
    pub fn detect(&self, audio: &AudioBuffer) -> Vec<f64> {
        let hop = self.hop_length.max(1);
        let mut envelope = self.onset_strength(audio);
        normalize(&mut envelope);

        let windows = PeakWindows::for_rate(audio.sample_rate, hop);
        let delta = 0.2 * self.sensitivity;
        let mut peaks = pick_peaks(&envelope, windows, delta);
        if self.backtrack {
            peaks = peaks
                .into_iter()
                .map(|p| backtrack(&envelope, p))
                .collect();
            peaks.dedup();
        }

        log::info!("[ONSET] Detected {} onsets", peaks.len());
        let centre = self.frame_length.max(8) / 2;
        peaks
            .into_iter()
            .map(|frame| (frame * hop + centre) as f64 / audio.sample_rate as f64)
            .collect()
    }
}

/// Rescales to [0, 1]; a flat envelope becomes all zeros.
fn normalize(envelope: &mut [f32]) {
    let min = envelope.iter().copied().fold(f32::INFINITY, f32::min);
    let max = envelope.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    for v in envelope.iter_mut() {
        *v = if range > 0.0 { (*v - min) / range } else { 0.0 };
    }
}

fn pick_peaks(envelope: &[f32], windows: PeakWindows, delta: f32) -> Vec<usize> {
    let n = envelope.len();
    let mut peaks = Vec::new();
    let mut last: Option<usize> = None;

    for i in 0..n {
        let max_lo = i.saturating_sub(windows.pre_max);
        let max_hi = (i + windows.post_max + 1).min(n);
        let local_max = envelope[max_lo..max_hi]
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        if envelope[i] < local_max {
            continue;
        }

        let avg_lo = i.saturating_sub(windows.pre_avg);
        let avg_hi = (i + windows.post_avg + 1).min(n);
        let slice = &envelope[avg_lo..avg_hi];
        let local_avg = slice.iter().sum::<f32>() / slice.len() as f32;
        if envelope[i] < local_avg + delta {
            continue;
        }

        if last.is_some_and(|l| i <= l + windows.wait) {
            continue;
        }
        peaks.push(i);
        last = Some(i);
    }
    peaks
}

fn backtrack(envelope: &[f32], mut frame: usize) -> usize {
    while frame > 0 && envelope[frame - 1] <= envelope[frame] && envelope[frame - 1] > 0.0 {
        frame -= 1;
    }
    frame
}
