//! # Audio Loading Module
//!
//! Reads recordings from disk into a normalized sample buffer at a known
//! sample rate, ready for onset and pitch analysis.
//!
//! ## Features
//! - WAV decoding (integer and float samples) via `hound`
//! - Down-mixing to mono
//! - Linear-interpolation resampling to the analysis rate
//! - Peak normalization

use std::path::Path;

use crate::error::{TabError, TabResult};

/// Analysis sample rate used unless configured otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Decoded audio held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Samples, interleaved when `channels > 1`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Averages all channels into one.
    pub fn to_mono(&self) -> AudioBuffer {
        if self.channels <= 1 {
            return self.clone();
        }
        let channels = self.channels as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        AudioBuffer::mono(samples, self.sample_rate)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }

    /// Scales the buffer so its peak is 1.0. Silent buffers are left alone.
    pub fn normalize(&mut self) {
        let peak = self.peak();
        if peak > 0.0 {
            for sample in self.samples.iter_mut() {
                *sample /= peak;
            }
        }
    }

    /// Resamples every channel to `target_rate`.
    pub fn resample(&self, target_rate: u32) -> AudioBuffer {
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return AudioBuffer {
                sample_rate: target_rate,
                ..self.clone()
            };
        }
        let channels = self.channels.max(1) as usize;
        let per_channel: Vec<Vec<f32>> = (0..channels)
            .map(|c| {
                let channel: Vec<f32> =
                    self.samples.iter().skip(c).step_by(channels).copied().collect();
                resample_linear(&channel, self.sample_rate, target_rate)
            })
            .collect();

        let len = per_channel.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(len * channels);
        for i in 0..len {
            for channel in &per_channel {
                samples.push(channel[i]);
            }
        }
        AudioBuffer {
            samples,
            sample_rate: target_rate,
            channels: self.channels,
        }
    }
}

/// Loads audio files for analysis.
#[derive(Debug, Clone)]
pub struct AudioLoader {
    pub target_sample_rate: u32,
    pub mono: bool,
}

impl Default for AudioLoader {
    fn default() -> Self {
        Self {
            target_sample_rate: DEFAULT_SAMPLE_RATE,
            mono: true,
        }
    }
}

impl AudioLoader {
    pub fn new(target_sample_rate: u32, mono: bool) -> Self {
        Self {
            target_sample_rate,
            mono,
        }
    }

    /// Loads a file, converts it to the analysis format and normalizes it.
    ///
    /// # Returns
    /// * `Ok(buffer)` - Normalized audio at `target_sample_rate`
    /// * `Err(AudioNotFound)` - The path does not exist
    /// * `Err(UnsupportedAudio)` - The file is not a WAV file
    pub fn load(&self, path: &Path) -> TabResult<AudioBuffer> {
        if !path.exists() {
            return Err(TabError::AudioNotFound {
                path: path.to_path_buf(),
            });
        }
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav") || e.eq_ignore_ascii_case("wave"));
        if !is_wav {
            return Err(TabError::UnsupportedAudio {
                path: path.to_path_buf(),
                reason: "only WAV input is supported; convert the file first".to_string(),
            });
        }

        let raw = read_wav(path)?;
        log::info!(
            "[AUDIO] Loaded {} ({} Hz, {} ch, {:.2}s)",
            path.display(),
            raw.sample_rate,
            raw.channels,
            raw.duration()
        );
        Ok(self.prepare(raw))
    }

    /// Applies channel, rate and level conversion to an in-memory buffer.
    pub fn prepare(&self, raw: AudioBuffer) -> AudioBuffer {
        let mixed = if self.mono { raw.to_mono() } else { raw };
        let mut buffer = mixed.resample(self.target_sample_rate);
        buffer.normalize();
        buffer
    }
}

/// Decodes a WAV file without any conversion.
pub fn read_wav(path: &Path) -> TabResult<AudioBuffer> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
    };

    Ok(AudioBuffer {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Writes a buffer as 32-bit float WAV.
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> TabResult<()> {
    let spec = hound::WavSpec {
        channels: buffer.channels.max(1),
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in &buffer.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Resamples one channel using linear interpolation.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;
    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * ratio;
            let src_idx = src_pos.floor() as usize;
            let frac = (src_pos - src_idx as f64) as f32;
            if src_idx + 1 < samples.len() {
                let s0 = samples[src_idx];
                let s1 = samples[src_idx + 1];
                s0 + (s1 - s0) * frac
            } else {
                samples[src_idx.min(samples.len() - 1)]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_mix_averages_channels() {
        let stereo = AudioBuffer {
            samples: vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0],
            sample_rate: 8000,
            channels: 2,
        };
        let mono = stereo.to_mono();
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn normalize_scales_to_unit_peak_and_ignores_silence() {
        let mut buffer = AudioBuffer::mono(vec![0.25, -0.5, 0.1], 8000);
        buffer.normalize();
        assert_eq!(buffer.samples, vec![0.5, -1.0, 0.2]);

        let mut silent = AudioBuffer::mono(vec![0.0; 4], 8000);
        silent.normalize();
        assert_eq!(silent.samples, vec![0.0; 4]);
    }

    #[test]
    fn resample_halves_length_when_halving_rate() {
        let buffer = AudioBuffer::mono((0..100).map(|i| i as f32).collect(), 16000);
        let resampled = buffer.resample(8000);
        assert_eq!(resampled.sample_rate, 8000);
        assert_eq!(resampled.samples.len(), 50);
        assert_eq!(resampled.samples[10], 20.0);
    }

    #[test]
    fn missing_and_unsupported_files_are_errors() {
        let loader = AudioLoader::default();
        assert!(matches!(
            loader.load(Path::new("/definitely/not/here.wav")),
            Err(TabError::AudioNotFound { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        let mp3 = dir.path().join("song.mp3");
        std::fs::write(&mp3, b"not really audio").unwrap();
        assert!(matches!(
            loader.load(&mp3),
            Err(TabError::UnsupportedAudio { .. })
        ));
    }

    #[test]
    fn wav_round_trip_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let stereo = AudioBuffer {
            samples: vec![0.2, 0.2, -0.4, -0.4, 0.1, 0.1, 0.0, 0.0],
            sample_rate: 22050,
            channels: 2,
        };
        write_wav(&path, &stereo).unwrap();

        let loaded = AudioLoader::new(22050, true).load(&path).unwrap();
        assert_eq!(loaded.channels, 1);
        assert_eq!(loaded.sample_rate, 22050);
        assert_eq!(loaded.samples.len(), 4);
        assert!((loaded.peak() - 1.0).abs() < 1e-6);
        assert!((loaded.samples[1] + 1.0).abs() < 1e-6);
    }
}
