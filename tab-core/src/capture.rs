//! # Audio Capture Module
//!
//! Records a take from the default input device using CPAL so it can be
//! transcribed like any other recording. Only built with the `capture`
//! feature.
//!
//! The device callback pushes fixed-size frames over a crossbeam channel;
//! the calling thread collects them until the requested duration is reached.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{Receiver, Sender};

use crate::audio::{AudioBuffer, DEFAULT_SAMPLE_RATE};
use crate::error::{TabError, TabResult};

/// Samples per frame handed from the device callback to the recorder.
pub const BUFFER_SIZE: usize = 2048;

fn capture_error(message: impl std::fmt::Display) -> TabError {
    TabError::Capture {
        message: message.to_string(),
    }
}

/// Records `duration` of mono audio from the default input device.
///
/// Blocks until enough samples have arrived, or fails if the device stops
/// delivering frames for more than a second.
pub fn record(duration: Duration) -> TabResult<AudioBuffer> {
    let (frame_tx, frame_rx) = crossbeam_channel::unbounded::<Vec<f32>>();
    let (stream, sample_rate) = start_audio_capture(frame_tx)?;

    let wanted = (duration.as_secs_f64() * sample_rate as f64).ceil() as usize;
    let samples = collect_frames(&frame_rx, wanted)?;

    if let Err(e) = stream.pause() {
        log::warn!("[CAPTURE] Error pausing stream: {}", e);
    }
    drop(stream);

    log::info!(
        "[CAPTURE] Recorded {:.2}s at {} Hz",
        samples.len() as f64 / sample_rate as f64,
        sample_rate
    );
    Ok(AudioBuffer::mono(samples, sample_rate))
}

fn collect_frames(frames: &Receiver<Vec<f32>>, wanted: usize) -> TabResult<Vec<f32>> {
    let mut samples = Vec::with_capacity(wanted + BUFFER_SIZE);
    while samples.len() < wanted {
        let frame = frames
            .recv_timeout(Duration::from_secs(1))
            .map_err(|e| capture_error(format!("input device stopped delivering audio: {}", e)))?;
        samples.extend_from_slice(&frame);
    }
    samples.truncate(wanted);
    Ok(samples)
}

/// Starts audio capture from the default input device.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Running stream handle and its sample rate
/// * `Err(e)` - No device, no usable f32 mono format, or stream failure
fn start_audio_capture(sender: Sender<Vec<f32>>) -> TabResult<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| capture_error("no input device available"))?;

    log::info!(
        "[CAPTURE] Using audio input device: {}",
        device.name().map_err(capture_error)?
    );

    let configs = device
        .supported_input_configs()
        .map_err(capture_error)?
        .collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, DEFAULT_SAMPLE_RATE)
        .ok_or_else(|| capture_error("no suitable f32 mono input format found"))?;

    let target = DEFAULT_SAMPLE_RATE
        .clamp(supported_config.min_sample_rate().0, supported_config.max_sample_rate().0);
    let config = supported_config.with_sample_rate(cpal::SampleRate(target));
    let sample_rate = config.sample_rate().0;
    let config: cpal::StreamConfig = config.into();

    let err_fn = |err| log::error!("[CAPTURE] An error occurred on the audio stream: {}", err);

    let mut audio_buffer = Vec::with_capacity(BUFFER_SIZE * 2);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                audio_buffer.extend_from_slice(data);
                while audio_buffer.len() >= BUFFER_SIZE {
                    let frame: Vec<f32> = audio_buffer.drain(..BUFFER_SIZE).collect();
                    // The receiver is gone once recording is complete.
                    let _ = sender.try_send(frame);
                }
            },
            err_fn,
            None,
        )
        .map_err(capture_error)?;

    stream.play().map_err(capture_error)?;
    Ok((stream, sample_rate))
}

/// Picks a mono f32 configuration whose rate range is closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            min_diff.min(max_diff)
        })
}
