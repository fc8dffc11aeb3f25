//! # Audio Capture Module
//!
//! Runs the estimator live on the default input device using CPAL
//! (Cross-Platform Audio Library). The tick executes directly inside the
//! device's input callback, so everything reached from there is lock-free
//! and allocation-free.
//!
//! ## Features
//! - Automatic audio device selection
//! - Downmix of any channel count to mono
//! - Sliding analysis frame updated on every delivered buffer
//! - Timing derived from the sample clock, not the system clock

use anyhow::{Result, anyhow};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::estimator::TempoEstimator;
use crate::fft::FftBandFeed;

/// Analysis frame length in samples (~46ms at 44.1kHz).
///
/// The band bin ranges in the default configuration assume this size.
pub const BUFFER_SIZE: usize = 2048;

/// Preferred capture rate in Hz.
const TARGET_SAMPLE_RATE: u32 = 44100;

/// Sliding mono frame plus the sample clock of the stream.
struct CaptureState {
    frame: Vec<f32>,
    channels: usize,
    sample_rate: f64,
    samples_seen: u64,
}

impl CaptureState {
    fn new(frame_size: usize, channels: usize, sample_rate: u32) -> Self {
        Self {
            frame: vec![0.0; frame_size],
            channels: channels.max(1),
            sample_rate: sample_rate as f64,
            samples_seen: 0,
        }
    }

    /// Shifts the interleaved buffer into the mono frame.
    ///
    /// Returns the elapsed time of the buffer in milliseconds.
    fn push_interleaved(&mut self, data: &[f32]) -> f64 {
        let frames = data.len() / self.channels;
        let keep = self.frame.len().saturating_sub(frames);
        let len = self.frame.len();
        if keep > 0 {
            self.frame.copy_within(len - keep.., 0);
        }

        // Only the newest `len` frames fit when the buffer is longer than the frame.
        let skip = frames.saturating_sub(len);
        let channels = self.channels as f32;
        for (slot, chunk) in self.frame[keep..]
            .iter_mut()
            .zip(data.chunks_exact(self.channels).skip(skip))
        {
            *slot = chunk.iter().sum::<f32>() / channels;
        }

        self.samples_seen += frames as u64;
        frames as f64 * 1000.0 / self.sample_rate
    }

    fn now_ms(&self) -> f64 {
        self.samples_seen as f64 * 1000.0 / self.sample_rate
    }
}

/// Starts beat tracking on the default input device.
///
/// This function:
/// 1. Selects the default audio input device and an f32 configuration
/// 2. Moves the estimator and feed into the input callback
/// 3. Ticks the estimator once per delivered buffer
///
/// Read the clock from another thread through `estimator.reader()` and
/// request resyncs through `estimator.resync_handle()`; take both before
/// calling this.
///
/// # Arguments
/// * `estimator` - Estimator for this session
/// * `feed` - FFT feed sized to `BUFFER_SIZE`
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Running stream handle and its sample rate
/// * `Err(e)` - Error if audio setup fails
pub fn start_beat_tracking(mut estimator: TempoEstimator, mut feed: FftBandFeed) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    log::info!("[AUDIO] Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = TARGET_SAMPLE_RATE.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));

    let sample_rate_val = config.sample_rate().0;
    let channels = config.channels() as usize;
    let config: cpal::StreamConfig = config.into();

    log::info!("[AUDIO] Selected sample rate: {} Hz, {} channel(s)", sample_rate_val, channels);

    let mut capture = CaptureState::new(feed.frame_size(), channels, sample_rate_val);
    let err_fn = |err| log::error!("[AUDIO] An error occurred on the audio stream: {}", err);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let delta_ms = capture.push_interleaved(data);
            // The frame is always exactly frame_size long, so analysis cannot fail.
            if feed.analyze(&capture.frame).is_ok() {
                estimator.tick(capture.now_ms(), delta_ms, &feed);
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate_val))
}

/// Finds the best supported f32 input configuration for the target rate,
/// preferring mono and then the closest sample rate.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            let in_range = c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0;
            let rate_diff = if in_range { 0 } else { min_diff.min(max_diff) };
            (c.channels() != 1, rate_diff)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_buffer_is_downmixed_into_frame_tail() {
        let mut capture = CaptureState::new(4, 2, 1000);
        let delta = capture.push_interleaved(&[1.0, 3.0, 2.0, 4.0]);
        assert_eq!(delta, 2.0);
        assert_eq!(capture.frame, vec![0.0, 0.0, 2.0, 3.0]);
        assert_eq!(capture.now_ms(), 2.0);
    }

    #[test]
    fn test_long_buffer_keeps_newest_samples() {
        let mut capture = CaptureState::new(3, 1, 1000);
        capture.push_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(capture.frame, vec![3.0, 4.0, 5.0]);
        assert_eq!(capture.now_ms(), 5.0);
    }

    #[test]
    fn test_frame_slides_across_buffers() {
        let mut capture = CaptureState::new(4, 1, 1000);
        capture.push_interleaved(&[1.0, 2.0, 3.0]);
        capture.push_interleaved(&[4.0, 5.0]);
        assert_eq!(capture.frame, vec![2.0, 3.0, 4.0, 5.0]);
    }
}
