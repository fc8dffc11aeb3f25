//! # FFT Band Feed
//!
//! A ready-made `SpectralFeed` that derives per-band attack strengths from
//! raw audio frames. Each frame is transformed with RustFFT, the mean
//! magnitude of every tracked band's bin range is measured, and the attack
//! is the positive change of that magnitude since the previous frame.
//!
//! ## Features
//! - DC offset removal and Hann windowing before the transform
//! - FFT plan, window and scratch buffers allocated once, up front
//! - Bin ranges taken straight from the band registry

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

use crate::band::BandRegistry;
use crate::error::{EstimatorError, Result};
use crate::feed::SpectralFeed;

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [Complex<f32>]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().map(|c| c.re).sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            sample.re -= avg;
        }
    }
}

/// Precomputes Hann window coefficients for a frame of `n` samples.
fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// Spectral feed computing band attacks from time-domain frames.
pub struct FftBandFeed {
    fft: Arc<dyn Fft<f32>>,
    frame_size: usize,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    bins: Vec<(usize, usize)>,
    previous: Vec<f32>,
    attacks: Vec<f32>,
}

impl FftBandFeed {
    /// Plans the transform and sizes every buffer for `frame_size` samples.
    ///
    /// # Errors
    /// * `InvalidConfig` - the frame size is zero
    /// * `InvalidBinRange` - a band reaches past the Nyquist bin
    pub fn new(registry: &BandRegistry, frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            return Err(EstimatorError::InvalidConfig("FFT frame size must be non-zero".into()));
        }
        let nyquist = frame_size / 2;
        let bins = registry
            .iter()
            .map(|band| {
                if band.bin_range_end > nyquist {
                    Err(EstimatorError::InvalidBinRange {
                        band: band.band_type,
                        start: band.bin_range_start,
                        end: band.bin_range_end,
                    })
                } else {
                    Ok((band.bin_range_start, band.bin_range_end))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);
        let scratch = vec![Complex { re: 0.0, im: 0.0 }; fft.get_inplace_scratch_len()];
        let band_count = bins.len();

        Ok(Self {
            fft,
            frame_size,
            window: hann_window(frame_size),
            buffer: vec![Complex { re: 0.0, im: 0.0 }; frame_size],
            scratch,
            bins,
            previous: vec![0.0; band_count],
            attacks: vec![0.0; band_count],
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Analyzes one frame and updates the per-band attacks.
    ///
    /// # Errors
    /// Returns `FrameSize` if `frame` does not hold exactly `frame_size` samples.
    pub fn analyze(&mut self, frame: &[f32]) -> Result<()> {
        if frame.len() != self.frame_size {
            return Err(EstimatorError::FrameSize {
                expected: self.frame_size,
                actual: frame.len(),
            });
        }

        for (slot, &sample) in self.buffer.iter_mut().zip(frame) {
            *slot = Complex { re: sample, im: 0.0 };
        }
        remove_dc_offset(&mut self.buffer);
        for (slot, &w) in self.buffer.iter_mut().zip(&self.window) {
            slot.re *= w;
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (i, &(start, end)) in self.bins.iter().enumerate() {
            let magnitude =
                self.buffer[start..end].iter().map(|c| c.norm()).sum::<f32>() / (end - start) as f32;
            self.attacks[i] = (magnitude - self.previous[i]).max(0.0);
            self.previous[i] = magnitude;
        }
        Ok(())
    }

    /// Attack strengths from the last analyzed frame, in registry order.
    pub fn attacks(&self) -> &[f32] {
        &self.attacks
    }

    /// Forgets the previous frame so the next attack is measured from silence.
    pub fn reset(&mut self) {
        self.previous.iter_mut().for_each(|p| *p = 0.0);
        self.attacks.iter_mut().for_each(|a| *a = 0.0);
    }
}

impl SpectralFeed for FftBandFeed {
    fn band_attack(&self, band_index: usize) -> f32 {
        self.attacks.get(band_index).copied().unwrap_or(0.0)
    }
}
