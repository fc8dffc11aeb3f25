//! # Onset Detection Module
//!
//! Turns the per-band "attack strength" scalars delivered by the spectral
//! feed into discrete onset events, and keeps a short, age-bounded history
//! of those events for the template matcher.
//!
//! ## Detection rule
//! For each band, the current strength is pushed into that band's sliding
//! window first, then compared against the window average. An onset fires when
//! - more than `min_onset_interval_ms` has passed since the band last fired, and
//! - `strength > average * threshold_factor * margin`
//!
//! ## History
//! Onsets older than two bars at the slowest tempo are pruned at the start
//! of every tick, which bounds both memory and the matcher's per-tick cost.

use crate::band::{BandRegistry, BandType};
use crate::config::EstimatorConfig;
use crate::window::SlidingWindow;

/// A detected transient. Created once, never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedOnset {
    pub timestamp_ms: f64,
    pub amplitude: f32,
    pub band_type: BandType,
}

/// Per-band detector state, indexed by registry slot.
#[derive(Debug)]
struct BandDetector {
    band_type: BandType,
    threshold_factor: f64,
    window: SlidingWindow,
    last_fire_ms: Option<f64>,
}

/// Adaptive-threshold onset detector covering every registered band.
#[derive(Debug)]
pub struct OnsetDetector {
    bands: Vec<BandDetector>,
    min_interval_ms: f64,
    margin: f64,
    rejected_samples: u64,
}

impl OnsetDetector {
    pub fn new(registry: &BandRegistry, config: &EstimatorConfig) -> Self {
        let bands = registry
            .iter()
            .map(|band| BandDetector {
                band_type: band.band_type,
                threshold_factor: band.onset_threshold_factor as f64,
                window: SlidingWindow::new(config.onset_history_window_size),
                last_fire_ms: None,
            })
            .collect();

        Self {
            bands,
            min_interval_ms: config.min_onset_interval_ms,
            margin: config.onset_threshold_margin,
            rejected_samples: 0,
        }
    }

    /// Feeds one strength sample for a band and reports whether it is an onset.
    ///
    /// # Arguments
    /// * `band_type` - Band the strength belongs to
    /// * `strength` - Attack strength from the spectral feed
    /// * `now_ms` - Timestamp of the current buffer
    ///
    /// # Returns
    /// * `Some(onset)` - The sample crossed the adaptive threshold outside the refractory interval
    /// * `None` - No onset, or the band is not tracked
    pub fn try_detect(&mut self, band_type: BandType, strength: f32, now_ms: f64) -> Option<DetectedOnset> {
        let index = self.bands.iter().position(|b| b.band_type == band_type)?;
        self.try_detect_at(index, strength, now_ms)
    }

    /// Same as `try_detect`, addressed by registry slot.
    pub fn try_detect_at(&mut self, index: usize, strength: f32, now_ms: f64) -> Option<DetectedOnset> {
        // A NaN or infinity would stay in the running sum until evicted and
        // silence the band for the whole window.
        if !strength.is_finite() {
            self.rejected_samples += 1;
            return None;
        }

        let band = self.bands.get_mut(index)?;
        band.window.push(strength);
        let average = band.window.average();

        let refractory_elapsed = band
            .last_fire_ms
            .is_none_or(|last| now_ms - last > self.min_interval_ms);
        let above_threshold = strength as f64 > average * band.threshold_factor * self.margin;

        if refractory_elapsed && above_threshold {
            band.last_fire_ms = Some(now_ms);
            Some(DetectedOnset {
                timestamp_ms: now_ms,
                amplitude: strength,
                band_type: band.band_type,
            })
        } else {
            None
        }
    }

    /// Number of non-finite samples dropped since construction.
    pub fn rejected_samples(&self) -> u64 {
        self.rejected_samples
    }

    /// Current sliding-window average of a band.
    pub fn average(&self, band_type: BandType) -> Option<f64> {
        self.bands
            .iter()
            .find(|b| b.band_type == band_type)
            .map(|b| b.window.average())
    }

    /// Clears every window, running sum and refractory timer.
    pub fn reset(&mut self) {
        for band in &mut self.bands {
            band.window.clear();
            band.last_fire_ms = None;
        }
    }
}

/// Upper bound on the per-band reservation. A band fires at most once per
/// tick, so a tiny refractory interval is limited by the tick rate instead.
const MAX_RESERVED_PER_BAND: usize = 4096;

/// Age-bounded buffer of recent onsets across all bands.
#[derive(Debug)]
pub struct OnsetHistory {
    onsets: Vec<DetectedOnset>,
    max_age_ms: f64,
}

impl OnsetHistory {
    /// Reserves room for the densest history the refractory interval allows,
    /// so steady-state pushes do not allocate.
    pub fn new(config: &EstimatorConfig, band_count: usize) -> Self {
        let max_age_ms = config.history_lookback_ms();
        let per_band = if config.min_onset_interval_ms > 0.0 {
            ((max_age_ms / config.min_onset_interval_ms).ceil() as usize + 2).min(MAX_RESERVED_PER_BAND)
        } else {
            config.onset_history_window_size
        };

        Self {
            onsets: Vec::with_capacity(per_band * band_count.max(1)),
            max_age_ms,
        }
    }

    pub fn push(&mut self, onset: DetectedOnset) {
        self.onsets.push(onset);
    }

    /// Drops every onset older than the lookback window.
    pub fn prune(&mut self, now_ms: f64) {
        let max_age = self.max_age_ms;
        self.onsets.retain(|o| now_ms - o.timestamp_ms <= max_age);
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectedOnset> {
        self.onsets.iter()
    }

    pub fn as_slice(&self) -> &[DetectedOnset] {
        &self.onsets
    }

    pub fn len(&self) -> usize {
        self.onsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.onsets.is_empty()
    }

    pub fn max_age_ms(&self) -> f64 {
        self.max_age_ms
    }

    pub fn clear(&mut self) {
        self.onsets.clear();
    }
}
