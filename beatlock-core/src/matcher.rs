//! # Template Matcher
//!
//! Places every retained onset inside the bar the clock currently believes
//! it is in, and measures how far each one sits from the templates of its
//! band. Errors are circular: a hit just before the downbeat is a small
//! negative error, not an error of almost one bar.
//!
//! The per-tick result is a pair of sums that the controller turns into a
//! single normalized error.

use crate::clock::bar_fraction;
use crate::config::BEATS_PER_BAR;
use crate::onset::DetectedOnset;
use crate::templates::{RhythmicTemplate, templates_for};

/// Accumulated weighted phase error for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseErrorSum {
    /// Σ(raw_error * template.weight)
    pub weighted_error_sum: f64,
    /// Σ(template.weight * onset.amplitude)
    pub weight_sum: f64,
    /// Number of (onset, template) pairs inside tolerance.
    pub matches: usize,
}

impl PhaseErrorSum {
    /// `weighted_error_sum / weight_sum`, or `None` when nothing matched.
    pub fn normalized(&self) -> Option<f64> {
        if self.weight_sum > 0.0 {
            Some(self.weighted_error_sum / self.weight_sum)
        } else {
            None
        }
    }
}

/// Length of one bar in milliseconds at the given tempo.
pub fn bar_duration_ms(bpm: f64) -> f64 {
    60000.0 / bpm * BEATS_PER_BAR
}

/// Wraps a bar-position difference into `[-0.5, 0.5]`.
pub fn wrap_phase_error(raw: f64) -> f64 {
    if raw > 0.5 {
        raw - 1.0
    } else if raw < -0.5 {
        raw + 1.0
    } else {
        raw
    }
}

/// Normalized position of a timestamp inside the bar that starts at `bar_start_ms`.
pub fn position_in_bar(timestamp_ms: f64, bar_start_ms: f64, bar_ms: f64) -> f64 {
    let mut offset = (timestamp_ms - bar_start_ms) % bar_ms;
    if offset < 0.0 {
        offset += bar_ms;
    }
    offset / bar_ms
}

/// Matches onsets against the static template tables.
#[derive(Debug, Clone, Copy)]
pub struct TemplateMatcher {
    tolerance_widening: f64,
}

impl TemplateMatcher {
    pub fn new(tolerance_widening: f64) -> Self {
        Self { tolerance_widening }
    }

    /// Computes the weighted phase error of all onsets for the current tick.
    ///
    /// # Arguments
    /// * `onsets` - Onsets still inside the history lookback
    /// * `now_ms` - Timestamp of the current tick
    /// * `bpm` - Current clock tempo
    /// * `bar_phase` - Current (unbounded) clock bar phase
    pub fn accumulate(&self, onsets: &[DetectedOnset], now_ms: f64, bpm: f64, bar_phase: f64) -> PhaseErrorSum {
        let bar_ms = bar_duration_ms(bpm);
        let bar_start_ms = now_ms - bar_fraction(bar_phase) * bar_ms;

        let mut sum = PhaseErrorSum::default();
        for onset in onsets {
            let onset_pos = position_in_bar(onset.timestamp_ms, bar_start_ms, bar_ms);
            for template in templates_for(onset.band_type) {
                self.match_template(&mut sum, template, onset, onset_pos, bar_ms);
            }
        }
        sum
    }

    fn match_template(
        &self,
        sum: &mut PhaseErrorSum,
        template: &RhythmicTemplate,
        onset: &DetectedOnset,
        onset_pos: f64,
        bar_ms: f64,
    ) {
        let raw_error = wrap_phase_error(onset_pos - template.position);
        let error_ms = raw_error * bar_ms;
        if error_ms.abs() > template.tolerance_ms * self.tolerance_widening {
            return;
        }
        sum.weighted_error_sum += raw_error * template.weight;
        sum.weight_sum += template.weight * onset.amplitude as f64;
        sum.matches += 1;
    }
}
