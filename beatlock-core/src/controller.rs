//! # Tempo/Phase Controller
//!
//! Turns the tick's accumulated phase error into corrections of the clock.
//! This is a heuristic dual-proportional controller: tempo and phase each
//! get their own proportional term on the same error signal. There is no
//! integral or derivative term.
//!
//! With the default negative tempo gain, onsets arriving early (negative
//! error) speed the clock up, and late onsets slow it down.

use crate::config::EstimatorConfig;
use crate::matcher::PhaseErrorSum;

/// Corrections to apply to the clock for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// Added to the tempo before clamping.
    pub bpm: f64,
    /// Subtracted from the bar phase.
    pub phase: f64,
}

/// Output of one controller step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerStep {
    pub normalized_phase_error: f64,
    pub correction: Correction,
}

#[derive(Debug, Clone, Copy)]
pub struct TempoPhaseController {
    bpm_gain: f64,
    phase_gain: f64,
}

impl TempoPhaseController {
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            bpm_gain: config.proportional_bpm_gain,
            phase_gain: config.phase_adjustment_gain,
        }
    }

    /// Computes the correction for a tick, or `None` when nothing matched and
    /// the clock should free-run.
    pub fn step(&self, errors: &PhaseErrorSum) -> Option<ControllerStep> {
        let normalized_phase_error = errors.normalized()?;
        Some(ControllerStep {
            normalized_phase_error,
            correction: Correction {
                bpm: self.bpm_gain * normalized_phase_error,
                phase: normalized_phase_error * self.phase_gain,
            },
        })
    }
}
