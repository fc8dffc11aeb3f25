//! # Estimator Configuration
//!
//! All tuning constants of the estimator live here as named fields, so a
//! session can be configured from a JSON file and the numbers are never
//! scattered through the tick code.
//!
//! ## Features
//! - Defaults matching the reference tuning
//! - Validation before an estimator is built
//! - JSON load/save through serde

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::band::BandConfig;
use crate::error::{EstimatorError, Result};

/// Beats per bar. The phase math assumes 4/4 throughout.
pub const BEATS_PER_BAR: f64 = 4.0;

/// Number of bars a resync snaps back to the start of.
pub const RESYNC_MEASURE_BARS: f64 = 4.0;

/// Configuration constant for the lifetime of one estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Slowest tempo the clock may run at (default: 50)
    pub min_bpm: f64,
    /// Fastest tempo the clock may run at (default: 190)
    pub max_bpm: f64,
    /// Refractory interval between two onsets of the same band (default: 50 ms)
    pub min_onset_interval_ms: f64,
    /// BPM change per unit of normalized phase error (default: -0.4)
    pub proportional_bpm_gain: f64,
    /// Bar-phase change per unit of normalized phase error (default: 0.01)
    pub phase_adjustment_gain: f64,
    /// Capacity of each band's sliding strength window (default: 200)
    pub onset_history_window_size: usize,
    /// Fixed margin on top of the band's threshold factor (default: 1.4)
    pub onset_threshold_margin: f64,
    /// Widening applied to each template's tolerance (default: 2.0).
    /// Kept from the reference tuning; its origin is undocumented.
    pub tolerance_widening: f64,
    /// Tempo the clock starts at before any resync (default: 120)
    pub initial_bpm: f64,
    /// Tracked bands, in feed-index order
    pub bands: Vec<BandConfig>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_bpm: 50.0,
            max_bpm: 190.0,
            min_onset_interval_ms: 50.0,
            proportional_bpm_gain: -0.4,
            phase_adjustment_gain: 0.01,
            onset_history_window_size: 200,
            onset_threshold_margin: 1.4,
            tolerance_widening: 2.0,
            initial_bpm: 120.0,
            bands: BandConfig::defaults(),
        }
    }
}

impl EstimatorConfig {
    /// Maximum age an onset may reach before it is pruned from history:
    /// two bars' worth of lookback at the slowest supported tempo.
    pub fn history_lookback_ms(&self) -> f64 {
        2.0 * (60000.0 / self.min_bpm)
    }

    pub fn clamp_bpm(&self, bpm: f64) -> f64 {
        bpm.clamp(self.min_bpm, self.max_bpm)
    }

    /// Checks numeric sanity. Band-level checks happen in `BandRegistry::new`.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EstimatorError::InvalidConfig(msg));

        if !self.min_bpm.is_finite() || self.min_bpm <= 0.0 {
            return invalid(format!("min_bpm must be positive, got {}", self.min_bpm));
        }
        if !self.max_bpm.is_finite() || self.max_bpm <= self.min_bpm {
            return invalid(format!(
                "max_bpm ({}) must be greater than min_bpm ({})",
                self.max_bpm, self.min_bpm
            ));
        }
        if !self.min_onset_interval_ms.is_finite() || self.min_onset_interval_ms < 0.0 {
            return invalid(format!(
                "min_onset_interval_ms must be non-negative, got {}",
                self.min_onset_interval_ms
            ));
        }
        if !self.proportional_bpm_gain.is_finite() || !self.phase_adjustment_gain.is_finite() {
            return invalid("controller gains must be finite".to_string());
        }
        if self.onset_history_window_size == 0 {
            return invalid("onset_history_window_size must be at least 1".to_string());
        }
        if !self.onset_threshold_margin.is_finite() || self.onset_threshold_margin <= 0.0 {
            return invalid(format!(
                "onset_threshold_margin must be positive, got {}",
                self.onset_threshold_margin
            ));
        }
        if !self.tolerance_widening.is_finite() || self.tolerance_widening <= 0.0 {
            return invalid(format!(
                "tolerance_widening must be positive, got {}",
                self.tolerance_widening
            ));
        }
        if !self.initial_bpm.is_finite() {
            return invalid("initial_bpm must be finite".to_string());
        }
        Ok(())
    }

    /// Parses and validates a configuration from JSON. Missing fields take
    /// their default values; unknown band names are rejected.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EstimatorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        log::info!("[CONFIG] Loaded estimator config from {}", path.display());
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        log::info!("[CONFIG] Saved estimator config to {}", path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::BandType;

    #[test]
    fn test_defaults_validate() {
        let config = EstimatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history_lookback_ms(), 2400.0);
    }

    #[test]
    fn test_inverted_bpm_range_rejected() {
        let config = EstimatorConfig {
            min_bpm: 150.0,
            max_bpm: 100.0,
            ..EstimatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(EstimatorError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EstimatorConfig::from_json_str(r#"{ "max_bpm": 175.0 }"#).unwrap();
        assert_eq!(config.max_bpm, 175.0);
        assert_eq!(config.min_bpm, 50.0);
        assert_eq!(config.bands.len(), 3);
    }

    #[test]
    fn test_json_bands_parse() {
        let json = r#"{
            "bands": [
                { "band_type": "snare", "bin_range_start": 9, "bin_range_end": 24, "onset_threshold_factor": 1.0 }
            ]
        }"#;
        let config = EstimatorConfig::from_json_str(json).unwrap();
        assert_eq!(config.bands.len(), 1);
        assert_eq!(config.bands[0].band_type, BandType::Snare);
    }

    #[test]
    fn test_unknown_band_name_rejected() {
        let json = r#"{
            "bands": [
                { "band_type": "cowbell", "bin_range_start": 9, "bin_range_end": 24, "onset_threshold_factor": 1.0 }
            ]
        }"#;
        assert!(matches!(
            EstimatorConfig::from_json_str(json),
            Err(EstimatorError::Json(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!("beatlock-config-{}.json", std::process::id()));
        let config = EstimatorConfig {
            initial_bpm: 128.0,
            ..EstimatorConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = EstimatorConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }
}
