//! # Frequency Band Registry
//!
//! The estimator tracks a small, closed set of percussive band types. Each
//! tracked band is described by a `BandConfig` and registered once in a
//! `BandRegistry`, which assigns it a stable slot index. That index is what
//! the spectral feed is queried with and what the per-band detector state is
//! stored under.
//!
//! Validation happens once, at construction, so the tick never has to deal
//! with a band it does not know about.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EstimatorError, Result};
use crate::templates;

/// Percussive classes the estimator knows how to match against templates.
///
/// Adding a class means adding a tag here and a table in `templates`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandType {
    Bass,
    Snare,
    Hihat,
}

impl BandType {
    /// Every band type, in declaration order.
    pub const ALL: [BandType; 3] = [BandType::Bass, BandType::Snare, BandType::Hihat];

    /// Lowercase name used in configuration files and logs.
    pub fn name(self) -> &'static str {
        match self {
            BandType::Bass => "bass",
            BandType::Snare => "snare",
            BandType::Hihat => "hihat",
        }
    }

    /// Key under which onsets of this band are reported to a profiling sink.
    pub fn profile_key(self) -> &'static str {
        match self {
            BandType::Bass => "onset/bass",
            BandType::Snare => "onset/snare",
            BandType::Hihat => "onset/hihat",
        }
    }
}

impl fmt::Display for BandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BandType {
    type Err = EstimatorError;

    fn from_str(s: &str) -> Result<Self> {
        BandType::ALL
            .into_iter()
            .find(|band| band.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EstimatorError::UnknownBand(s.to_string()))
    }
}

/// Static description of one tracked band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    pub band_type: BandType,
    /// First FFT bin of the band (inclusive).
    pub bin_range_start: usize,
    /// Last FFT bin of the band (exclusive).
    pub bin_range_end: usize,
    /// Scale applied to the sliding average before the fixed margin.
    pub onset_threshold_factor: f32,
}

impl BandConfig {
    pub fn new(band_type: BandType, bin_range_start: usize, bin_range_end: usize, onset_threshold_factor: f32) -> Self {
        Self {
            band_type,
            bin_range_start,
            bin_range_end,
            onset_threshold_factor,
        }
    }

    /// Default band layout for a 2048-point FFT at 44.1 kHz (~21.5 Hz per bin).
    ///
    /// * Bass: ~20-150 Hz, the kick body
    /// * Snare: ~190-520 Hz, the shell crack
    /// * Hihat: ~6-12 kHz, cymbal noise
    pub fn defaults() -> Vec<BandConfig> {
        vec![
            BandConfig::new(BandType::Bass, 1, 7, 1.0),
            BandConfig::new(BandType::Snare, 9, 24, 1.1),
            BandConfig::new(BandType::Hihat, 279, 558, 1.2),
        ]
    }
}

/// Validated, ordered set of tracked bands.
///
/// The position of a band in the registry is its feed index.
#[derive(Debug, Clone)]
pub struct BandRegistry {
    bands: Vec<BandConfig>,
}

impl BandRegistry {
    /// Builds a registry, rejecting anything the tick could not handle.
    ///
    /// # Errors
    /// * `InvalidConfig` - the list is empty or a threshold factor is not a positive number
    /// * `DuplicateBand` - the same band type appears twice
    /// * `InvalidBinRange` - `bin_range_start >= bin_range_end`
    /// * `MissingTemplates` - no template table exists for a band type
    pub fn new(bands: Vec<BandConfig>) -> Result<Self> {
        if bands.is_empty() {
            return Err(EstimatorError::InvalidConfig("at least one band must be tracked".into()));
        }

        for (i, band) in bands.iter().enumerate() {
            if bands[..i].iter().any(|other| other.band_type == band.band_type) {
                return Err(EstimatorError::DuplicateBand(band.band_type));
            }
            if band.bin_range_start >= band.bin_range_end {
                return Err(EstimatorError::InvalidBinRange {
                    band: band.band_type,
                    start: band.bin_range_start,
                    end: band.bin_range_end,
                });
            }
            if !band.onset_threshold_factor.is_finite() || band.onset_threshold_factor <= 0.0 {
                return Err(EstimatorError::InvalidConfig(format!(
                    "band {} has threshold factor {}",
                    band.band_type, band.onset_threshold_factor
                )));
            }
            if templates::templates_for(band.band_type).is_empty() {
                return Err(EstimatorError::MissingTemplates(band.band_type));
            }
        }

        Ok(Self { bands })
    }

    /// Feed index of a band type, if it is tracked.
    pub fn index_of(&self, band_type: BandType) -> Option<usize> {
        self.bands.iter().position(|b| b.band_type == band_type)
    }

    pub fn get(&self, index: usize) -> Option<&BandConfig> {
        self.bands.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BandConfig> {
        self.bands.iter()
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_is_valid() {
        let registry = BandRegistry::new(BandConfig::defaults()).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.index_of(BandType::Bass), Some(0));
        assert_eq!(registry.index_of(BandType::Hihat), Some(2));
    }

    #[test]
    fn test_duplicate_band_rejected() {
        let bands = vec![
            BandConfig::new(BandType::Bass, 1, 7, 1.0),
            BandConfig::new(BandType::Bass, 8, 12, 1.0),
        ];
        assert!(matches!(
            BandRegistry::new(bands),
            Err(EstimatorError::DuplicateBand(BandType::Bass))
        ));
    }

    #[test]
    fn test_empty_bin_range_rejected() {
        let bands = vec![BandConfig::new(BandType::Snare, 10, 10, 1.0)];
        assert!(matches!(
            BandRegistry::new(bands),
            Err(EstimatorError::InvalidBinRange { .. })
        ));
    }

    #[test]
    fn test_untracked_band_has_no_index() {
        let registry = BandRegistry::new(vec![BandConfig::new(BandType::Bass, 1, 7, 1.0)]).unwrap();
        assert_eq!(registry.index_of(BandType::Snare), None);
    }

    #[test]
    fn test_band_names_parse() {
        assert_eq!("Bass".parse::<BandType>().unwrap(), BandType::Bass);
        assert_eq!(" hihat ".parse::<BandType>().unwrap(), BandType::Hihat);
        assert!(matches!("tom".parse::<BandType>(), Err(EstimatorError::UnknownBand(_))));
    }
}
