//! # Rhythmic Templates
//!
//! Static tables of where each percussive class is expected to land inside a
//! 4/4 bar. A template pairs a normalized bar position with an importance
//! weight and a timing tolerance.
//!
//! ## Layout
//! - Bass: downbeat (strong) and the half-bar "three" (weaker)
//! - Snare: backbeats on two and four
//! - Hihat: the eight straight eighth notes, offbeats listed first
//!
//! Positions are not required to be sorted; the matcher visits every entry.

use once_cell::sync::Lazy;

use crate::band::BandType;

/// One expected hit position inside a bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RhythmicTemplate {
    /// Position inside the bar, in `[0, 1)`.
    pub position: f64,
    /// Relative importance, strictly positive.
    pub weight: f64,
    /// Timing tolerance in milliseconds.
    pub tolerance_ms: f64,
}

impl RhythmicTemplate {
    const fn new(position: f64, weight: f64, tolerance_ms: f64) -> Self {
        Self {
            position,
            weight,
            tolerance_ms,
        }
    }
}

static BASS_TEMPLATES: [RhythmicTemplate; 2] = [
    RhythmicTemplate::new(0.0, 1.0, 60.0),
    RhythmicTemplate::new(0.5, 0.6, 60.0),
];

static SNARE_TEMPLATES: [RhythmicTemplate; 2] = [
    RhythmicTemplate::new(0.25, 0.8, 45.0),
    RhythmicTemplate::new(0.75, 0.8, 45.0),
];

/// Eighth-note grid. Offbeats come first and carry slightly less weight than
/// the quarter-note positions.
static HIHAT_TEMPLATES: Lazy<Vec<RhythmicTemplate>> = Lazy::new(|| {
    let offbeats = (0..4).map(|i| RhythmicTemplate::new(i as f64 / 4.0 + 0.125, 0.25, 25.0));
    let onbeats = (0..4).map(|i| RhythmicTemplate::new(i as f64 / 4.0, 0.3, 25.0));
    offbeats.chain(onbeats).collect()
});

/// Templates registered for a band type.
pub fn templates_for(band: BandType) -> &'static [RhythmicTemplate] {
    match band {
        BandType::Bass => &BASS_TEMPLATES,
        BandType::Snare => &SNARE_TEMPLATES,
        BandType::Hihat => HIHAT_TEMPLATES.as_slice(),
    }
}
