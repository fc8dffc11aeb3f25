// beatlock-core/src/lib.rs

//! The core logic for locking a virtual musical clock onto live audio.
//! This crate detects percussive onsets per frequency band, matches them
//! against rhythmic templates, and steers a BPM + bar-phase clock toward
//! the music. It is completely headless and contains no GUI code.
//!
//! ```no_run
//! use beatlock_core::{EstimatorConfig, TempoEstimator};
//!
//! let mut estimator = TempoEstimator::new(EstimatorConfig::default())?;
//! let reader = estimator.reader();
//!
//! // Once per audio buffer, with per-band attack strengths from the analyzer:
//! estimator.tick(10.0, 10.0, &[0.8f32, 0.1, 0.05]);
//!
//! println!("{:.2} BPM, bar {:.2}", reader.current_bpm(), reader.bar_progress());
//! # Ok::<(), beatlock_core::EstimatorError>(())
//! ```

pub mod audio;
pub mod band;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod estimator;
pub mod feed;
pub mod fft;
pub mod matcher;
pub mod onset;
pub mod profiling;
pub mod tap;
pub mod templates;
pub mod window;

pub use band::{BandConfig, BandRegistry, BandType};
pub use clock::{ClockReader, ClockSnapshot};
pub use config::EstimatorConfig;
pub use error::EstimatorError;
pub use estimator::{ResyncHandle, TempoEstimator, TickOutcome, TrackerState};
pub use feed::SpectralFeed;
pub use fft::FftBandFeed;
pub use onset::DetectedOnset;
pub use profiling::{LogSink, NullSink, ProfilingSink};
pub use tap::TapTempo;
