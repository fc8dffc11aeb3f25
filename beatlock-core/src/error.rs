//! Error types for the beat-locking core.

use thiserror::Error;

use crate::band::BandType;

/// Errors raised while building or configuring an estimator.
///
/// The per-tick path never fails; every variant here comes from
/// construction, configuration loading, or feeding a malformed frame.
#[derive(Error, Debug)]
pub enum EstimatorError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown band identifier: {0}")]
    UnknownBand(String),

    #[error("band {0:?} is registered more than once")]
    DuplicateBand(BandType),

    #[error("band {0:?} has no rhythmic templates")]
    MissingTemplates(BandType),

    #[error("band {band:?} has an invalid bin range {start}..{end}")]
    InvalidBinRange {
        band: BandType,
        start: usize,
        end: usize,
    },

    #[error("frame has {actual} samples, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EstimatorError>;
