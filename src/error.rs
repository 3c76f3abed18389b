use std::path::PathBuf;

use thiserror::Error;

use crate::optimize::FitError;

/// Errors raised while building or fitting a PRF model.
#[derive(Debug, Error)]
pub enum Error {
    #[error("channel {channel} is not a science channel, expected 1 to 84")]
    InvalidChannel { channel: u32 },

    #[error("no calibration file matches '{pattern}'")]
    CalibrationNotFound { pattern: String },

    #[error("malformed calibration file '{}': {reason}", path.display())]
    CalibrationFormat { path: PathBuf, reason: String },

    #[error("failed to read FITS file '{}': {source}", path.display())]
    Fits {
        path: PathBuf,
        source: fitsio::errors::Error,
    },

    #[error("invalid calibration file pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("expected {expected} calibration samples but got {got}")]
    SampleCount { expected: usize, got: usize },

    #[error("calibration sample {index} is unusable: {reason}")]
    InvalidSample { index: usize, reason: String },

    #[error("footprint of shape {rows}x{cols} has no pixels")]
    EmptyFootprint { rows: usize, cols: usize },

    #[error("fused kernel cannot be normalized, sum of finite cells is {sum}")]
    DegenerateKernel { sum: f64 },

    #[error("expected {expected} model parameters but got {got}")]
    ParameterCount { expected: String, got: usize },

    #[error("expected a frame of shape {expected:?} but got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("no sources found in frame {frame} to seed the fit")]
    NoSources { frame: usize },

    #[error("fit of frame {frame} failed: {source}")]
    FrameFit { frame: usize, source: FitError },
}

pub type Result<T> = std::result::Result<T, Error>;
