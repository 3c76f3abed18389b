// #![warn(missing_docs)]

//! Kepler Pixel Response Function Photometry
//!
//! Build the PRF of a target from the Kepler focal plane calibration files
//! and fit stellar flux and centroid to a time series of pixel frames.
//!
//! ```no_run
//! use prfit::prelude::*;
//!
//! let config = PrfConfig::from_env();
//! let footprint = Footprint::new(100.0, 200.0, 10, 10);
//! let prf = PrfModel::new(42, footprint, &config)?;
//! let image = prf.evaluate_centred(1000.0, 105.0, 205.0);
//! assert_eq!(image.dim(), (10, 10));
//! # Ok::<(), prfit::error::Error>(())
//! ```

#[allow(missing_docs)]
pub mod error;

pub mod calibration;
pub mod channel;
pub mod config;
pub mod footprint;
pub mod likelihood;
pub mod model;
pub mod optimize;
pub mod photometry;
pub mod prf;
pub mod spline;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::calibration::{CalibrationSample, CalibrationSource, FitsCalibrationLoader};
    pub use crate::config::{PrfConfig, RotationMode};
    pub use crate::footprint::Footprint;
    pub use crate::likelihood::PoissonLikelihood;
    pub use crate::model::{EvaluationCache, PrfParams, SceneModel, SpatialModel};
    pub use crate::optimize::{FitError, NelderMead, Optimizer};
    pub use crate::photometry::{
        BrightestPixel, FailurePolicy, FitResult, InitialGuess, PhotometryEngine,
        PhotometryResults, PrfPhotometry, SourceFinder,
    };
    pub use crate::prf::PrfModel;
}
