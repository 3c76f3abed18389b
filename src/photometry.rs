//! PRF photometry of a time series of frames.
//!
//! Each frame is fit by minimizing the Poisson negative log-likelihood of a
//! [`SpatialModel`]. The parameters fitted to one frame seed the fit of the
//! next.

use log::{debug, info, warn};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::footprint::Footprint;
use crate::likelihood::PoissonLikelihood;
use crate::model::{EvaluationCache, SpatialModel};
use crate::optimize::{FitError, NelderMead, Optimizer};

/// A rough flux and position of one source, used to start a fit.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InitialGuess {
    pub flux: f64,
    pub col: f64,
    pub row: f64,
}

/// Detects sources in a frame.
pub trait SourceFinder {
    /// Returns one guess per source found in `frame`, which covers `footprint`.
    fn initial_guesses(&self, frame: ArrayView2<f64>, footprint: &Footprint) -> Vec<InitialGuess>;
}

/// Places a single source at the center of the brightest pixel, with the
/// total flux of the frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrightestPixel;

impl SourceFinder for BrightestPixel {
    fn initial_guesses(&self, frame: ArrayView2<f64>, footprint: &Footprint) -> Vec<InitialGuess> {
        let brightest = frame
            .indexed_iter()
            .filter(|(_, value)| value.is_finite())
            .max_by(|(_, a), (_, b)| a.total_cmp(b));

        let Some(((i, j), _)) = brightest else {
            return Vec::new();
        };

        let flux = frame.iter().filter(|value| value.is_finite()).sum();
        vec![InitialGuess {
            flux,
            col: footprint.column() + j as f64 + 0.5,
            row: footprint.row() + i as f64 + 0.5,
        }]
    }
}

/// The outcome of fitting one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FitResult {
    pub params: Vec<f64>,
    /// Observed frame minus the model at `params`.
    pub residuals: Array2<f64>,
    /// One sigma uncertainty of each parameter.
    pub uncertainties: Vec<f64>,
    pub neg_log_likelihood: f64,
    pub iterations: usize,
}

/// Fits a model to a single frame.
pub trait PhotometryEngine {
    fn fit(&self, frame: ArrayView2<f64>, initial_guess: &[f64]) -> std::result::Result<FitResult, FitError>;
}

/// What [`PrfPhotometry::do_photometry`] does when a frame cannot be fit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FailurePolicy {
    /// Stop and return the error.
    #[default]
    Abort,

    /// Record the frame as skipped and seed the next frame with the last
    /// successful fit.
    SkipFrame,
}

/// Maximum-likelihood photometry with a [`SpatialModel`].
#[derive(Clone, Debug)]
pub struct PrfPhotometry<M, O = NelderMead, S = BrightestPixel> {
    model: M,
    optimizer: O,
    source_finder: S,
    failure_policy: FailurePolicy,
}

impl<M: SpatialModel> PrfPhotometry<M> {
    /// Create a photometry engine for `model` using the default Nelder-Mead
    /// optimizer and [`BrightestPixel`] source finder.
    pub fn new(model: M) -> Self {
        Self {
            model,
            optimizer: NelderMead::default(),
            source_finder: BrightestPixel,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl<M, O, S> PrfPhotometry<M, O, S>
where
    M: SpatialModel,
    O: Optimizer,
    S: SourceFinder,
{
    pub fn with_optimizer<P: Optimizer>(self, optimizer: P) -> PrfPhotometry<M, P, S> {
        PrfPhotometry {
            model: self.model,
            optimizer,
            source_finder: self.source_finder,
            failure_policy: self.failure_policy,
        }
    }

    pub fn with_source_finder<T: SourceFinder>(self, source_finder: T) -> PrfPhotometry<M, O, T> {
        PrfPhotometry {
            model: self.model,
            optimizer: self.optimizer,
            source_finder,
            failure_policy: self.failure_policy,
        }
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Build a parameter vector for `frame` from the sources the source finder detects.
    ///
    /// The guesses are laid out as `[flux, col, row]` per source. If the model
    /// also expects a shape warp, the neutral warp `[1, 1, 0]` is appended.
    pub fn initial_guess(&self, frame: ArrayView2<f64>, frame_index: usize) -> Result<Vec<f64>> {
        let guesses = self
            .source_finder
            .initial_guesses(frame, &self.model.footprint());
        if guesses.is_empty() {
            return Err(Error::NoSources { frame: frame_index });
        }

        let mut params: Vec<f64> = guesses
            .iter()
            .flat_map(|guess| [guess.flux, guess.col, guess.row])
            .collect();
        if self.model.accepts(params.len()) {
            return Ok(params);
        }

        params.extend([1.0, 1.0, 0.0]);
        match self.model.accepts(params.len()) {
            true => Ok(params),
            false => Err(Error::ParameterCount {
                expected: "a length accepted by the model".into(),
                got: 3 * guesses.len(),
            }),
        }
    }

    /// Fit every frame of `frames`, shaped `(time, rows, cols)`, in order.
    ///
    /// Frame 0 is seeded by `initial_guess` or, if that is `None`, by the
    /// source finder. Every later frame is seeded by the most recent
    /// successful fit.
    pub fn do_photometry(
        &self,
        frames: ArrayView3<f64>,
        initial_guess: Option<&[f64]>,
    ) -> Result<PhotometryResults> {
        let (count, rows, cols) = frames.dim();
        if (rows, cols) != self.model.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.model.shape(),
                got: (rows, cols),
            });
        }

        let mut guess = match (initial_guess, count) {
            (Some(guess), _) => guess.to_vec(),
            (None, 0) => Vec::new(),
            (None, _) => self.initial_guess(frames.index_axis(Axis(0), 0), 0)?,
        };

        let mut results = PhotometryResults::new(guess.len(), (rows, cols));
        for (index, frame) in frames.axis_iter(Axis(0)).enumerate() {
            match self.fit(frame, &guess) {
                Ok(result) => {
                    debug!(
                        "frame {index}: params={:?} nll={} iterations={}",
                        result.params, result.neg_log_likelihood, result.iterations
                    );
                    guess.clone_from(&result.params);
                    results.push(index, result);
                }
                Err(source) => match self.failure_policy {
                    FailurePolicy::Abort => {
                        return Err(Error::FrameFit {
                            frame: index,
                            source,
                        });
                    }
                    FailurePolicy::SkipFrame => {
                        warn!("skipping frame {index}: {source}");
                        results.skipped.push(index);
                    }
                },
            }
        }

        info!(
            "fit {} of {count} frames, {} skipped",
            results.len(),
            results.skipped.len()
        );
        Ok(results)
    }
}

impl<M, O, S> PhotometryEngine for PrfPhotometry<M, O, S>
where
    M: SpatialModel,
    O: Optimizer,
{
    fn fit(&self, frame: ArrayView2<f64>, initial_guess: &[f64]) -> std::result::Result<FitResult, FitError> {
        let likelihood = PoissonLikelihood::new(&self.model, frame.view())?;
        let mut cache = EvaluationCache::new(&self.model);

        let optimum = self.optimizer.minimize(
            |params| Ok(likelihood.neg_log_likelihood(cache.evaluate(params)?)),
            initial_guess,
        )?;

        let residuals = &frame - cache.evaluate(&optimum.x)?;
        let uncertainties = likelihood.uncertainties(&optimum.x)?;

        Ok(FitResult {
            params: optimum.x,
            residuals,
            uncertainties,
            neg_log_likelihood: optimum.fun,
            iterations: optimum.iterations,
        })
    }
}

/// Per-frame results of [`PrfPhotometry::do_photometry`].
#[derive(Clone, Debug, PartialEq)]
pub struct PhotometryResults {
    n_params: usize,
    shape: (usize, usize),
    frames: Vec<usize>,
    fits: Vec<FitResult>,
    skipped: Vec<usize>,
}

impl PhotometryResults {
    fn new(n_params: usize, shape: (usize, usize)) -> Self {
        Self {
            n_params,
            shape,
            frames: Vec::new(),
            fits: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn push(&mut self, frame: usize, fit: FitResult) {
        self.frames.push(frame);
        self.fits.push(fit);
    }

    /// Number of frames fitted.
    pub fn len(&self) -> usize {
        self.fits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }

    /// Indices of the fitted frames, in order.
    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    /// Indices of the frames skipped under [`FailurePolicy::SkipFrame`].
    pub fn skipped(&self) -> &[usize] {
        &self.skipped
    }

    pub fn fits(&self) -> &[FitResult] {
        &self.fits
    }

    /// Fitted parameters, one row per fitted frame.
    pub fn opt_params(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), self.n_params), |(i, j)| self.fits[i].params[j])
    }

    /// Residual frames, shaped `(fitted frames, rows, cols)`.
    pub fn residuals(&self) -> Array3<f64> {
        let (rows, cols) = self.shape;
        Array3::from_shape_fn((self.len(), rows, cols), |(t, i, j)| {
            self.fits[t].residuals[[i, j]]
        })
    }

    /// Parameter uncertainties, one row per fitted frame.
    pub fn uncertainties(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), self.n_params), |(i, j)| {
            self.fits[i].uncertainties[j]
        })
    }
}
