//! Parametric image models fit by the photometry driver.

use ndarray::Array2;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::footprint::Footprint;
use crate::prf::PrfModel;

/// Builds a predicted image from a flat parameter vector.
pub trait SpatialModel {
    /// The detector pixels covered by every evaluated image.
    fn footprint(&self) -> Footprint;

    /// Returns `(rows, cols)` of every evaluated image.
    fn shape(&self) -> (usize, usize) {
        self.footprint().shape()
    }

    /// Returns `true` if a parameter vector of length `len` can be evaluated.
    fn accepts(&self, len: usize) -> bool;

    fn evaluate(&self, params: &[f64]) -> Result<Array2<f64>>;
}

impl<M: SpatialModel + ?Sized> SpatialModel for &M {
    fn footprint(&self) -> Footprint {
        M::footprint(*self)
    }

    fn accepts(&self, len: usize) -> bool {
        M::accepts(*self, len)
    }

    fn evaluate(&self, params: &[f64]) -> Result<Array2<f64>> {
        M::evaluate(*self, params)
    }
}

/// Flux, centroid and shape warp of a single source.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrfParams {
    pub flux: f64,
    pub centroid_col: f64,
    pub centroid_row: f64,
    pub stretch_col: f64,
    pub stretch_row: f64,
    pub rotation: f64,
}

impl PrfParams {
    /// Create unwarped parameters for a source of `flux` at (`centroid_col`, `centroid_row`).
    pub fn new(flux: f64, centroid_col: f64, centroid_row: f64) -> Self {
        Self {
            flux,
            centroid_col,
            centroid_row,
            stretch_col: 1.0,
            stretch_row: 1.0,
            rotation: 0.0,
        }
    }

    pub fn with_warp(mut self, stretch_col: f64, stretch_row: f64, rotation: f64) -> Self {
        self.stretch_col = stretch_col;
        self.stretch_row = stretch_row;
        self.rotation = rotation;
        self
    }

    /// Read `[flux, col, row]` or `[flux, col, row, stretch_col, stretch_row, rotation]`.
    pub fn from_slice(params: &[f64]) -> Result<Self> {
        match *params {
            [flux, col, row] => Ok(Self::new(flux, col, row)),
            [flux, col, row, stretch_col, stretch_row, rotation] => {
                Ok(Self::new(flux, col, row).with_warp(stretch_col, stretch_row, rotation))
            }
            _ => Err(Error::ParameterCount {
                expected: "3 or 6".into(),
                got: params.len(),
            }),
        }
    }

    /// Flatten into a parameter vector, with the warp terms if `with_warp` is set.
    pub fn to_vec(&self, with_warp: bool) -> Vec<f64> {
        let mut params = vec![self.flux, self.centroid_col, self.centroid_row];
        if with_warp {
            params.extend([self.stretch_col, self.stretch_row, self.rotation]);
        }
        params
    }
}

impl SpatialModel for PrfModel {
    fn footprint(&self) -> Footprint {
        *PrfModel::footprint(self)
    }

    fn accepts(&self, len: usize) -> bool {
        len == 3 || len == 6
    }

    fn evaluate(&self, params: &[f64]) -> Result<Array2<f64>> {
        let p = PrfParams::from_slice(params)?;
        Ok(PrfModel::evaluate(
            self,
            p.flux,
            p.centroid_col,
            p.centroid_row,
            p.stretch_col,
            p.stretch_row,
            p.rotation,
        ))
    }
}

/// Several sources sharing one PRF and one optional shape warp.
///
/// Parameters are `[flux, col, row]` for each star, followed by
/// `[stretch_col, stretch_row, rotation]` when the warp is fit.
#[derive(Clone, Copy, Debug)]
pub struct SceneModel<'a> {
    prf: &'a PrfModel,
    stars: usize,
    fit_warp: bool,
}

impl<'a> SceneModel<'a> {
    pub fn new(prf: &'a PrfModel, stars: usize, fit_warp: bool) -> Self {
        Self {
            prf,
            stars,
            fit_warp,
        }
    }

    pub fn stars(&self) -> usize {
        self.stars
    }

    /// Length of the parameter vector.
    pub fn len(&self) -> usize {
        3 * self.stars + if self.fit_warp { 3 } else { 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.stars == 0
    }

    /// Split a parameter vector into per-star parameters.
    pub fn unpack(&self, params: &[f64]) -> Result<Vec<PrfParams>> {
        if params.len() != self.len() {
            return Err(Error::ParameterCount {
                expected: self.len().to_string(),
                got: params.len(),
            });
        }

        let (stars, warp) = params.split_at(3 * self.stars);
        let (stretch_col, stretch_row, rotation) = match *warp {
            [stretch_col, stretch_row, rotation] => (stretch_col, stretch_row, rotation),
            _ => (1.0, 1.0, 0.0),
        };

        Ok(stars
            .chunks_exact(3)
            .map(|star| {
                PrfParams::new(star[0], star[1], star[2]).with_warp(
                    stretch_col,
                    stretch_row,
                    rotation,
                )
            })
            .collect())
    }
}

impl SpatialModel for SceneModel<'_> {
    fn footprint(&self) -> Footprint {
        *self.prf.footprint()
    }

    fn accepts(&self, len: usize) -> bool {
        len == self.len()
    }

    fn evaluate(&self, params: &[f64]) -> Result<Array2<f64>> {
        let mut image = Array2::zeros(SpatialModel::shape(self));
        for star in self.unpack(params)? {
            image += &self.prf.evaluate(
                star.flux,
                star.centroid_col,
                star.centroid_row,
                star.stretch_col,
                star.stretch_row,
                star.rotation,
            );
        }
        Ok(image)
    }
}

/// Remembers the most recent evaluation of a model.
///
/// Repeated evaluation of the same parameter vector returns the stored image.
/// Parameters are compared bit for bit.
#[derive(Debug)]
pub struct EvaluationCache<'a, M> {
    model: &'a M,
    last: Option<(Vec<u64>, Array2<f64>)>,
    hits: usize,
}

impl<'a, M: SpatialModel> EvaluationCache<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self {
            model,
            last: None,
            hits: 0,
        }
    }

    pub fn model(&self) -> &'a M {
        self.model
    }

    /// Evaluate the model at `params`, reusing the stored image if `params`
    /// matches the previous call.
    pub fn evaluate(&mut self, params: &[f64]) -> Result<&Array2<f64>> {
        let key: Vec<u64> = params.iter().map(|p| p.to_bits()).collect();
        let hit = matches!(&self.last, Some((last_key, _)) if *last_key == key);
        if hit {
            self.hits += 1;
        } else {
            let image = self.model.evaluate(params)?;
            self.last = Some((key, image));
        }

        Ok(&self
            .last
            .as_ref()
            .expect("cache holds the latest evaluation")
            .1)
    }

    /// The image produced by the latest successful evaluation.
    pub fn last(&self) -> Option<&Array2<f64>> {
        self.last.as_ref().map(|(_, image)| image)
    }

    /// Number of evaluations answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits
    }
}
