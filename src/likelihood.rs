//! Poisson likelihood of an observed frame under a [`SpatialModel`].

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2, Zip};

use crate::error::{Error, Result};
use crate::model::SpatialModel;

/// Model values below this are treated as this when taking the logarithm.
const MIN_MODEL_VALUE: f64 = 1e-12;

/// Relative step of the central differences used for the Fisher information.
const DERIVATIVE_STEP: f64 = 1e-5;

/// Negative log-likelihood of photon counts under a model image.
///
/// Pixels whose observed value is not finite are ignored.
pub struct PoissonLikelihood<'a, M> {
    model: &'a M,
    data: ArrayView2<'a, f64>,
}

impl<'a, M: SpatialModel> PoissonLikelihood<'a, M> {
    /// Create a likelihood of `data` under `model`.
    ///
    /// Returns an error if `data` does not have the model's shape.
    pub fn new(model: &'a M, data: ArrayView2<'a, f64>) -> Result<Self> {
        if data.dim() != model.shape() {
            return Err(Error::ShapeMismatch {
                expected: model.shape(),
                got: data.dim(),
            });
        }
        Ok(Self { model, data })
    }

    pub fn data(&self) -> ArrayView2<'a, f64> {
        self.data
    }

    /// `Σ m - d ln m` over the finite pixels of the data, dropping the
    /// constant `ln d!` term.
    pub fn neg_log_likelihood(&self, image: &Array2<f64>) -> f64 {
        Zip::from(&self.data)
            .and(image)
            .fold(0.0, |acc, &d, &m| match d.is_finite() {
                true => {
                    let m_log = if m > MIN_MODEL_VALUE { m } else { MIN_MODEL_VALUE };
                    acc + m - d * m_log.ln()
                }
                false => acc,
            })
    }

    /// Evaluate the model at `params` and return its negative log-likelihood.
    pub fn evaluate(&self, params: &[f64]) -> Result<f64> {
        Ok(self.neg_log_likelihood(&self.model.evaluate(params)?))
    }

    /// Fisher information matrix of the model parameters at `params`.
    ///
    /// `F_ij = Σ ∂m/∂θ_i ∂m/∂θ_j / m`, with the derivatives taken by central
    /// differences. Pixels with non-positive model value or non-finite data
    /// are left out.
    pub fn fisher_information(&self, params: &[f64]) -> Result<DMatrix<f64>> {
        let image = self.model.evaluate(params)?;
        let gradients = params
            .iter()
            .enumerate()
            .map(|(k, value)| {
                let step = DERIVATIVE_STEP * value.abs().max(1.0);
                let mut forward = params.to_vec();
                let mut backward = params.to_vec();
                forward[k] += step;
                backward[k] -= step;
                Ok((self.model.evaluate(&forward)? - self.model.evaluate(&backward)?)
                    / (2.0 * step))
            })
            .collect::<Result<Vec<Array2<f64>>>>()?;

        let n = params.len();
        let mut fisher = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                let mut value = 0.0;
                Zip::from(&self.data)
                    .and(&image)
                    .and(&gradients[i])
                    .and(&gradients[j])
                    .for_each(|&d, &m, &gi, &gj| {
                        if d.is_finite() && m > 0.0 {
                            value += gi * gj / m;
                        }
                    });
                fisher[(i, j)] = value;
                fisher[(j, i)] = value;
            }
        }
        Ok(fisher)
    }

    /// One sigma uncertainties of the parameters at `params`, from the
    /// diagonal of the inverse Fisher information.
    ///
    /// Every entry is NaN if the Fisher information is singular.
    pub fn uncertainties(&self, params: &[f64]) -> Result<Vec<f64>> {
        let fisher = self.fisher_information(params)?;
        Ok(match fisher.try_inverse() {
            Some(covariance) => covariance.diagonal().iter().map(|v| v.sqrt()).collect(),
            None => vec![f64::NAN; params.len()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::footprint::Footprint;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// A flat image whose every pixel equals the single parameter.
    struct Flat;

    impl SpatialModel for Flat {
        fn footprint(&self) -> Footprint {
            Footprint::new(0.0, 0.0, 2, 2)
        }

        fn accepts(&self, len: usize) -> bool {
            len == 1
        }

        fn evaluate(&self, params: &[f64]) -> Result<Array2<f64>> {
            Ok(Array2::from_elem((2, 2), params[0]))
        }
    }

    #[test]
    fn minimum_is_at_the_data_mean() {
        let data = array![[3.0, 5.0], [4.0, 4.0]];
        let likelihood = PoissonLikelihood::new(&Flat, data.view()).unwrap();

        let at_mean = likelihood.evaluate(&[4.0]).unwrap();
        assert!(likelihood.evaluate(&[3.9]).unwrap() > at_mean);
        assert!(likelihood.evaluate(&[4.1]).unwrap() > at_mean);
        assert_relative_eq!(at_mean, 16.0 - 16.0 * 4.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn non_finite_pixels_are_ignored() {
        let data = array![[3.0, f64::NAN], [4.0, 5.0]];
        let likelihood = PoissonLikelihood::new(&Flat, data.view()).unwrap();
        let expected = 3.0 * 4.0 - 12.0 * 4.0_f64.ln();
        assert_relative_eq!(likelihood.evaluate(&[4.0]).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn non_positive_model_is_penalized() {
        let data = array![[3.0, 5.0], [4.0, 4.0]];
        let likelihood = PoissonLikelihood::new(&Flat, data.view()).unwrap();
        assert!(likelihood.evaluate(&[-1.0]).unwrap() > likelihood.evaluate(&[4.0]).unwrap());
    }

    #[test]
    fn flat_uncertainty_matches_poisson_noise() {
        // Fisher information of a common rate over four pixels is 4 / rate.
        let data = array![[9.0, 9.0], [9.0, 9.0]];
        let likelihood = PoissonLikelihood::new(&Flat, data.view()).unwrap();
        let sigma = likelihood.uncertainties(&[9.0]).unwrap();
        assert_relative_eq!(sigma[0], (9.0_f64 / 4.0).sqrt(), max_relative = 1e-6);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let data = Array2::zeros((3, 2));
        assert!(matches!(
            PoissonLikelihood::new(&Flat, data.view()),
            Err(Error::ShapeMismatch { expected: (2, 2), got: (3, 2) })
        ));
    }
}
