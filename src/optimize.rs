//! Gradient-free minimization of a scalar objective.

use log::debug;
use thiserror::Error;

use crate::error::Error;

#[derive(Debug, Error)]
pub enum FitError {
    #[error(
        "optimizer failed to converge after {iterations} iterations: parameter spread {x_spread} (xatol {xatol}), objective spread {f_spread} (fatol {fatol})"
    )]
    FailedToConverge {
        iterations: usize,
        x_spread: f64,
        xatol: f64,
        f_spread: f64,
        fatol: f64,
    },

    #[error("objective is not finite at the initial guess {params:?}")]
    NonFiniteObjective { params: Vec<f64> },

    #[error("initial guess is empty")]
    EmptyGuess,

    #[error("model evaluation failed: {0}")]
    Model(Box<Error>),
}

impl From<Error> for FitError {
    fn from(err: Error) -> Self {
        FitError::Model(Box::new(err))
    }
}

/// The minimizer found by an [`Optimizer`].
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizeResult {
    /// Parameters at the minimum.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub fun: f64,
    pub iterations: usize,
    pub evaluations: usize,
}

/// Finds the parameters minimizing an objective, starting from `x0`.
pub trait Optimizer {
    fn minimize<F>(&self, objective: F, x0: &[f64]) -> Result<OptimizeResult, FitError>
    where
        F: FnMut(&[f64]) -> Result<f64, FitError>;
}

/// The Nelder-Mead downhill simplex method.
///
/// Converges once every vertex of the simplex lies within `xatol` of the best
/// vertex and every objective value within `fatol` of the best value.
#[derive(Clone, Debug, PartialEq)]
pub struct NelderMead {
    /// Iteration limit, `200 * n` for `n` parameters if `None`.
    pub max_iterations: Option<usize>,
    pub xatol: f64,
    pub fatol: f64,
    /// Relative size of the initial simplex.
    pub initial_step: f64,
    /// Initial simplex step for parameters starting at zero.
    pub zero_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: None,
            xatol: 1e-4,
            fatol: 1e-4,
            initial_step: 0.05,
            zero_step: 0.00025,
        }
    }
}

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

struct Vertex {
    x: Vec<f64>,
    f: f64,
}

impl NelderMead {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_tolerances(mut self, xatol: f64, fatol: f64) -> Self {
        self.xatol = xatol;
        self.fatol = fatol;
        self
    }

    fn initial_simplex(&self, x0: &[f64]) -> Vec<Vec<f64>> {
        let mut simplex = vec![x0.to_vec()];
        for k in 0..x0.len() {
            let mut x = x0.to_vec();
            x[k] = match x[k] == 0.0 {
                true => self.zero_step,
                false => x[k] * (1.0 + self.initial_step),
            };
            simplex.push(x);
        }
        simplex
    }

    /// Largest distance of any vertex from the best one, in parameters and objective.
    fn spread(simplex: &[Vertex]) -> (f64, f64) {
        let best = &simplex[0];
        simplex[1..].iter().fold((0.0_f64, 0.0_f64), |(dx, df), v| {
            let vx = v
                .x
                .iter()
                .zip(&best.x)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f64, f64::max);
            (dx.max(vx), df.max((v.f - best.f).abs()))
        })
    }
}

/// Affine combination `a + t (b - a)`.
fn lerp(a: &[f64], b: &[f64], t: f64) -> Vec<f64> {
    a.iter().zip(b).map(|(a, b)| a + t * (b - a)).collect()
}

impl Optimizer for NelderMead {
    fn minimize<F>(&self, mut objective: F, x0: &[f64]) -> Result<OptimizeResult, FitError>
    where
        F: FnMut(&[f64]) -> Result<f64, FitError>,
    {
        if x0.is_empty() {
            return Err(FitError::EmptyGuess);
        }

        let n = x0.len();
        let max_iterations = self.max_iterations.unwrap_or(200 * n);
        let mut evaluations = 0;
        let mut eval = |x: &[f64]| -> Result<f64, FitError> {
            evaluations += 1;
            let f = objective(x)?;
            Ok(if f.is_nan() { f64::INFINITY } else { f })
        };

        let f0 = eval(x0)?;
        if !f0.is_finite() {
            return Err(FitError::NonFiniteObjective {
                params: x0.to_vec(),
            });
        }

        let mut simplex = vec![Vertex {
            x: x0.to_vec(),
            f: f0,
        }];
        for x in self.initial_simplex(x0).into_iter().skip(1) {
            let f = eval(&x)?;
            simplex.push(Vertex { x, f });
        }

        let mut iterations = 0;
        loop {
            simplex.sort_by(|a, b| a.f.total_cmp(&b.f));

            let (dx, df) = Self::spread(&simplex);
            if dx <= self.xatol && df <= self.fatol {
                break;
            }
            if iterations >= max_iterations {
                debug!("Nelder-Mead stopped at f={} with spread dx={dx} df={df}", simplex[0].f);
                return Err(FitError::FailedToConverge {
                    iterations,
                    x_spread: dx,
                    xatol: self.xatol,
                    f_spread: df,
                    fatol: self.fatol,
                });
            }
            iterations += 1;

            // Centroid of every vertex except the worst.
            let mut centroid = vec![0.0; n];
            for vertex in &simplex[..n] {
                for (c, x) in centroid.iter_mut().zip(&vertex.x) {
                    *c += x / n as f64;
                }
            }

            let worst = &simplex[n];
            let reflected = lerp(&centroid, &worst.x, -REFLECTION);
            let f_reflected = eval(&reflected)?;

            if f_reflected < simplex[0].f {
                let expanded = lerp(&centroid, &worst.x, -REFLECTION * EXPANSION);
                let f_expanded = eval(&expanded)?;
                simplex[n] = match f_expanded < f_reflected {
                    true => Vertex {
                        x: expanded,
                        f: f_expanded,
                    },
                    false => Vertex {
                        x: reflected,
                        f: f_reflected,
                    },
                };
                continue;
            }

            if f_reflected < simplex[n - 1].f {
                simplex[n] = Vertex {
                    x: reflected,
                    f: f_reflected,
                };
                continue;
            }

            // Contract outside if the reflection improved on the worst vertex, inside otherwise.
            let (contracted, bound) = match f_reflected < simplex[n].f {
                true => (
                    lerp(&centroid, &worst.x, -REFLECTION * CONTRACTION),
                    f_reflected,
                ),
                false => (lerp(&centroid, &worst.x, CONTRACTION), simplex[n].f),
            };
            let f_contracted = eval(&contracted)?;
            if f_contracted <= bound {
                simplex[n] = Vertex {
                    x: contracted,
                    f: f_contracted,
                };
                continue;
            }

            let best = simplex[0].x.clone();
            for vertex in simplex.iter_mut().skip(1) {
                vertex.x = lerp(&best, &vertex.x, SHRINK);
                vertex.f = eval(&vertex.x)?;
            }
        }

        let best = simplex.swap_remove(0);
        Ok(OptimizeResult {
            x: best.x,
            fun: best.f,
            iterations,
            evaluations,
        })
    }
}
