//! Natural cubic spline interpolation in one and two dimensions.
//!
//! The two dimensional interpolant is the tensor product of natural cubic
//! splines along each axis. It passes through every grid value and is C²
//! continuous inside the grid. Queries outside the grid are clamped to the
//! nearest edge.
//!
//! NaN grid values are confined to the grid cells touching them: those cells
//! evaluate to NaN, and the rest of the surface is built as if the NaN values
//! were zero.

use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;

/// Natural cubic spline through points sorted by strictly increasing `x`.
#[derive(Clone, Debug)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivative at each knot.
    m: Vec<f64>,
}

impl CubicSpline {
    /// Create a new `CubicSpline` through (`x`, `y`).
    ///
    /// Panics if the lengths differ, if there are fewer than two points or if
    /// `x` is not strictly increasing.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        assert_eq!(x.len(), y.len(), "x and y must have the same length");
        assert_increasing(&x);

        let m = second_derivatives(&x, y.iter().copied());
        Self { x, y, m }
    }

    /// Evaluate the spline at `t`, clamping `t` to the knot range.
    pub fn evaluate(&self, t: f64) -> f64 {
        let (i, [a, b, c, d]) = weights(&self.x, t);
        a * self.y[i] + b * self.y[i + 1] + c * self.m[i] + d * self.m[i + 1]
    }
}

/// Bicubic interpolant over a rectangular grid.
///
/// Axis 0 of the grid runs along `rows`, axis 1 along `cols`, and queries
/// take `(row, col)` in that order.
#[derive(Clone, Debug)]
pub struct BicubicSpline {
    rows: Vec<f64>,
    cols: Vec<f64>,
    f: Array2<f64>,
    /// Second derivative along rows.
    f_rr: Array2<f64>,
    /// Second derivative along cols.
    f_cc: Array2<f64>,
    /// Mixed fourth derivative.
    f_rrcc: Array2<f64>,
    /// Knots whose grid value was NaN, if any.
    nan_knots: Option<Array2<bool>>,
}

impl BicubicSpline {
    /// Create a new `BicubicSpline` through `grid`, sampled at `rows` along
    /// axis 0 and `cols` along axis 1.
    ///
    /// Panics if the axes do not match the grid shape, have fewer than two
    /// points, or are not strictly increasing.
    pub fn new(rows: Vec<f64>, cols: Vec<f64>, mut grid: Array2<f64>) -> Self {
        assert_eq!(grid.nrows(), rows.len(), "row axis must match grid rows");
        assert_eq!(grid.ncols(), cols.len(), "col axis must match grid cols");
        assert_increasing(&rows);
        assert_increasing(&cols);

        let nan_knots = grid
            .iter()
            .any(|value| value.is_nan())
            .then(|| grid.mapv(f64::is_nan));
        if nan_knots.is_some() {
            grid.mapv_inplace(|value| if value.is_nan() { 0.0 } else { value });
        }

        let f_rr = lane_second_derivatives(&rows, &grid, Axis(0));
        let f_cc = lane_second_derivatives(&cols, &grid, Axis(1));
        let f_rrcc = lane_second_derivatives(&cols, &f_rr, Axis(1));

        Self {
            rows,
            cols,
            f: grid,
            f_rr,
            f_cc,
            f_rrcc,
            nan_knots,
        }
    }

    /// Returns the `(min, max)` row coordinate covered by the grid.
    pub fn row_extent(&self) -> (f64, f64) {
        (self.rows[0], self.rows[self.rows.len() - 1])
    }

    /// Returns the `(min, max)` col coordinate covered by the grid.
    pub fn col_extent(&self) -> (f64, f64) {
        (self.cols[0], self.cols[self.cols.len() - 1])
    }

    /// Evaluate the interpolant at (`row`, `col`).
    pub fn evaluate(&self, row: f64, col: f64) -> f64 {
        let (i, wr) = weights(&self.rows, row);
        let (j, wc) = weights(&self.cols, col);

        if let Some(nan_knots) = &self.nan_knots {
            let corners = [(i, j), (i, j + 1), (i + 1, j), (i + 1, j + 1)];
            if corners.iter().any(|&corner| nan_knots[corner]) {
                return f64::NAN;
            }
        }

        let along_cols = |values: &Array2<f64>, second: &Array2<f64>, i: usize| {
            wc[0] * values[[i, j]]
                + wc[1] * values[[i, j + 1]]
                + wc[2] * second[[i, j]]
                + wc[3] * second[[i, j + 1]]
        };

        wr[0] * along_cols(&self.f, &self.f_cc, i)
            + wr[1] * along_cols(&self.f, &self.f_cc, i + 1)
            + wr[2] * along_cols(&self.f_rr, &self.f_rrcc, i)
            + wr[3] * along_cols(&self.f_rr, &self.f_rrcc, i + 1)
    }

    /// Evaluate the interpolant on the outer product of `rows` and `cols`.
    ///
    /// The result has shape `(rows.len(), cols.len())`.
    pub fn evaluate_grid(&self, rows: ArrayView1<f64>, cols: ArrayView1<f64>) -> Array2<f64> {
        let values: Vec<f64> = rows
            .to_vec()
            .par_iter()
            .flat_map_iter(|row| cols.iter().map(move |col| self.evaluate(*row, *col)))
            .collect();

        Array2::from_shape_vec((rows.len(), cols.len()), values)
            .expect("one value per grid point")
    }
}

fn assert_increasing(x: &[f64]) {
    assert!(x.len() >= 2, "need at least 2 points for interpolation");
    assert!(
        x.windows(2).all(|w| w[1] > w[0]),
        "knots must be strictly increasing"
    );
}

/// Second derivatives of the natural spline through (`x`, `y`).
///
/// Solves the tridiagonal system with the Thomas algorithm.
fn second_derivatives(x: &[f64], y: impl Iterator<Item = f64>) -> Vec<f64> {
    let y: Vec<f64> = y.collect();
    let n = x.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }

    let mut diag = vec![0.0; n];
    let mut rhs = vec![0.0; n];
    for i in 1..n - 1 {
        let h0 = x[i] - x[i - 1];
        let h1 = x[i + 1] - x[i];
        diag[i] = 2.0 * (h0 + h1);
        rhs[i] = 6.0 * ((y[i + 1] - y[i]) / h1 - (y[i] - y[i - 1]) / h0);
    }

    // Forward sweep, the sub and super diagonals are the interval widths.
    for i in 2..n - 1 {
        let h = x[i] - x[i - 1];
        let factor = h / diag[i - 1];
        diag[i] -= factor * h;
        rhs[i] -= factor * rhs[i - 1];
    }

    for i in (1..n - 1).rev() {
        let h = x[i + 1] - x[i];
        m[i] = (rhs[i] - h * m[i + 1]) / diag[i];
    }

    m
}

/// Natural spline second derivatives of every lane of `grid` along `axis`.
fn lane_second_derivatives(x: &[f64], grid: &Array2<f64>, axis: Axis) -> Array2<f64> {
    let mut out = Array2::zeros(grid.dim());
    for (lane, mut out_lane) in grid.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        let m = second_derivatives(x, lane.iter().copied());
        out_lane
            .iter_mut()
            .zip(m)
            .for_each(|(dst, value)| *dst = value);
    }
    out
}

/// Returns the interval index `i` holding `t` and the weights of
/// `y[i]`, `y[i + 1]`, `m[i]`, `m[i + 1]`.
///
/// Finite `t` is clamped to `[x[0], x[n - 1]]`. Non-finite `t` yields NaN weights.
fn weights(x: &[f64], t: f64) -> (usize, [f64; 4]) {
    if !t.is_finite() {
        return (0, [f64::NAN; 4]);
    }

    let last = x.len() - 1;
    let t = t.clamp(x[0], x[last]);
    let i = x.partition_point(|knot| *knot <= t).saturating_sub(1).min(last - 1);

    let h = x[i + 1] - x[i];
    let a = (x[i + 1] - t) / h;
    let b = 1.0 - a;
    let h2 = h * h / 6.0;
    (i, [a, b, (a * a * a - a) * h2, (b * b * b - b) * h2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array1, array};
    use quickcheck::quickcheck;
    use rstest::rstest;

    #[test]
    fn spline_passes_through_knots() {
        let x = vec![0.0, 1.0, 2.5, 3.0, 4.0];
        let y = vec![1.0, -2.0, 0.5, 4.0, 3.0];
        let spline = CubicSpline::new(x.clone(), y.clone());

        for (xi, yi) in x.iter().zip(y) {
            assert_relative_eq!(spline.evaluate(*xi), yi, epsilon = 1e-12);
        }
    }

    #[rstest]
    #[case(0.25)]
    #[case(1.5)]
    #[case(3.75)]
    fn spline_reproduces_lines(#[case] t: f64) {
        let x: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 2.0 * x - 1.0).collect();
        let spline = CubicSpline::new(x, y);

        assert_relative_eq!(spline.evaluate(t), 2.0 * t - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn spline_clamps_outside_knots() {
        let spline = CubicSpline::new(vec![0.0, 1.0, 2.0], vec![3.0, 5.0, 4.0]);
        assert_eq!(spline.evaluate(-10.0), 3.0);
        assert_eq!(spline.evaluate(10.0), 4.0);
    }

    #[test]
    fn spline_propagates_non_finite() {
        let spline = CubicSpline::new(vec![0.0, 1.0, 2.0], vec![3.0, 5.0, 4.0]);
        assert!(spline.evaluate(f64::NAN).is_nan());
        assert!(spline.evaluate(f64::INFINITY).is_nan());
    }

    #[test]
    #[should_panic]
    fn spline_rejects_unsorted_knots() {
        CubicSpline::new(vec![0.0, 2.0, 1.0], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn bicubic_passes_through_grid() {
        let grid = array![[1.0, 2.0, 0.0, 1.0], [3.0, -1.0, 2.0, 5.0], [0.5, 0.0, 1.0, 2.0]];
        let rows = vec![-1.0, 0.0, 1.0];
        let cols = vec![-1.5, -0.5, 0.5, 1.5];
        let spline = BicubicSpline::new(rows.clone(), cols.clone(), grid.clone());

        for (i, row) in rows.iter().enumerate() {
            for (j, col) in cols.iter().enumerate() {
                assert_relative_eq!(spline.evaluate(*row, *col), grid[[i, j]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn bicubic_reproduces_bilinear_surface() {
        let rows: Vec<f64> = (0..5).map(|i| i as f64 * 0.5).collect();
        let cols: Vec<f64> = (0..7).map(|j| j as f64 * 0.25).collect();
        let surface = |r: f64, c: f64| 1.0 + 2.0 * r - 3.0 * c + 0.5 * r * c;
        let grid = Array2::from_shape_fn((rows.len(), cols.len()), |(i, j)| {
            surface(rows[i], cols[j])
        });
        let spline = BicubicSpline::new(rows, cols, grid);

        for (r, c) in [(0.3, 0.1), (1.7, 1.4), (0.9, 0.77)] {
            assert_relative_eq!(spline.evaluate(r, c), surface(r, c), epsilon = 1e-12);
        }
    }

    #[test]
    fn evaluate_grid_matches_pointwise() {
        let grid = Array2::from_shape_fn((6, 5), |(i, j)| ((i * 7 + j * 3) % 5) as f64);
        let spline = BicubicSpline::new(
            (0..6).map(|i| i as f64).collect(),
            (0..5).map(|j| j as f64).collect(),
            grid,
        );
        let rows = Array1::from(vec![0.2, 2.5, 4.9]);
        let cols = Array1::from(vec![0.1, 3.3]);
        let values = spline.evaluate_grid(rows.view(), cols.view());

        assert_eq!(values.dim(), (3, 2));
        for (i, r) in rows.iter().enumerate() {
            for (j, c) in cols.iter().enumerate() {
                assert_eq!(values[[i, j]], spline.evaluate(*r, *c));
            }
        }
    }

    #[test]
    fn nan_knot_taints_only_its_cells() {
        let mut grid = Array2::from_elem((6, 6), 2.0);
        grid[[1, 1]] = f64::NAN;
        let axis: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let spline = BicubicSpline::new(axis.clone(), axis, grid);

        for (r, c) in [(0.5, 0.5), (1.0, 1.0), (1.5, 1.5), (0.2, 1.8)] {
            assert!(spline.evaluate(r, c).is_nan(), "({r}, {c}) should be NaN");
        }
        for (r, c) in [(3.0, 3.0), (4.5, 0.5), (0.5, 4.5), (2.5, 2.5)] {
            assert!(spline.evaluate(r, c).is_finite(), "({r}, {c}) should be finite");
        }
        assert_relative_eq!(spline.evaluate(5.0, 5.0), 2.0, epsilon = 1e-12);
    }

    quickcheck! {
        fn bicubic_constant_grid_is_constant(value: i16, r_seed: u8, c_seed: u8) -> bool {
            let value = value as f64 / 100.0;
            let spline = BicubicSpline::new(
                vec![-2.0, -1.0, 0.0, 1.0, 2.0],
                vec![-1.0, 0.0, 1.0, 2.0],
                Array2::from_elem((5, 4), value),
            );
            let r = r_seed as f64 / u8::MAX as f64 * 6.0 - 3.0;
            let c = c_seed as f64 / u8::MAX as f64 * 4.0 - 1.5;

            (spline.evaluate(r, c) - value).abs() <= 1e-12 * value.abs().max(1.0)
        }
    }
}
