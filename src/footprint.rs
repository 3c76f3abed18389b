use ndarray::Array1;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The rectangular detector region covered by a target's pixels.
///
/// `column` and `row` locate the lower-left pixel on the detector. Pixel `k`
/// of the footprint spans `column + k` to `column + k + 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Footprint {
    column: f64,
    row: f64,
    rows: usize,
    cols: usize,
}

impl Footprint {
    pub fn new(column: f64, row: f64, rows: usize, cols: usize) -> Self {
        Self {
            column,
            row,
            rows,
            cols,
        }
    }

    pub fn column(&self) -> f64 {
        self.column
    }

    pub fn row(&self) -> f64 {
        self.row
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns `(rows, cols)`, the shape of a frame covering this footprint.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn pixel_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Returns the detector `(column, row)` at the geometric center of the footprint.
    pub fn reference(&self) -> (f64, f64) {
        (
            self.column + (self.cols as f64 - 1.0) / 2.0,
            self.row + (self.rows as f64 - 1.0) / 2.0,
        )
    }

    /// Detector columns of the pixel centers, increasing.
    pub fn col_axis(&self) -> Array1<f64> {
        pixel_centers(self.column, self.cols)
    }

    /// Detector rows of the pixel centers, increasing.
    pub fn row_axis(&self) -> Array1<f64> {
        pixel_centers(self.row, self.rows)
    }
}

fn pixel_centers(start: f64, len: usize) -> Array1<f64> {
    Array1::from_iter((0..len).map(|k| start + k as f64 + 0.5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    #[test]
    fn axes_are_pixel_centers() {
        let footprint = Footprint::new(100.0, 200.0, 3, 4);
        assert_eq!(footprint.col_axis().to_vec(), vec![100.5, 101.5, 102.5, 103.5]);
        assert_eq!(footprint.row_axis().to_vec(), vec![200.5, 201.5, 202.5]);
    }

    #[test]
    fn reference_is_center() {
        let footprint = Footprint::new(100.0, 200.0, 10, 10);
        assert_eq!(footprint.reference(), (104.5, 204.5));
    }

    #[quickcheck_macros::quickcheck]
    fn reference_lies_inside(rows: u8, cols: u8) -> bool {
        let footprint = Footprint::new(0.0, 0.0, rows as usize + 1, cols as usize + 1);
        let (col, row) = footprint.reference();
        (0.5..=footprint.cols() as f64).contains(&(col + 0.5))
            && (0.5..=footprint.rows() as f64).contains(&(row + 0.5))
    }

    quickcheck! {
        fn axes_match_shape(rows: u8, cols: u8, column: i16, row: i16) -> bool {
            let footprint = Footprint::new(column as f64, row as f64, rows as usize, cols as usize);
            let col_axis = footprint.col_axis();
            let row_axis = footprint.row_axis();

            col_axis.len() == footprint.cols()
                && row_axis.len() == footprint.rows()
                && col_axis.windows(2).into_iter().all(|w| w[1] > w[0])
                && row_axis.windows(2).into_iter().all(|w| w[1] > w[0])
        }
    }
}
