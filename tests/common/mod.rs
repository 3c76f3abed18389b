#![allow(dead_code)]

use fitsio::FitsFile;
use fitsio::images::{ImageDescription, ImageType};
use ndarray::Array2;
use prfit::calibration::CalibrationSample;
use std::path::Path;

pub const HEADER_KEYS: [&str; 4] = ["CRVAL1P", "CRVAL2P", "CDELT1P", "CDELT2P"];

/// Write `samples` as the image extensions of a Kepler PRF file at `path`.
pub fn write_calibration_file(path: &Path, samples: &[CalibrationSample]) {
    write_calibration_file_without(path, samples, None);
}

/// Like [`write_calibration_file`], leaving the header `skip` out of every extension.
pub fn write_calibration_file_without(
    path: &Path,
    samples: &[CalibrationSample],
    skip: Option<&str>,
) {
    let mut fptr = FitsFile::create(path).overwrite().open().unwrap();

    for (index, sample) in samples.iter().enumerate() {
        let (rows, cols) = sample.grid().dim();
        let description = ImageDescription {
            data_type: ImageType::Double,
            dimensions: &[rows, cols],
        };
        let hdu = fptr
            .create_image(format!("PRF{}", index + 1), &description)
            .unwrap();

        let pixels: Vec<f64> = sample.grid().iter().copied().collect();
        hdu.write_image(&mut fptr, &pixels).unwrap();

        let values = [
            sample.ref_col(),
            sample.ref_row(),
            sample.pixel_scale_col(),
            sample.pixel_scale_row(),
        ];
        for (key, value) in HEADER_KEYS.into_iter().zip(values) {
            if Some(key) != skip {
                hdu.write_key(&mut fptr, key, value).unwrap();
            }
        }
    }
}

/// A sample of constant `value` on a `size` x `size` grid.
pub fn uniform_sample(size: usize, value: f64, ref_col: f64, ref_row: f64, scale: f64) -> CalibrationSample {
    CalibrationSample::new(Array2::from_elem((size, size), value), ref_col, ref_row, scale, scale)
}

/// A circular Gaussian spot of width `sigma` pixels on a `size` x `size` grid.
pub fn gaussian_sample(size: usize, sigma: f64, ref_col: f64, ref_row: f64, scale: f64) -> CalibrationSample {
    let center = size as f64 / 2.0 - 0.5;
    let grid = Array2::from_shape_fn((size, size), |(i, j)| {
        let r = (i as f64 - center) * scale;
        let c = (j as f64 - center) * scale;
        (-(r * r + c * c) / (2.0 * sigma * sigma)).exp()
    });
    CalibrationSample::new(grid, ref_col, ref_row, scale, scale)
}
