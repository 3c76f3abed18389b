//! The Kepler pixel response function at a target's position.
//!
//! A calibration file measures the PRF at a handful of places on a CCD
//! output. [`PrfModel`] blends those measurements into one kernel for the
//! target's footprint, weighting each sample by the inverse of its distance
//! from the footprint center, and normalizes the kernel to unit integral.
//! The kernel is then interpolated with a bicubic spline so it can be shifted,
//! stretched and rotated onto the footprint's pixels.

use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::calibration::{CalibrationSample, CalibrationSource, FitsCalibrationLoader};
use crate::config::{PrfConfig, RotationMode};
use crate::error::{Error, Result};
use crate::footprint::Footprint;
use crate::spline::BicubicSpline;

/// A normalized PRF kernel anchored to a target footprint.
#[derive(Clone, Debug)]
pub struct PrfModel {
    footprint: Footprint,
    fused_grid: Array2<f64>,
    prf_col: Array1<f64>,
    prf_row: Array1<f64>,
    col_axis: Array1<f64>,
    row_axis: Array1<f64>,
    interpolant: BicubicSpline,
    weights: Vec<f64>,
    pixel_scale_col: f64,
    pixel_scale_row: f64,
    rotation_mode: RotationMode,
}

impl PrfModel {
    /// Build the PRF of `channel` for `footprint` from the calibration files
    /// in `config.calibration_dir`.
    pub fn new(channel: u32, footprint: Footprint, config: &PrfConfig) -> Result<Self> {
        Self::from_source(
            &FitsCalibrationLoader::from_config(config),
            channel,
            footprint,
            config,
        )
    }

    /// Build the PRF of `channel` for `footprint` from the samples provided by `source`.
    pub fn from_source(
        source: &impl CalibrationSource,
        channel: u32,
        footprint: Footprint,
        config: &PrfConfig,
    ) -> Result<Self> {
        Self::from_samples(source.load(channel)?, footprint, config)
    }

    /// Fuse `samples` into a PRF for `footprint`.
    ///
    /// Every sample must have the grid shape of the first one. The pixel
    /// scale of the first sample is used for the whole kernel.
    pub fn from_samples(
        samples: Vec<CalibrationSample>,
        footprint: Footprint,
        config: &PrfConfig,
    ) -> Result<Self> {
        if samples.is_empty() || samples.len() != config.samples_per_file {
            return Err(Error::SampleCount {
                expected: config.samples_per_file,
                got: samples.len(),
            });
        }
        if footprint.pixel_count() == 0 {
            return Err(Error::EmptyFootprint {
                rows: footprint.rows(),
                cols: footprint.cols(),
            });
        }
        validate_samples(&samples)?;

        let first = &samples[0];
        let pixel_scale_col = first.pixel_scale_col();
        let pixel_scale_row = first.pixel_scale_row();
        let prf_col = kernel_axis(first.grid().ncols(), pixel_scale_col);
        let prf_row = kernel_axis(first.grid().nrows(), pixel_scale_row);

        let (ref_col, ref_row) = footprint.reference();
        let weights: Vec<f64> = samples
            .iter()
            .map(|sample| sample.weight(ref_col, ref_row, config.min_weight))
            .collect();
        debug!("calibration sample distances from ({ref_col}, {ref_row}): {weights:?}");

        let mut fused_grid = Array2::zeros(first.grid().dim());
        for (sample, weight) in samples.iter().zip(&weights) {
            fused_grid.scaled_add(1.0 / weight, sample.grid());
        }

        let sum = nansum(&fused_grid);
        if sum == 0.0 || !sum.is_finite() {
            return Err(Error::DegenerateKernel { sum });
        }
        fused_grid /= sum * pixel_scale_col * pixel_scale_row;

        let interpolant = BicubicSpline::new(prf_row.to_vec(), prf_col.to_vec(), fused_grid.clone());

        let model = Self {
            footprint,
            col_axis: footprint.col_axis(),
            row_axis: footprint.row_axis(),
            fused_grid,
            prf_col,
            prf_row,
            interpolant,
            weights,
            pixel_scale_col,
            pixel_scale_row,
            rotation_mode: config.rotation_mode,
        };

        info!(
            "built {}x{} PRF kernel for {}x{} footprint at column={} row={}",
            model.fused_grid.nrows(),
            model.fused_grid.ncols(),
            footprint.rows(),
            footprint.cols(),
            footprint.column(),
            footprint.row(),
        );
        if model.has_partial_coverage() {
            warn!(
                "fused PRF kernel contains NaN cells, model values in the kernel cells touching them will be NaN"
            );
        }

        Ok(model)
    }

    pub fn footprint(&self) -> &Footprint {
        &self.footprint
    }

    /// Returns `(rows, cols)` of the arrays produced by [`PrfModel::evaluate`].
    pub fn shape(&self) -> (usize, usize) {
        self.footprint.shape()
    }

    /// The normalized kernel, row-major, one cell per PRF sample.
    pub fn fused_grid(&self) -> &Array2<f64> {
        &self.fused_grid
    }

    /// Kernel column offsets in detector pixels, centered on zero.
    pub fn prf_col(&self) -> &Array1<f64> {
        &self.prf_col
    }

    /// Kernel row offsets in detector pixels, centered on zero.
    pub fn prf_row(&self) -> &Array1<f64> {
        &self.prf_row
    }

    /// Detector columns of the footprint's pixel centers.
    pub fn col_axis(&self) -> &Array1<f64> {
        &self.col_axis
    }

    /// Detector rows of the footprint's pixel centers.
    pub fn row_axis(&self) -> &Array1<f64> {
        &self.row_axis
    }

    /// Distance of each calibration sample from the footprint center, after flooring.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn pixel_scale_col(&self) -> f64 {
        self.pixel_scale_col
    }

    pub fn pixel_scale_row(&self) -> f64 {
        self.pixel_scale_row
    }

    pub fn rotation_mode(&self) -> RotationMode {
        self.rotation_mode
    }

    /// Integral of the kernel over its extent, ignoring NaN cells.
    pub fn integral(&self) -> f64 {
        nansum(&self.fused_grid) * self.pixel_scale_col * self.pixel_scale_row
    }

    /// Returns `true` if any kernel cell is NaN.
    ///
    /// NaN cells are left in place by the normalization. The interpolant is
    /// NaN inside every kernel cell with a NaN corner and finite elsewhere.
    pub fn has_partial_coverage(&self) -> bool {
        self.fused_grid.iter().any(|value| value.is_nan())
    }

    /// Kernel value at an offset of (`row`, `col`) detector pixels from the source.
    pub fn interpolate(&self, row: f64, col: f64) -> f64 {
        self.interpolant.evaluate(row, col)
    }

    /// Project a source onto the footprint's pixels.
    ///
    /// Returns an array of shape [`PrfModel::shape`] holding the flux of a
    /// source of total `flux` centered at detector (`centroid_col`,
    /// `centroid_row`). The kernel is stretched by `stretch_col` and
    /// `stretch_row`. Under [`RotationMode::Exact`] it is also rotated by
    /// `rotation` radians; under [`RotationMode::Reference`] `rotation` is
    /// ignored. Non-finite inputs produce non-finite values.
    pub fn evaluate(
        &self,
        flux: f64,
        centroid_col: f64,
        centroid_row: f64,
        stretch_col: f64,
        stretch_row: f64,
        rotation: f64,
    ) -> Array2<f64> {
        let delta_col = &self.col_axis - centroid_col;
        let delta_row = &self.row_axis - centroid_row;

        let model = match (self.rotation_mode, rotation) {
            (RotationMode::Exact, rotation) if rotation != 0.0 => {
                let (sin, cos) = rotation.sin_cos();
                self.rotated_grid(&delta_col, &delta_row, sin, cos, stretch_col, stretch_row)
            }
            _ => self.interpolant.evaluate_grid(
                (delta_row * stretch_row).view(),
                (delta_col * stretch_col).view(),
            ),
        };

        model * flux
    }

    /// Shorthand for [`PrfModel::evaluate`] without stretch or rotation.
    pub fn evaluate_centred(&self, flux: f64, centroid_col: f64, centroid_row: f64) -> Array2<f64> {
        self.evaluate(flux, centroid_col, centroid_row, 1.0, 1.0, 0.0)
    }

    fn rotated_grid(
        &self,
        delta_col: &Array1<f64>,
        delta_row: &Array1<f64>,
        sin: f64,
        cos: f64,
        stretch_col: f64,
        stretch_row: f64,
    ) -> Array2<f64> {
        let values: Vec<f64> = delta_row
            .to_vec()
            .par_iter()
            .flat_map_iter(|dr| {
                delta_col.iter().map(move |dc| {
                    let rot_col = dc * cos - dr * sin;
                    let rot_row = dc * sin + dr * cos;
                    self.interpolant
                        .evaluate(rot_row * stretch_row, rot_col * stretch_col)
                })
            })
            .collect();

        Array2::from_shape_vec(self.shape(), values).expect("one value per footprint pixel")
    }
}

/// Offsets of `len` kernel cells spaced by `scale`, centered on zero.
fn kernel_axis(len: usize, scale: f64) -> Array1<f64> {
    Array1::from_iter((0..len).map(|k| (k as f64 + 0.5 - len as f64 / 2.0) * scale))
}

fn nansum(grid: &Array2<f64>) -> f64 {
    grid.iter().filter(|value| !value.is_nan()).sum()
}

fn validate_samples(samples: &[CalibrationSample]) -> Result<()> {
    let dim = samples[0].grid().dim();
    for (index, sample) in samples.iter().enumerate() {
        let reason = if sample.grid().dim() != dim {
            Some(format!(
                "grid shape {:?} differs from the first sample's {:?}",
                sample.grid().dim(),
                dim
            ))
        } else if dim.0 < 2 || dim.1 < 2 {
            Some(format!("grid shape {dim:?} is too small to interpolate"))
        } else if ![sample.pixel_scale_col(), sample.pixel_scale_row()]
            .iter()
            .all(|scale| scale.is_finite() && *scale > 0.0)
        {
            Some(format!(
                "pixel scale ({}, {}) is not finite and positive",
                sample.pixel_scale_col(),
                sample.pixel_scale_row()
            ))
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(Error::InvalidSample { index, reason });
        }
    }
    Ok(())
}
