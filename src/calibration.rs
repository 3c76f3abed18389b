//! Load PRF calibration samples.
//!
//! A Kepler PRF calibration file holds one image extension per sub-region of
//! the CCD output. Each extension is a finely sampled PRF image together with
//! the detector position it was measured at (`CRVAL1P`, `CRVAL2P`) and the
//! size of one PRF sample in detector pixels (`CDELT1P`, `CDELT2P`).

use std::path::{Path, PathBuf};

use fitsio::FitsFile;
use fitsio::hdu::HduInfo;
use log::{debug, info};
use ndarray::Array2;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channel::{calibration_pattern, channel_to_module_output};
use crate::config::PrfConfig;
use crate::error::{Error, Result};

/// Header holding the detector column a sample was measured at.
const REF_COL_KEY: &str = "CRVAL1P";
/// Header holding the detector row a sample was measured at.
const REF_ROW_KEY: &str = "CRVAL2P";
/// Header holding the column size of one PRF sample in detector pixels.
const SCALE_COL_KEY: &str = "CDELT1P";
/// Header holding the row size of one PRF sample in detector pixels.
const SCALE_ROW_KEY: &str = "CDELT2P";

/// One measured PRF image and the detector position it belongs to.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationSample {
    grid: Array2<f64>,
    ref_col: f64,
    ref_row: f64,
    pixel_scale_col: f64,
    pixel_scale_row: f64,
}

impl CalibrationSample {
    /// Create a new `CalibrationSample` from a row-major `grid` measured at
    /// (`ref_col`, `ref_row`).
    pub fn new(
        grid: Array2<f64>,
        ref_col: f64,
        ref_row: f64,
        pixel_scale_col: f64,
        pixel_scale_row: f64,
    ) -> Self {
        Self {
            grid,
            ref_col,
            ref_row,
            pixel_scale_col,
            pixel_scale_row,
        }
    }

    pub fn grid(&self) -> &Array2<f64> {
        &self.grid
    }

    pub fn ref_col(&self) -> f64 {
        self.ref_col
    }

    pub fn ref_row(&self) -> f64 {
        self.ref_row
    }

    pub fn pixel_scale_col(&self) -> f64 {
        self.pixel_scale_col
    }

    pub fn pixel_scale_row(&self) -> f64 {
        self.pixel_scale_row
    }

    /// Distance in detector pixels from this sample to (`col`, `row`), floored at `min`.
    pub fn weight(&self, col: f64, row: f64, min: f64) -> f64 {
        let distance = (col - self.ref_col).hypot(row - self.ref_row);
        match distance < min {
            true => min,
            false => distance,
        }
    }
}

/// Provides the calibration samples of a detector channel.
pub trait CalibrationSource {
    fn load(&self, channel: u32) -> Result<Vec<CalibrationSample>>;
}

impl CalibrationSource for Vec<CalibrationSample> {
    fn load(&self, _channel: u32) -> Result<Vec<CalibrationSample>> {
        Ok(self.clone())
    }
}

/// Reads calibration samples from the Kepler PRF FITS files in a directory.
#[derive(Clone, Debug)]
pub struct FitsCalibrationLoader {
    dir: PathBuf,
    samples_per_file: usize,
}

impl FitsCalibrationLoader {
    pub fn new(dir: impl AsRef<Path>, samples_per_file: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            samples_per_file,
        }
    }

    pub fn from_config(config: &PrfConfig) -> Self {
        Self::new(&config.calibration_dir, config.samples_per_file)
    }

    /// Returns the calibration file holding the samples of `channel`.
    ///
    /// If several files match, the first in lexical order is used.
    pub fn resolve(&self, channel: u32) -> Result<PathBuf> {
        let (module, output) = channel_to_module_output(channel)?;
        let dir = glob::Pattern::escape(&self.dir.to_string_lossy());
        let pattern = calibration_pattern(dir, module, output)
            .to_string_lossy()
            .into_owned();

        let mut matches: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(|p| p.ok()).collect();
        matches.sort();
        matches
            .into_iter()
            .next()
            .ok_or(Error::CalibrationNotFound { pattern })
    }

    /// Read the first `samples_per_file` image extensions of the file at `path`.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<Vec<CalibrationSample>> {
        let path = path.as_ref();
        let mut fptr = FitsFile::open(path).map_err(|source| Error::Fits {
            path: path.to_path_buf(),
            source,
        })?;

        // Extension 0 is the primary header.
        (1..=self.samples_per_file)
            .map(|ext| read_sample(&mut fptr, path, ext))
            .collect()
    }
}

impl CalibrationSource for FitsCalibrationLoader {
    fn load(&self, channel: u32) -> Result<Vec<CalibrationSample>> {
        let path = self.resolve(channel)?;
        info!("loading PRF calibration for channel {channel} from {}", path.display());
        self.read_file(path)
    }
}

fn read_sample(fptr: &mut FitsFile, path: &Path, ext: usize) -> Result<CalibrationSample> {
    let format_error = |reason: String| Error::CalibrationFormat {
        path: path.to_path_buf(),
        reason,
    };

    let hdu = fptr
        .hdu(ext)
        .map_err(|err| format_error(format!("missing extension {ext}: {err}")))?;

    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } if shape.len() == 2 => (shape[0], shape[1]),
        HduInfo::ImageInfo { shape, .. } => {
            return Err(format_error(format!(
                "extension {ext} has {} axes, expected 2",
                shape.len()
            )));
        }
        _ => return Err(format_error(format!("extension {ext} is not an image"))),
    };

    let pixels: Vec<f64> = hdu.read_image(fptr).map_err(|source| Error::Fits {
        path: path.to_path_buf(),
        source,
    })?;
    let grid = Array2::from_shape_vec(shape, pixels)
        .map_err(|err| format_error(format!("extension {ext}: {err}")))?;

    let mut header = [0.0; 4];
    for (value, key) in header
        .iter_mut()
        .zip([REF_COL_KEY, REF_ROW_KEY, SCALE_COL_KEY, SCALE_ROW_KEY])
    {
        *value = hdu
            .read_key::<f64>(fptr, key)
            .map_err(|_| format_error(format!("extension {ext} has no {key} header")))?;
    }
    let [ref_col, ref_row, pixel_scale_col, pixel_scale_row] = header;
    let sample = CalibrationSample::new(grid, ref_col, ref_row, pixel_scale_col, pixel_scale_row);

    debug!(
        "extension {ext}: {}x{} samples at col={} row={} scale=({}, {})",
        sample.grid.nrows(),
        sample.grid.ncols(),
        sample.ref_col,
        sample.ref_row,
        sample.pixel_scale_col,
        sample.pixel_scale_row,
    );

    Ok(sample)
}
