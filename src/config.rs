use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Directory searched for PRF calibration files when none is configured.
pub const DEFAULT_CALIBRATION_DIR: &str = "data/prf";

/// Environment variable that overrides [`DEFAULT_CALIBRATION_DIR`] in [`PrfConfig::from_env`].
pub const CALIBRATION_DIR_ENV: &str = "PRFIT_CALIBRATION_DIR";

/// Number of calibration samples stored in each Kepler PRF file.
pub const DEFAULT_SAMPLES_PER_FILE: usize = 5;

/// Smallest distance used to weight a calibration sample.
pub const DEFAULT_MIN_WEIGHT: f64 = 1e-6;

/// Selects how a non-zero rotation is applied to the pixel offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RotationMode {
    /// Rotate every pixel offset by the full rotation matrix.
    #[default]
    Exact,

    /// Ignore the rotation and query the kernel at the unrotated offsets.
    ///
    /// Kept for comparison with fits produced by the Kepler pipeline tools,
    /// where the rotation parameter has no effect on the model.
    Reference,
}

/// Construction-time options for a [`crate::prf::PrfModel`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrfConfig {
    /// Directory holding the `kplr*_prf.fits` calibration files.
    pub calibration_dir: PathBuf,

    /// Number of image extensions read from each calibration file.
    pub samples_per_file: usize,

    /// Floor applied to the distance between the target and a sample.
    pub min_weight: f64,

    pub rotation_mode: RotationMode,
}

impl Default for PrfConfig {
    fn default() -> Self {
        Self {
            calibration_dir: PathBuf::from(DEFAULT_CALIBRATION_DIR),
            samples_per_file: DEFAULT_SAMPLES_PER_FILE,
            min_weight: DEFAULT_MIN_WEIGHT,
            rotation_mode: RotationMode::default(),
        }
    }
}

impl PrfConfig {
    /// Create a default config, taking the calibration directory from
    /// `PRFIT_CALIBRATION_DIR` if it is set.
    pub fn from_env() -> Self {
        match std::env::var_os(CALIBRATION_DIR_ENV) {
            Some(dir) => Self::default().with_calibration_dir(dir),
            None => Self::default(),
        }
    }

    pub fn with_calibration_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.calibration_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_samples_per_file(mut self, samples_per_file: usize) -> Self {
        self.samples_per_file = samples_per_file;
        self
    }

    pub fn with_min_weight(mut self, min_weight: f64) -> Self {
        self.min_weight = min_weight;
        self
    }

    pub fn with_rotation_mode(mut self, rotation_mode: RotationMode) -> Self {
        self.rotation_mode = rotation_mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_kepler_files() {
        let config = PrfConfig::default();
        assert_eq!(config.samples_per_file, 5);
        assert_eq!(config.min_weight, 1e-6);
        assert_eq!(config.calibration_dir, PathBuf::from(DEFAULT_CALIBRATION_DIR));
        assert_eq!(config.rotation_mode, RotationMode::Exact);
    }

    #[test]
    fn builders_override_fields() {
        let config = PrfConfig::default()
            .with_calibration_dir("/tmp/prf")
            .with_samples_per_file(3)
            .with_rotation_mode(RotationMode::Reference);

        assert_eq!(config.calibration_dir, PathBuf::from("/tmp/prf"));
        assert_eq!(config.samples_per_file, 3);
        assert_eq!(config.rotation_mode, RotationMode::Reference);
    }
}
