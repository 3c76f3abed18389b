//! Kepler focal plane layout.
//!
//! The 84 science channels are the four outputs of each of the 21 CCD modules.
//! Modules 1, 5, 21 and 25 sit in the corners of the focal plane and carry
//! fine guidance sensors rather than science CCDs.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Science modules in channel order.
const SCIENCE_MODULES: [u32; 21] = [
    2, 3, 4, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 22, 23, 24,
];

const OUTPUTS_PER_MODULE: u32 = 4;

/// Returns the `(module, output)` pair read out by `channel`.
pub fn channel_to_module_output(channel: u32) -> Result<(u32, u32)> {
    let index = channel
        .checked_sub(1)
        .filter(|index| *index < SCIENCE_MODULES.len() as u32 * OUTPUTS_PER_MODULE)
        .ok_or(Error::InvalidChannel { channel })?;

    let module = SCIENCE_MODULES[(index / OUTPUTS_PER_MODULE) as usize];
    let output = index % OUTPUTS_PER_MODULE + 1;
    Ok((module, output))
}

/// Returns the channel read out by `output` of `module`, or `None` if the
/// pair is not on a science CCD.
pub fn module_output_to_channel(module: u32, output: u32) -> Option<u32> {
    if !(1..=OUTPUTS_PER_MODULE).contains(&output) {
        return None;
    }

    let position = SCIENCE_MODULES.iter().position(|m| *m == module)? as u32;
    Some(position * OUTPUTS_PER_MODULE + output)
}

/// Glob pattern matching the PRF calibration file of `module` and `output` in `dir`.
///
/// Calibration files are named `kplrMM.O_<date>_prf.fits` with a zero padded module.
pub fn calibration_pattern(dir: impl AsRef<Path>, module: u32, output: u32) -> PathBuf {
    dir.as_ref()
        .join(format!("kplr{module:02}.{output}*_prf.fits"))
}
