use ndarray::Array2;
use prfit::{Error, prelude::*};
use rstest::rstest;
use tempfile::TempDir;

mod common;
use common::{write_calibration_file, write_calibration_file_without};

/// Five distinct 6x4 samples at the corners and center of an output.
fn samples() -> Vec<CalibrationSample> {
    [(12.0, 20.0), (1100.0, 20.0), (12.0, 1024.0), (1100.0, 1024.0), (556.0, 522.0)]
        .into_iter()
        .enumerate()
        .map(|(k, (col, row))| {
            let grid = Array2::from_shape_fn((6, 4), |(i, j)| (k * 100 + i * 4 + j) as f64);
            CalibrationSample::new(grid, col, row, 0.25 + k as f64 * 0.0625, 0.5)
        })
        .collect()
}

#[test]
fn headers_round_trip() {
    let dir = TempDir::new().unwrap();
    let written = samples();
    write_calibration_file(&dir.path().join("kplr13.2_2011265_prf.fits"), &written);

    let loaded = FitsCalibrationLoader::new(dir.path(), 5).load(42).unwrap();

    assert_eq!(loaded, written);
}

#[rstest]
#[case(1, "kplr02.1_2011265_prf.fits")]
#[case(42, "kplr13.2_2011265_prf.fits")]
#[case(84, "kplr24.4_2011265_prf.fits")]
fn channel_selects_file(#[case] channel: u32, #[case] name: &str) {
    let dir = TempDir::new().unwrap();
    write_calibration_file(&dir.path().join(name), &samples());

    let loader = FitsCalibrationLoader::new(dir.path(), 5);
    assert_eq!(loader.resolve(channel).unwrap(), dir.path().join(name));
}

#[rstest]
#[case("prf[2011]")]
#[case("prf*")]
#[case("prf?v2")]
fn directory_name_is_matched_literally(#[case] name: &str) {
    let root = TempDir::new().unwrap();
    let dir = root.path().join(name);
    std::fs::create_dir(&dir).unwrap();
    write_calibration_file(&dir.join("kplr13.2_2011265_prf.fits"), &samples());

    let loaded = FitsCalibrationLoader::new(&dir, 5).load(42).unwrap();
    assert_eq!(loaded, samples());
}

#[test]
fn first_file_in_lexical_order_wins() {
    let dir = TempDir::new().unwrap();
    let mut late = samples();
    late.reverse();
    write_calibration_file(&dir.path().join("kplr13.2_2011265_prf.fits"), &late);
    write_calibration_file(&dir.path().join("kplr13.2_2009114_prf.fits"), &samples());

    let loaded = FitsCalibrationLoader::new(dir.path(), 5).load(42).unwrap();
    assert_eq!(loaded, samples());
}

#[test]
fn too_few_extensions_is_a_format_error() {
    let dir = TempDir::new().unwrap();
    write_calibration_file(&dir.path().join("kplr13.2_2011265_prf.fits"), &samples()[..3]);

    let result = FitsCalibrationLoader::new(dir.path(), 5).load(42);
    assert!(matches!(result, Err(Error::CalibrationFormat { .. })));
}

#[test]
fn fewer_samples_can_be_configured() {
    let dir = TempDir::new().unwrap();
    write_calibration_file(&dir.path().join("kplr13.2_2011265_prf.fits"), &samples()[..3]);

    let loaded = FitsCalibrationLoader::new(dir.path(), 3).load(42).unwrap();
    assert_eq!(loaded, samples()[..3].to_vec());
}

#[rstest]
#[case("CRVAL1P")]
#[case("CRVAL2P")]
#[case("CDELT1P")]
#[case("CDELT2P")]
fn missing_header_is_a_format_error(#[case] key: &str) {
    let dir = TempDir::new().unwrap();
    write_calibration_file_without(
        &dir.path().join("kplr13.2_2011265_prf.fits"),
        &samples(),
        Some(key),
    );

    match FitsCalibrationLoader::new(dir.path(), 5).load(42) {
        Err(Error::CalibrationFormat { reason, .. }) => assert!(reason.contains(key)),
        other => panic!("expected a format error, got {other:?}"),
    }
}

#[test]
fn missing_file_reports_pattern() {
    let dir = TempDir::new().unwrap();
    write_calibration_file(&dir.path().join("kplr13.1_2011265_prf.fits"), &samples());

    match FitsCalibrationLoader::new(dir.path(), 5).load(42) {
        Err(Error::CalibrationNotFound { pattern }) => {
            assert!(pattern.ends_with("kplr13.2*_prf.fits"))
        }
        other => panic!("expected a missing file, got {other:?}"),
    }
}

#[test]
fn invalid_channel_is_rejected_before_io() {
    let result = FitsCalibrationLoader::new("/nonexistent", 5).load(85);
    assert!(matches!(result, Err(Error::InvalidChannel { channel: 85 })));
}
