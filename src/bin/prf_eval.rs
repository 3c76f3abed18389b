use clap::{Parser, ValueEnum};
use log::info;
use prfit::prelude::*;
use serde_json::json;
use std::path::PathBuf;

#[derive(Clone, Copy, ValueEnum)]
enum Rotation {
    Exact,
    Reference,
}

impl From<Rotation> for RotationMode {
    fn from(rotation: Rotation) -> Self {
        match rotation {
            Rotation::Exact => RotationMode::Exact,
            Rotation::Reference => RotationMode::Reference,
        }
    }
}

/// Evaluate the Kepler PRF of a target and print the model grid as JSON.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(long)]
    channel: u32,

    #[arg(long)]
    rows: usize,

    #[arg(long)]
    cols: usize,

    /// Detector column of the lower-left pixel.
    #[arg(long)]
    column: f64,

    /// Detector row of the lower-left pixel.
    #[arg(long)]
    row: f64,

    /// Directory holding the `kplr*_prf.fits` files, defaults to $PRFIT_CALIBRATION_DIR.
    #[arg(long)]
    calibration_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 1.0)]
    flux: f64,

    #[arg(long)]
    centroid_col: f64,

    #[arg(long)]
    centroid_row: f64,

    #[arg(long, default_value_t = 1.0)]
    stretch_col: f64,

    #[arg(long, default_value_t = 1.0)]
    stretch_row: f64,

    /// Rotation in radians.
    #[arg(long, default_value_t = 0.0)]
    rotation: f64,

    #[arg(long, value_enum, default_value_t = Rotation::Exact)]
    rotation_mode: Rotation,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = PrfConfig::from_env().with_rotation_mode(args.rotation_mode.into());
    if let Some(dir) = &args.calibration_dir {
        config = config.with_calibration_dir(dir);
    }

    let footprint = Footprint::new(args.column, args.row, args.rows, args.cols);
    let prf = PrfModel::new(args.channel, footprint, &config)?;
    info!("kernel integral is {}", prf.integral());

    let image = prf.evaluate(
        args.flux,
        args.centroid_col,
        args.centroid_row,
        args.stretch_col,
        args.stretch_row,
        args.rotation,
    );
    let grid: Vec<Vec<f64>> = image.outer_iter().map(|row| row.to_vec()).collect();

    let output = json!({
        "channel": args.channel,
        "shape": [args.rows, args.cols],
        "partial_coverage": prf.has_partial_coverage(),
        "total": image.sum(),
        "grid": grid,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
