use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use log::{LevelFilter, error};

use dicom_reconstruct::{
    BatchConfig, BatchOrchestrator, DicomDirectorySource, Interpolation, ReconstructionConfig,
    Rotation, SortBy, SpacingMode,
    config::{DEFAULT_BACKGROUND, DEFAULT_MIN_SLICES, DEFAULT_WORKERS},
};

/// Reconstruct tilt-corrected, centroid-cropped volumes for every scan under a data root
#[derive(Parser, Debug)]
#[command(name = "dicom-reconstruct")]
#[command(version)]
struct Cli {
    /// Directory holding one sub-directory per collection
    #[arg(value_name = "DATA_ROOT")]
    data_root: PathBuf,

    /// Collections to scan for `<collection>/<scan>/<source-marker>` directories
    #[arg(short, long, value_delimiter = ',', default_value = "train,test")]
    collections: Vec<String>,

    /// Output spacing: `auto`, `none` or `x,y,z` in mm
    #[arg(short, long, default_value = "none")]
    spacing: SpacingMode,

    /// Number of scans processed concurrently
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Output height in voxels
    #[arg(long, default_value_t = 400)]
    height: usize,

    /// Output width in voxels
    #[arg(long, default_value_t = 400)]
    width: usize,

    /// Intensity written outside the field of view
    #[arg(long, default_value_t = DEFAULT_BACKGROUND, allow_negative_numbers = true)]
    background: f32,

    /// Series with fewer reconstructed slices are rejected
    #[arg(long, default_value_t = DEFAULT_MIN_SLICES)]
    min_slices: usize,

    /// Rotation around the vertical axis in degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    angle_z: f64,

    /// Rotation around the horizontal axis in degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    angle_y: f64,

    /// Horizontal voxel index to move to the middle of the volume
    #[arg(long)]
    center_x: Option<f64>,

    /// Interpolation kernel
    #[arg(long, default_value = "cubic")]
    interpolation: InterpolationArg,

    /// Slice stacking order
    #[arg(long, default_value = "position")]
    sort_by: SortByArg,

    /// Path component naming a scan's DICOM directory
    #[arg(long, default_value = "dicom")]
    source_marker: String,

    /// Replacement for the source marker in output paths
    #[arg(long, default_value = "3d")]
    output_marker: String,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, ValueEnum)]
enum InterpolationArg {
    Linear,
    Cubic,
}

impl From<InterpolationArg> for Interpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::Linear => Interpolation::Linear,
            InterpolationArg::Cubic => Interpolation::Cubic,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum SortByArg {
    /// Position along the slice normal
    Position,
    InstanceNumber,
    /// Directory order
    None,
}

impl From<SortByArg> for SortBy {
    fn from(arg: SortByArg) -> Self {
        match arg {
            SortByArg::Position => SortBy::ImagePositionPatient,
            SortByArg::InstanceNumber => SortBy::InstanceNumber,
            SortByArg::None => SortBy::None,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if !cli.data_root.is_dir() {
        eprintln!("Error: {} is not a directory", cli.data_root.display());
        process::exit(1);
    }

    let sort_by: SortBy = cli.sort_by.into();
    let config = ReconstructionConfig::default()
        .with_footprint(cli.height, cli.width)
        .with_background(cli.background)
        .with_spacing(cli.spacing)
        .with_min_slices(cli.min_slices)
        .with_interpolation(cli.interpolation.into())
        .with_rotation(Rotation::new(cli.angle_z, cli.angle_y))
        .with_center_x(cli.center_x);
    let batch = BatchConfig::new(cli.data_root)
        .with_collections(cli.collections)
        .with_markers(cli.source_marker, cli.output_marker)
        .with_workers(cli.workers)
        .with_progress(!cli.quiet);

    let orchestrator = BatchOrchestrator::new(batch, config, DicomDirectorySource { sort_by });
    match orchestrator.run() {
        Ok((_, summary)) if summary.failures.is_empty() => {}
        Ok((_, summary)) => {
            eprintln!(
                "{} of {} scans failed",
                summary.failures.len(),
                summary.total
            );
            process::exit(2);
        }
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}
