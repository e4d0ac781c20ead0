//! # DICOM-reconstruct library
//!
//! This crate turns raw axial CT series into geometrically corrected,
//! normalized volumes and does so for whole collections of scans at once.
//!
//! It builds on the dicom-rs ecosystem to read a directory of DICOM files as
//! one series. Every series then passes through the same steps:
//!  - Gantry tilt is derived from the image orientation and compensated with
//!    a shear. Non-axial series are rejected before any geometry is built.
//!  - The series is resliced with cubic interpolation, optionally rotated and
//!    re-centred, and optionally resampled to isotropic or explicit spacing.
//!  - The volume is cropped or padded to a fixed footprint centred on the
//!    tissue centroid.
//!  - Slices are written as `.npy` arrays of `i16`, one file per slice.
//!
//! A batch runs each scan as one task on a bounded rayon pool. A failing scan
//! is logged and reported in the summary without stopping the others.
//!
//! DICOM files are assumed to have the following attributes:
//!   - Axial data set, possibly acquired with gantry tilt
//!   - No multiframe (always the first frame is used)
//!   - Images from the same series (Series Instance UID) and acquisition
//!
//! # Examples
//!
//! ## Reconstructing a single series
//!
//! ```no_run
//! # use dicom_reconstruct::{DicomDirectorySource, ReconstructionConfig, ScanPipeline};
//! # use std::path::Path;
//! let config = ReconstructionConfig::default();
//! let source = DicomDirectorySource::default();
//! let volume = ScanPipeline::new(&source, &config)
//!     .reconstruct(Path::new("train/ID_0001/dicom"))
//!     .expect("should have reconstructed the series");
//! assert_eq!(volume.volume().dim().1, 400);
//! ```
//!
//! ## Reconstructing every scan under a data root
//!
//! ```no_run
//! # use dicom_reconstruct::{BatchConfig, BatchOrchestrator, DicomDirectorySource, ReconstructionConfig};
//! let orchestrator = BatchOrchestrator::new(
//!     BatchConfig::new("/data/rsna").with_workers(16),
//!     ReconstructionConfig::default(),
//!     DicomDirectorySource::default(),
//! );
//! let (_outcomes, summary) = orchestrator.run().expect("should have found scans");
//! println!("{} of {} scans reconstructed", summary.succeeded, summary.total);
//! ```

pub mod batch;
pub mod config;
pub mod cropper;
pub mod enums;
pub mod error;
mod interpolator;
pub mod persist;
pub mod pipeline;
pub mod resampler;
pub mod series;
pub mod series_loader;
pub mod tilt;
pub mod transform;
pub mod volume;

pub use batch::{BatchError, BatchOrchestrator, BatchSummary, ProcessingOutcome};
pub use config::{BatchConfig, ReconstructionConfig, Rotation};
pub use cropper::{CenterCropper, CroppedVolume};
pub use enums::{ErrorKind, Interpolation, SortBy, SpacingMode, Stage};
pub use error::{ReconstructionError, Result};
pub use pipeline::{DicomDirectorySource, ScanPipeline, SeriesSource};
pub use resampler::{Resampler, ReslicedGrid};
pub use series::ScanSeries;
pub use series_loader::{SeriesLoader, SeriesLoaderError};
pub use tilt::{ShearParameters, TiltCorrector};
pub use transform::TransformSpec;
pub use volume::{Volume, VolumeExtractor};
