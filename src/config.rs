//! Tunables of the reconstruction pipeline and the batch runner.
//!
//! Nothing in the crate reads global constants; every stage receives the
//! configuration it needs from these structs.

use std::path::PathBuf;

use crate::enums::{Interpolation, SpacingMode};

/// Canonical `(height, width)` every reconstructed slice is cropped to
pub const DEFAULT_FOOTPRINT: (usize, usize) = (400, 400);
/// Intensity used for everything outside the field of view (air is about -1000 HU)
pub const DEFAULT_BACKGROUND: f32 = -2000.0;
pub const DEFAULT_WORKERS: usize = 16;
pub const DEFAULT_MIN_SLICES: usize = 5;

/// In-plane rotation applied after the tilt correction, in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation {
    /// Rotation around the vertical (z) axis
    pub angle_z: f64,
    /// Rotation around the horizontal (y) axis
    pub angle_y: f64,
}

impl Rotation {
    pub fn new(angle_z: f64, angle_y: f64) -> Self {
        Self { angle_z, angle_y }
    }

    pub fn is_identity(&self) -> bool {
        self.angle_z == 0.0 && self.angle_y == 0.0
    }
}

/// Per-scan settings shared read-only by all workers
#[derive(Clone, Debug, PartialEq)]
pub struct ReconstructionConfig {
    pub footprint: (usize, usize),
    pub background: f32,
    pub spacing: SpacingMode,
    pub min_slices: usize,
    pub interpolation: Interpolation,
    pub rotation: Rotation,
    /// Horizontal voxel index that should become the midpoint of the volume
    pub center_x: Option<f64>,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            footprint: DEFAULT_FOOTPRINT,
            background: DEFAULT_BACKGROUND,
            spacing: SpacingMode::default(),
            min_slices: DEFAULT_MIN_SLICES,
            interpolation: Interpolation::default(),
            rotation: Rotation::default(),
            center_x: None,
        }
    }
}

impl ReconstructionConfig {
    pub fn with_footprint(mut self, height: usize, width: usize) -> Self {
        self.footprint = (height, width);
        self
    }

    pub fn with_background(mut self, background: f32) -> Self {
        self.background = background;
        self
    }

    pub fn with_spacing(mut self, spacing: SpacingMode) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_min_slices(mut self, min_slices: usize) -> Self {
        self.min_slices = min_slices;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_center_x(mut self, center_x: Option<f64>) -> Self {
        self.center_x = center_x;
        self
    }
}

/// Where scans come from and where their reconstructions go
#[derive(Clone, Debug, PartialEq)]
pub struct BatchConfig {
    pub data_root: PathBuf,
    /// Sub-directories of `data_root` holding one directory per scan
    pub collections: Vec<String>,
    /// Path component naming a scan's DICOM directory
    pub source_marker: String,
    /// Replacement for `source_marker` in the destination path
    pub output_marker: String,
    pub workers: usize,
    pub show_progress: bool,
}

impl BatchConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            collections: vec!["train".to_string(), "test".to_string()],
            source_marker: "dicom".to_string(),
            output_marker: "3d".to_string(),
            workers: DEFAULT_WORKERS,
            show_progress: false,
        }
    }

    pub fn with_collections(mut self, collections: Vec<String>) -> Self {
        self.collections = collections;
        self
    }

    pub fn with_markers(mut self, source: impl Into<String>, output: impl Into<String>) -> Self {
        self.source_marker = source.into();
        self.output_marker = output.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}
