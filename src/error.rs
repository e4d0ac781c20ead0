use std::path::PathBuf;

use thiserror::Error;

use crate::enums::ErrorKind;
use crate::series_loader::SeriesLoaderError;

/// Result type for reconstruction operations
pub type Result<T> = std::result::Result<T, ReconstructionError>;

/// Errors a single scan can fail with
#[derive(Debug, Error)]
pub enum ReconstructionError {
    /// The series could not be read from disk
    #[error("failed to load series")]
    Load(#[from] SeriesLoaderError),

    /// The second orientation vector has no vertical component (non-axial acquisition)
    #[error("unsupported patient orientation: {0:?}")]
    UnsupportedOrientation([f64; 6]),

    /// Spacing after reslicing is zero, negative or not finite
    #[error("degenerate spacing {spacing:?} in {scan}")]
    DegenerateSpacing {
        spacing: (f64, f64, f64),
        scan: PathBuf,
    },

    /// The reconstructed volume is too shallow to be a real acquisition
    #[error("reconstructed volume has {depth} slices, at least {min} required")]
    InsufficientSlices { depth: usize, min: usize },

    /// No voxel above zero, so there is no centroid to crop around
    #[error("volume has no foreground voxels to center on")]
    DegenerateContent,

    /// Persisting the output failed
    #[error("IO error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a slice array failed
    #[error("failed to write {path}")]
    Npy {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpyError,
    },
}

impl ReconstructionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconstructionError::Load(_) => ErrorKind::Load,
            ReconstructionError::UnsupportedOrientation(_) => ErrorKind::UnsupportedOrientation,
            ReconstructionError::DegenerateSpacing { .. } => ErrorKind::DegenerateSpacing,
            ReconstructionError::InsufficientSlices { .. } => ErrorKind::InsufficientSlices,
            ReconstructionError::DegenerateContent => ErrorKind::DegenerateContent,
            ReconstructionError::Io { .. } | ReconstructionError::Npy { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReconstructionError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Formats an error together with its whole `source()` chain.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
