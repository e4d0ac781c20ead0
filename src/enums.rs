use std::fmt;
use std::str::FromStr;

/// Interpolation kernel used for reslicing and resampling
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    /// Catmull-Rom cubic convolution
    #[default]
    Cubic,
}

/// Order in which the slices of a series are stacked
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    /// Position along the slice normal, ascending
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    None,
}

/// Output spacing policy of the resampler
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum SpacingMode {
    /// Isotropic at the smallest spacing found after reslicing
    Auto,
    /// Keep the native, possibly anisotropic, spacing
    #[default]
    None,
    /// Resample to the given `(x, y, z)` spacing in mm
    Explicit([f64; 3]),
}

impl FromStr for SpacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(SpacingMode::Auto),
            "none" => Ok(SpacingMode::None),
            other => {
                let values = other
                    .split(',')
                    .map(|v| v.trim().parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| format!("invalid spacing '{s}': {e}"))?;
                match values.as_slice() {
                    [x, y, z] => Ok(SpacingMode::Explicit([*x, *y, *z])),
                    _ => Err(format!(
                        "invalid spacing '{s}': expected 'auto', 'none' or 'x,y,z'"
                    )),
                }
            }
        }
    }
}

impl fmt::Display for SpacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpacingMode::Auto => write!(f, "auto"),
            SpacingMode::None => write!(f, "none"),
            SpacingMode::Explicit([x, y, z]) => write!(f, "{x},{y},{z}"),
        }
    }
}

/// Tag of a per-scan failure, used for batch summaries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    Load,
    UnsupportedOrientation,
    DegenerateSpacing,
    InsufficientSlices,
    DegenerateContent,
    Io,
    /// The worker panicked
    Panic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Load => "LoadError",
            ErrorKind::UnsupportedOrientation => "UnsupportedOrientationError",
            ErrorKind::DegenerateSpacing => "DegenerateSpacingError",
            ErrorKind::InsufficientSlices => "InsufficientSlicesError",
            ErrorKind::DegenerateContent => "DegenerateContentError",
            ErrorKind::Io => "IOError",
            ErrorKind::Panic => "Panic",
        };
        f.write_str(name)
    }
}

/// Steps a scan passes through on its way to disk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Loaded,
    OrientationValidated,
    Resliced,
    Resampled,
    NativeSpacing,
    Extracted,
    Cropped,
    Persisted,
}
