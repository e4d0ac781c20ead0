use crate::error::{ReconstructionError, Result};
use crate::resampler::ReslicedGrid;
use crate::tilt::ShearParameters;

use ndarray::{Array2, Array3, Axis};

/// Reconstructed volume in `(depth, row, column)` display order
#[derive(Clone, Debug)]
pub struct Volume {
    pub data: Array3<f32>,
    /// `(x, y, z)` in mm
    pub spacing: (f64, f64, f64),
    pub shear: ShearParameters,
}

impl Volume {
    pub fn new(data: Array3<f32>, spacing: (f64, f64, f64), shear: ShearParameters) -> Self {
        Self {
            data,
            spacing,
            shear,
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Converts every slice to `i16`, truncating and saturating out-of-range values
    pub fn to_i16_slices(&self) -> impl Iterator<Item = Array2<i16>> + '_ {
        self.data
            .axis_iter(Axis(0))
            .map(|slice| slice.mapv(|v| v as i16))
    }
}

pub struct VolumeExtractor;

impl VolumeExtractor {
    /// Turns a resliced grid into a display-ordered volume.
    ///
    /// The reslicing frame runs both in-plane axes backwards, so every slice is
    /// rotated by 180 degrees. Grids shallower than `min_slices` are rejected.
    pub fn extract(grid: ReslicedGrid, min_slices: usize) -> Result<Volume> {
        let depth = grid.dim().0;
        if depth < min_slices {
            return Err(ReconstructionError::InsufficientSlices {
                depth,
                min: min_slices,
            });
        }

        let mut data = grid.data;
        Self::rotate_180(&mut data);
        Ok(Volume::new(data, grid.spacing, grid.shear))
    }

    /// Two successive 90 degree rotations over the row and column axes
    fn rotate_180(data: &mut Array3<f32>) {
        for _ in 0..2 {
            data.swap_axes(1, 2);
            data.invert_axis(Axis(1));
        }
        // back to standard layout so slices are contiguous for cropping and writing
        if !data.is_standard_layout() {
            *data = data.as_standard_layout().into_owned();
        }
    }
}
