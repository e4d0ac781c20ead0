use ndarray::{Array3, Axis, s};
use rayon::prelude::*;

use crate::error::{ReconstructionError, Result};
use crate::volume::Volume;

/// A volume cut to the canonical in-plane footprint
#[derive(Clone, Debug)]
pub struct CroppedVolume(pub Volume);

impl CroppedVolume {
    pub fn volume(&self) -> &Volume {
        &self.0
    }

    pub fn into_inner(self) -> Volume {
        self.0
    }
}

/// Crop window of one axis: source range and where it lands in the output
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisWindow {
    pub source_start: usize,
    pub source_end: usize,
    pub margin_low: usize,
    pub margin_high: usize,
}

impl AxisWindow {
    /// Window of `size` voxels centred on `center`, clipped to an axis `len` voxels long.
    ///
    /// `center` must lie inside the axis.
    pub fn centered(center: i64, size: usize, len: usize) -> Self {
        let corner0 = center - (size / 2) as i64;
        let corner1 = corner0 + size as i64;
        let clipped0 = corner0.max(0);
        let clipped1 = corner1.min(len as i64);
        Self {
            source_start: clipped0 as usize,
            source_end: clipped1 as usize,
            margin_low: (clipped0 - corner0) as usize,
            margin_high: (corner1 - clipped1) as usize,
        }
    }
}

pub struct CenterCropper;

impl CenterCropper {
    /// Crops or pads every slice to `footprint`, centred on the foreground centroid.
    ///
    /// Foreground is every voxel above zero. Anything outside the source extent
    /// is exactly `background`.
    pub fn crop(
        volume: Volume,
        footprint: (usize, usize),
        background: f32,
    ) -> Result<CroppedVolume> {
        let (center_row, center_col) = Self::centroid(&volume)?;
        let (depth, height, width) = volume.dim();
        let rows = AxisWindow::centered(center_row, footprint.0, height);
        let cols = AxisWindow::centered(center_col, footprint.1, width);

        let mut output = Array3::<f32>::from_elem((depth, footprint.0, footprint.1), background);
        let source = volume.data.slice(s![
            ..,
            rows.source_start..rows.source_end,
            cols.source_start..cols.source_end
        ]);
        output
            .slice_mut(s![
                ..,
                rows.margin_low..footprint.0 - rows.margin_high,
                cols.margin_low..footprint.1 - cols.margin_high
            ])
            .assign(&source);

        Ok(CroppedVolume(Volume::new(
            output,
            volume.spacing,
            volume.shear,
        )))
    }

    /// Centroid of voxels above zero over all slices, as truncated `(row, column)`
    pub fn centroid(volume: &Volume) -> Result<(i64, i64)> {
        let (count, row_sum, col_sum) = volume
            .data
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|slice| {
                let mut acc = (0u64, 0f64, 0f64);
                for ((row, col), value) in slice.indexed_iter() {
                    if *value > 0.0 {
                        acc.0 += 1;
                        acc.1 += row as f64;
                        acc.2 += col as f64;
                    }
                }
                acc
            })
            .reduce(
                || (0, 0.0, 0.0),
                |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2),
            );

        if count == 0 {
            return Err(ReconstructionError::DegenerateContent);
        }
        Ok((
            (row_sum / count as f64) as i64,
            (col_sum / count as f64) as i64,
        ))
    }
}
