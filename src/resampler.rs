use std::path::Path;

use log::debug;
use ndarray::{Array3, Zip, s};

use crate::enums::{Interpolation, SpacingMode, Stage};
use crate::error::{ReconstructionError, Result};
use crate::interpolator::Interpolator;
use crate::series::ScanSeries;
use crate::tilt::ShearParameters;
use crate::transform::{Padding, TransformSpec};

/// Output of the reslicing step
///
/// `data` is `(z, y, x)` in the reslicing frame, where both in-plane axes
/// run opposite to the display row and column order. Spacing and origin are
/// `(x, y, z)` in mm.
#[derive(Clone, Debug)]
pub struct ReslicedGrid {
    pub data: Array3<f32>,
    pub spacing: (f64, f64, f64),
    pub origin: (f64, f64, f64),
    pub shear: ShearParameters,
}

impl ReslicedGrid {
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }
}

pub struct Resampler;

impl Resampler {
    /// Applies padding, tilt shear and rotation, cropping the output to the
    /// transformed extent of the input.
    pub fn reslice(
        series: &ScanSeries,
        spec: &TransformSpec,
        interpolation: Interpolation,
        background: f32,
    ) -> Result<ReslicedGrid> {
        let spacing = series.spacing();
        if !is_valid_spacing(spacing) {
            return Err(ReconstructionError::DegenerateSpacing {
                spacing,
                scan: series.source().to_path_buf(),
            });
        }

        let padding = spec.padding(series.dim().2);
        let input = Self::to_reslice_frame(series, padding, background);
        let (depth, height, width) = input.dim();
        let origin = (
            series.origin().0 - padding.low as f64 * spacing.0,
            series.origin().1,
            series.origin().2,
        );

        let extent = [
            (origin.0, origin.0 + width.saturating_sub(1) as f64 * spacing.0),
            (origin.1, origin.1 + height.saturating_sub(1) as f64 * spacing.1),
            (origin.2, origin.2 + depth.saturating_sub(1) as f64 * spacing.2),
        ];
        let (out_origin, out_dim) = Self::output_extent(spec, extent, spacing);

        let matrix = spec.matrix();
        let view = input.view();
        let mut output = Array3::<f32>::from_elem(out_dim, background);
        Zip::indexed(&mut output).par_for_each(|(k, j, i), value| {
            let point = [
                out_origin.0 + i as f64 * spacing.0,
                out_origin.1 + j as f64 * spacing.1,
                out_origin.2 + k as f64 * spacing.2,
            ];
            let [x, y, z] = matrix.apply(point);
            if let Some(sample) = Interpolator::sample(
                &view,
                interpolation,
                (z - origin.2) / spacing.2,
                (y - origin.1) / spacing.1,
                (x - origin.0) / spacing.0,
            ) {
                *value = sample;
            }
        });

        Ok(ReslicedGrid {
            data: output,
            spacing,
            origin: out_origin,
            shear: spec.shear(),
        })
    }

    /// Applies the spacing policy to a resliced grid
    pub fn resample(
        grid: ReslicedGrid,
        mode: SpacingMode,
        interpolation: Interpolation,
        scan: &Path,
    ) -> Result<(ReslicedGrid, Stage)> {
        let target = match mode {
            SpacingMode::None => return Ok((grid, Stage::NativeSpacing)),
            SpacingMode::Auto => {
                let (x, y, z) = grid.spacing;
                let min = x.min(y).min(z);
                (min, min, min)
            }
            SpacingMode::Explicit([x, y, z]) => (x, y, z),
        };
        if !is_valid_spacing(target) {
            return Err(ReconstructionError::DegenerateSpacing {
                spacing: target,
                scan: scan.to_path_buf(),
            });
        }

        let (depth, height, width) =
            Interpolator::get_resampled_dimensions(grid.spacing, target, grid.dim());
        let data = Interpolator::resample_axis(
            &grid.data,
            0,
            depth,
            target.2 / grid.spacing.2,
            interpolation,
        );
        let data =
            Interpolator::resample_axis(&data, 1, height, target.1 / grid.spacing.1, interpolation);
        let data =
            Interpolator::resample_axis(&data, 2, width, target.0 / grid.spacing.0, interpolation);

        debug!(
            "resampled {} from {:?} to {:?}",
            scan.display(),
            grid.spacing,
            target
        );
        Ok((
            ReslicedGrid {
                data,
                spacing: target,
                ..grid
            },
            Stage::Resampled,
        ))
    }

    /// Pads the series along its display columns with `background`, then
    /// copies it into the reslicing frame
    fn to_reslice_frame(series: &ScanSeries, padding: Padding, background: f32) -> Array3<f32> {
        if padding == Padding::default() {
            return series.data().slice(s![.., ..;-1, ..;-1]).to_owned();
        }

        let (depth, height, width) = series.dim();
        let padded_width = width + padding.low + padding.high;
        let mut padded = Array3::<f32>::from_elem((depth, height, padded_width), background);
        padded
            .slice_mut(s![.., .., padding.low..padding.low + width])
            .assign(series.data());
        padded.slice(s![.., ..;-1, ..;-1]).to_owned()
    }

    /// Bounding box of the input extent mapped into output space.
    ///
    /// Returns the output origin and the `(depth, height, width)` of a grid
    /// with the given spacing covering it.
    fn output_extent(
        spec: &TransformSpec,
        extent: [(f64, f64); 3],
        spacing: (f64, f64, f64),
    ) -> ((f64, f64, f64), (usize, usize, usize)) {
        let inverse = spec.inverse_matrix();
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for corner in 0..8 {
            let point = [
                if corner & 1 == 0 { extent[0].0 } else { extent[0].1 },
                if corner & 2 == 0 { extent[1].0 } else { extent[1].1 },
                if corner & 4 == 0 { extent[2].0 } else { extent[2].1 },
            ];
            let mapped = inverse.apply(point);
            for axis in 0..3 {
                min[axis] = min[axis].min(mapped[axis]);
                max[axis] = max[axis].max(mapped[axis]);
            }
        }

        let samples = |axis: usize, step: f64| ((max[axis] - min[axis]) / step).round() as usize + 1;
        (
            (min[0], min[1], min[2]),
            (
                samples(2, spacing.2),
                samples(1, spacing.1),
                samples(0, spacing.0),
            ),
        )
    }
}

fn is_valid_spacing((x, y, z): (f64, f64, f64)) -> bool {
    [x, y, z].iter().all(|s| s.is_finite() && *s > 0.0)
}
