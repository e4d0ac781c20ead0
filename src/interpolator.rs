use crate::enums::Interpolation;

use ndarray::{Array3, ArrayView3, Axis, Zip};

/// Distance below which a sample position counts as lying on a grid point
const SNAP: f64 = 1e-6;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Dimensions of a grid after resampling from `spacing` to `target`.
    ///
    /// Both are `(x, y, z)`; `original_dim` is `(depth, height, width)`. The
    /// first sample keeps its position and the extent is preserved.
    pub(crate) fn get_resampled_dimensions(
        spacing: (f64, f64, f64),
        target: (f64, f64, f64),
        original_dim: (usize, usize, usize),
    ) -> (usize, usize, usize) {
        let resize = |n: usize, from: f64, to: f64| {
            ((n.saturating_sub(1) as f64 * from / to).round() as usize) + 1
        };
        (
            resize(original_dim.0, spacing.2, target.2),
            resize(original_dim.1, spacing.1, target.1),
            resize(original_dim.2, spacing.0, target.0),
        )
    }

    /// Weights of the four taps at `floor - 1 ..= floor + 2` for fraction `t`
    #[inline]
    pub(crate) fn weights(interpolation: Interpolation, t: f32) -> [f32; 4] {
        match interpolation {
            Interpolation::Linear => [0.0, 1.0 - t, t, 0.0],
            Interpolation::Cubic => {
                let t2 = t * t;
                let t3 = t2 * t;
                [
                    (-0.5f32).mul_add(t3, t2) - 0.5 * t,
                    1.5f32.mul_add(t3, -2.5 * t2) + 1.0,
                    (-1.5f32).mul_add(t3, 2.0 * t2) + 0.5 * t,
                    0.5f32.mul_add(t3, -0.5 * t2),
                ]
            }
        }
    }

    /// Tap indices and weights for continuous index `x` on an axis of length `n`.
    ///
    /// Taps beyond the edge are clamped to it. Returns `None` when `x` lies
    /// outside the sampled extent.
    #[inline]
    pub(crate) fn taps(
        interpolation: Interpolation,
        x: f64,
        n: usize,
    ) -> Option<([usize; 4], [f32; 4])> {
        let last = n.checked_sub(1)? as f64;
        let rounded = x.round();
        let x = if (x - rounded).abs() < SNAP { rounded } else { x };
        if !(0.0..=last).contains(&x) {
            return None;
        }

        let floor = x.floor();
        let base = floor as isize;
        let max = n as isize - 1;
        let mut indices = [0usize; 4];
        for (k, index) in indices.iter_mut().enumerate() {
            *index = (base - 1 + k as isize).clamp(0, max) as usize;
        }
        Some((indices, Self::weights(interpolation, (x - floor) as f32)))
    }

    /// Samples `volume` at continuous index `(z, y, x)`, `None` outside its extent
    pub(crate) fn sample(
        volume: &ArrayView3<f32>,
        interpolation: Interpolation,
        z: f64,
        y: f64,
        x: f64,
    ) -> Option<f32> {
        let (depth, height, width) = volume.dim();
        let (zi, zw) = Self::taps(interpolation, z, depth)?;
        let (yi, yw) = Self::taps(interpolation, y, height)?;
        let (xi, xw) = Self::taps(interpolation, x, width)?;

        let mut value = 0.0f32;
        for (a, &wz) in zi.iter().zip(&zw) {
            if wz == 0.0 {
                continue;
            }
            let mut plane = 0.0f32;
            for (b, &wy) in yi.iter().zip(&yw) {
                if wy == 0.0 {
                    continue;
                }
                let mut row = 0.0f32;
                for (c, &wx) in xi.iter().zip(&xw) {
                    row = volume[[*a, *b, *c]].mul_add(wx, row);
                }
                plane = row.mul_add(wy, plane);
            }
            value = plane.mul_add(wz, value);
        }
        Some(value)
    }

    /// Resamples one axis to `len` samples spaced `step` input voxels apart
    pub(crate) fn resample_axis(
        data: &Array3<f32>,
        axis: usize,
        len: usize,
        step: f64,
        interpolation: Interpolation,
    ) -> Array3<f32> {
        let n = data.len_of(Axis(axis));
        let kernel: Vec<([usize; 4], [f32; 4])> = (0..len)
            .map(|i| {
                let x = (i as f64 * step).min(n.saturating_sub(1) as f64);
                Self::taps(interpolation, x, n).unwrap_or(([0; 4], [0.0, 1.0, 0.0, 0.0]))
            })
            .collect();

        let mut dim = data.raw_dim();
        dim[axis] = len;
        let mut output = Array3::<f32>::zeros(dim);
        Zip::from(output.lanes_mut(Axis(axis)))
            .and(data.lanes(Axis(axis)))
            .par_for_each(|mut out, input| {
                for (value, (indices, weights)) in out.iter_mut().zip(&kernel) {
                    *value = indices
                        .iter()
                        .zip(weights)
                        .fold(0.0f32, |acc, (&i, &w)| input[i].mul_add(w, acc));
                }
            });
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Interpolation::Linear, 0.25)]
    #[case(Interpolation::Cubic, 0.0)]
    #[case(Interpolation::Cubic, 0.3)]
    #[case(Interpolation::Cubic, 0.99)]
    fn test_weights_sum_to_one(#[case] interpolation: Interpolation, #[case] t: f32) {
        let sum: f32 = Interpolator::weights(interpolation, t).iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cubic_is_exact_on_grid() {
        assert_eq!(
            Interpolator::weights(Interpolation::Cubic, 0.0),
            [0.0, 1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_taps_outside_extent() {
        assert!(Interpolator::taps(Interpolation::Cubic, -0.5, 4).is_none());
        assert!(Interpolator::taps(Interpolation::Cubic, 3.5, 4).is_none());
        assert!(Interpolator::taps(Interpolation::Cubic, 1.0, 0).is_none());
        // almost on the last voxel snaps onto it
        let (indices, weights) = Interpolator::taps(Interpolation::Cubic, 3.0 + 1e-9, 4).unwrap();
        assert_eq!(indices, [2, 3, 3, 3]);
        assert_eq!(weights, [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sample_linear_midpoint() {
        let volume = Array3::from_shape_fn((2, 2, 2), |(z, y, x)| (z * 4 + y * 2 + x) as f32);
        let value =
            Interpolator::sample(&volume.view(), Interpolation::Linear, 0.5, 0.5, 0.5).unwrap();
        assert!((value - 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_cubic_reproduces_linear_ramp() {
        let volume = Array3::from_shape_fn((6, 6, 6), |(_, _, x)| x as f32 * 10.0);
        let value =
            Interpolator::sample(&volume.view(), Interpolation::Cubic, 2.0, 2.0, 2.25).unwrap();
        assert!((value - 22.5).abs() < 1e-4);
    }

    #[test]
    fn test_resampled_dimensions() {
        // (x, y, z) spacing 0.5, 0.5, 5.0 to isotropic 0.5
        let dim =
            Interpolator::get_resampled_dimensions((0.5, 0.5, 5.0), (0.5, 0.5, 0.5), (11, 8, 8));
        assert_eq!(dim, (101, 8, 8));
    }

    #[test]
    fn test_resample_axis_upsamples_depth() {
        let data = Array3::from_shape_fn((3, 2, 2), |(z, _, _)| z as f32 * 2.0);
        let output = Interpolator::resample_axis(&data, 0, 5, 0.5, Interpolation::Linear);
        assert_eq!(output.dim(), (5, 2, 2));
        let column: Vec<f32> = output.slice(ndarray::s![.., 1, 1]).to_vec();
        assert_eq!(column, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
