//! Geometry of the reslicing step.
//!
//! A [`TransformSpec`] is a plain value. Changing any parameter produces a new
//! value; the composed matrix is recomputed from it on demand.

use crate::config::Rotation;
use crate::tilt::ShearParameters;

/// Affine map of homogeneous 3D points, row-major
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine(pub [[f64; 4]; 4]);

impl Affine {
    pub fn identity() -> Self {
        let mut m = [[0.0; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Affine(m)
    }

    /// Shear of y proportional to the distance from the plane `z = zplane`
    pub fn shear_y(dydz: f64, zplane: f64) -> Self {
        let mut m = Self::identity();
        m.0[1][2] = dydz;
        m.0[1][3] = -zplane * dydz;
        m
    }

    pub fn rotation_z(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        let mut m = Self::identity();
        m.0[0][0] = c;
        m.0[0][1] = -s;
        m.0[1][0] = s;
        m.0[1][1] = c;
        m
    }

    pub fn rotation_y(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        let mut m = Self::identity();
        m.0[0][0] = c;
        m.0[0][2] = s;
        m.0[2][0] = -s;
        m.0[2][2] = c;
        m
    }

    /// `self * rhs`: applies `rhs` first
    pub fn compose(&self, rhs: &Affine) -> Affine {
        let mut m = [[0.0; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = (0..4).map(|k| self.0[i][k] * rhs.0[k][j]).sum();
            }
        }
        Affine(m)
    }

    #[inline]
    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            m[0][0] * p[0] + m[0][1] * p[1] + m[0][2] * p[2] + m[0][3],
            m[1][0] * p[0] + m[1][1] * p[1] + m[1][2] * p[2] + m[1][3],
            m[2][0] * p[0] + m[2][1] * p[1] + m[2][2] * p[2] + m[2][3],
        ]
    }
}

/// Constant padding added along x before reslicing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Padding {
    pub low: usize,
    pub high: usize,
}

/// Everything needed to reslice one series
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformSpec {
    shear: ShearParameters,
    center_x: Option<f64>,
    rotation: Rotation,
}

impl TransformSpec {
    pub fn new(shear: ShearParameters) -> Self {
        Self {
            shear,
            center_x: None,
            rotation: Rotation::default(),
        }
    }

    pub fn with_rotation(self, rotation: Rotation) -> Self {
        Self { rotation, ..self }
    }

    pub fn with_center_x(self, center_x: Option<f64>) -> Self {
        Self { center_x, ..self }
    }

    pub fn shear(&self) -> ShearParameters {
        self.shear
    }

    /// Padding of the display columns that moves column `center_x` to the
    /// middle of an axis `width` voxels wide
    pub fn padding(&self, width: usize) -> Padding {
        let Some(center) = self.center_x else {
            return Padding::default();
        };
        let size_x = width.saturating_sub(1) as f64;
        Padding {
            low: (size_x - 2.0 * center).max(0.0).round() as usize,
            high: (2.0 * center - size_x).max(0.0).round() as usize,
        }
    }

    /// Maps output physical points to input physical points of the reslicing frame.
    ///
    /// Rotations are applied to the output point first (around y, then around z),
    /// then the tilt shear. The frame runs x against the display columns, so
    /// both angles act mirrored: `angle_z` turns the display the same way it
    /// would with x along the columns.
    pub fn matrix(&self) -> Affine {
        let shear = Affine::shear_y(self.shear.rad_tilt, self.shear.minus_center_z);
        if self.rotation.is_identity() {
            return shear;
        }
        shear
            .compose(&Affine::rotation_z(self.rotation.angle_z))
            .compose(&Affine::rotation_y(-self.rotation.angle_y))
    }

    /// Maps input physical points to output physical points
    pub fn inverse_matrix(&self) -> Affine {
        let unshear = Affine::shear_y(-self.shear.rad_tilt, self.shear.minus_center_z);
        if self.rotation.is_identity() {
            return unshear;
        }
        Affine::rotation_y(self.rotation.angle_y)
            .compose(&Affine::rotation_z(-self.rotation.angle_z))
            .compose(&unshear)
    }
}
