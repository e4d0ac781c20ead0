use crate::error::{ReconstructionError, Result};
use crate::series::ScanSeries;

/// Gantry tilt derived from a series' orientation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShearParameters {
    /// Tilt between the image plane and the table axis, in radians
    pub rad_tilt: f64,
    /// Negated z coordinate of the plane the shear is anchored at
    pub minus_center_z: f64,
}

pub struct TiltCorrector;

impl TiltCorrector {
    /// Derives the shear compensating gantry tilt.
    ///
    /// A column direction with no y component means the series is not axial;
    /// it is rejected here so no geometry is ever built for it.
    pub fn shear_parameters(series: &ScanSeries) -> Result<ShearParameters> {
        let orientation = series.orientation();
        let [_, _, _, _, y2, z2] = orientation;
        if y2 == 0.0 {
            return Err(ReconstructionError::UnsupportedOrientation(orientation));
        }

        let rad_tilt = (z2 / y2).atan();
        let center_z = series.bounds()[2].1 / 2.0;
        Ok(ShearParameters {
            rad_tilt,
            minus_center_z: -center_z,
        })
    }
}
