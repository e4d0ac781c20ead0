use ndarray::Array3;
use std::path::{Path, PathBuf};

/// One CT series as read from disk
///
/// Voxels are stored as `(depth, row, column)` in display order, in Hounsfield
/// units. Spacing and origin are `(x, y, z)` in mm, where x runs along the
/// columns and y along the rows.
#[derive(Clone, Debug)]
pub struct ScanSeries {
    data: Array3<f32>,
    orientation: [f64; 6],
    spacing: (f64, f64, f64),
    origin: (f64, f64, f64),
    source: PathBuf,
}

impl ScanSeries {
    pub fn new(
        data: Array3<f32>,
        orientation: [f64; 6],
        spacing: (f64, f64, f64),
        origin: (f64, f64, f64),
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data,
            orientation,
            spacing,
            origin,
            source: source.into(),
        }
    }

    /// Get the dimensions of the series (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Row and column direction cosines `(x1, y1, z1, x2, y2, z2)`
    pub fn orientation(&self) -> [f64; 6] {
        self.orientation
    }

    pub fn spacing(&self) -> (f64, f64, f64) {
        self.spacing
    }

    pub fn origin(&self) -> (f64, f64, f64) {
        self.origin
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Physical `(min, max)` extent along x, y and z
    pub fn bounds(&self) -> [(f64, f64); 3] {
        let (depth, height, width) = self.dim();
        let extent = |origin: f64, spacing: f64, n: usize| {
            let end = origin + n.saturating_sub(1) as f64 * spacing;
            (origin.min(end), origin.max(end))
        };
        [
            extent(self.origin.0, self.spacing.0, width),
            extent(self.origin.1, self.spacing.1, height),
            extent(self.origin.2, self.spacing.2, depth),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let series = ScanSeries::new(
            Array3::zeros((5, 4, 3)),
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            (0.5, 0.25, 2.0),
            (-10.0, 0.0, 100.0),
            "scan",
        );
        let [x, y, z] = series.bounds();
        assert_eq!(x, (-10.0, -9.0));
        assert_eq!(y, (0.0, 0.75));
        assert_eq!(z, (100.0, 108.0));
        assert_eq!(series.source(), Path::new("scan"));
    }
}
