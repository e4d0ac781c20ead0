use std::cell::Cell;
use std::path::Path;

use log::debug;

use crate::config::ReconstructionConfig;
use crate::cropper::{CenterCropper, CroppedVolume};
use crate::enums::{SortBy, Stage};
use crate::error::Result;
use crate::resampler::Resampler;
use crate::series::ScanSeries;
use crate::series_loader::{SeriesLoader, SeriesLoaderError};
use crate::tilt::TiltCorrector;
use crate::transform::TransformSpec;
use crate::volume::VolumeExtractor;

/// Something that can turn a scan identifier into a series
pub trait SeriesSource: Sync {
    fn load(&self, scan: &Path) -> std::result::Result<ScanSeries, SeriesLoaderError>;
}

impl<F> SeriesSource for F
where
    F: Fn(&Path) -> std::result::Result<ScanSeries, SeriesLoaderError> + Sync,
{
    fn load(&self, scan: &Path) -> std::result::Result<ScanSeries, SeriesLoaderError> {
        self(scan)
    }
}

/// Reads each scan from a directory of `.dcm` files
#[derive(Clone, Copy, Debug, Default)]
pub struct DicomDirectorySource {
    pub sort_by: SortBy,
}

impl SeriesSource for DicomDirectorySource {
    fn load(&self, scan: &Path) -> std::result::Result<ScanSeries, SeriesLoaderError> {
        SeriesLoader::load_from_directory(scan, self.sort_by)
    }
}

/// Runs one scan from its source to a cropped volume, tracking how far it got
pub struct ScanPipeline<'a, S: SeriesSource + ?Sized> {
    source: &'a S,
    config: &'a ReconstructionConfig,
    stage: Stage,
    /// Mirror of `stage` owned by the caller, readable even if a stage panics
    tracker: Option<&'a Cell<Stage>>,
}

impl<'a, S: SeriesSource + ?Sized> ScanPipeline<'a, S> {
    pub fn new(source: &'a S, config: &'a ReconstructionConfig) -> Self {
        Self {
            source,
            config,
            stage: Stage::Pending,
            tracker: None,
        }
    }

    /// Also records every completed stage in `tracker`
    pub fn with_tracker(self, tracker: &'a Cell<Stage>) -> Self {
        tracker.set(self.stage);
        Self {
            tracker: Some(tracker),
            ..self
        }
    }

    /// Last stage the scan completed
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, scan: &Path, stage: Stage) {
        debug!("{}: {:?} -> {:?}", scan.display(), self.stage, stage);
        self.stage = stage;
        if let Some(tracker) = self.tracker {
            tracker.set(stage);
        }
    }

    pub fn reconstruct(&mut self, scan: &Path) -> Result<CroppedVolume> {
        let series = self.source.load(scan)?;
        self.advance(scan, Stage::Loaded);
        self.reconstruct_series(&series)
    }

    /// Runs every stage after loading on an in-memory series
    pub fn reconstruct_series(&mut self, series: &ScanSeries) -> Result<CroppedVolume> {
        let scan = series.source();
        let config = self.config;

        let shear = TiltCorrector::shear_parameters(series)?;
        self.advance(scan, Stage::OrientationValidated);

        let spec = TransformSpec::new(shear)
            .with_rotation(config.rotation)
            .with_center_x(config.center_x);
        let grid = Resampler::reslice(series, &spec, config.interpolation, config.background)?;
        self.advance(scan, Stage::Resliced);

        let (grid, stage) = Resampler::resample(grid, config.spacing, config.interpolation, scan)?;
        self.advance(scan, stage);

        let volume = VolumeExtractor::extract(grid, config.min_slices)?;
        self.advance(scan, Stage::Extracted);

        let cropped = CenterCropper::crop(volume, config.footprint, config.background)?;
        self.advance(scan, Stage::Cropped);
        Ok(cropped)
    }
}
