//! Batch reconstruction of every scan under a data root.
//!
//! Each scan is one task on a fixed-size rayon pool. A task owns all buffers
//! of its scan and writes only below that scan's own output directory, so
//! tasks share nothing but the read-only configuration and the series source.
//! Failures, including panics, stay inside the task and come back as
//! [`ProcessingOutcome::Failure`].

use std::any::Any;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rayon::prelude::*;
use thiserror::Error;
use web_time::Instant;

use crate::config::{BatchConfig, ReconstructionConfig};
use crate::enums::{ErrorKind, Stage};
use crate::error::{ReconstructionError, error_chain};
use crate::persist::SliceWriter;
use crate::pipeline::{ScanPipeline, SeriesSource};

/// Errors that stop a batch before any scan is processed
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid scan pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Final state of one scan
#[derive(Clone, Debug)]
pub enum ProcessingOutcome {
    Success {
        scan: PathBuf,
        output_dir: PathBuf,
        /// `(depth, height, width)` of the persisted volume
        dim: (usize, usize, usize),
        elapsed: Duration,
    },
    Failure {
        scan: PathBuf,
        kind: ErrorKind,
        /// Last stage the scan completed before failing
        stage: Stage,
        message: String,
        trace: String,
    },
}

impl ProcessingOutcome {
    pub fn scan(&self) -> &Path {
        match self {
            ProcessingOutcome::Success { scan, .. } | ProcessingOutcome::Failure { scan, .. } => {
                scan
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success { .. })
    }
}

/// What happened to a whole batch
#[derive(Clone, Debug, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<(PathBuf, ErrorKind)>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[ProcessingOutcome], elapsed: Duration) -> Self {
        let failures = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ProcessingOutcome::Failure { scan, kind, .. } => Some((scan.clone(), *kind)),
                ProcessingOutcome::Success { .. } => None,
            })
            .collect::<Vec<_>>();
        Self {
            total: outcomes.len(),
            succeeded: outcomes.len() - failures.len(),
            failures,
            elapsed,
        }
    }

    /// Number of failed scans per error kind
    pub fn failures_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for (_, kind) in &self.failures {
            *counts.entry(*kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn log(&self) {
        info!(
            "reconstructed {}/{} scans in {:.1}s",
            self.succeeded,
            self.total,
            self.elapsed.as_secs_f64()
        );
        for (kind, count) in self.failures_by_kind() {
            warn!("{count} scans failed with {kind}");
        }
        for (scan, kind) in &self.failures {
            warn!("  {kind}: {}", scan.display());
        }
    }
}

pub struct BatchOrchestrator<S: SeriesSource> {
    batch: BatchConfig,
    config: ReconstructionConfig,
    source: S,
}

impl<S: SeriesSource> BatchOrchestrator<S> {
    pub fn new(batch: BatchConfig, config: ReconstructionConfig, source: S) -> Self {
        Self {
            batch,
            config,
            source,
        }
    }

    /// Every `{data_root}/{collection}/*/{source_marker}` directory, sorted per collection
    pub fn enumerate_scans(&self) -> Result<Vec<PathBuf>, BatchError> {
        let root = Pattern::escape(&self.batch.data_root.to_string_lossy());
        let mut scans = Vec::new();
        for collection in &self.batch.collections {
            let pattern = format!(
                "{root}/{}/*/{}",
                Pattern::escape(collection),
                Pattern::escape(&self.batch.source_marker)
            );
            let mut found: Vec<PathBuf> = glob::glob(&pattern)?
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("skipping unreadable path: {e}");
                        None
                    }
                })
                .filter(|path| path.is_dir())
                .collect();
            found.sort();
            info!("found {} scans in {collection}", found.len());
            scans.extend(found);
        }
        Ok(scans)
    }

    /// Reconstructs every enumerated scan
    pub fn run(&self) -> Result<(Vec<ProcessingOutcome>, BatchSummary), BatchError> {
        let scans = self.enumerate_scans()?;
        self.run_scans(&scans)
    }

    /// Reconstructs `scans` on the worker pool; outcomes follow the input order
    pub fn run_scans(
        &self,
        scans: &[PathBuf],
    ) -> Result<(Vec<ProcessingOutcome>, BatchSummary), BatchError> {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.batch.workers)
            .thread_name(|i| format!("reconstruct-{i}"))
            .build()?;
        let progress = self.progress_bar(scans.len());

        info!(
            "reconstructing {} scans with {} workers",
            scans.len(),
            self.batch.workers
        );
        let outcomes: Vec<ProcessingOutcome> = pool.install(|| {
            scans
                .par_iter()
                .map(|scan| {
                    let outcome = self.process(scan);
                    progress.inc(1);
                    outcome
                })
                .collect()
        });
        progress.finish_and_clear();

        let summary = BatchSummary::from_outcomes(&outcomes, start.elapsed());
        summary.log();
        Ok((outcomes, summary))
    }

    /// Runs one scan end to end; never fails or panics past this point
    pub fn process(&self, scan: &Path) -> ProcessingOutcome {
        let start = Instant::now();
        let stage = Cell::new(Stage::Pending);
        let result = catch_unwind(AssertUnwindSafe(|| self.process_inner(scan, &stage)));
        let stage = stage.get();

        match result {
            Ok(Ok((output_dir, dim))) => {
                let elapsed = start.elapsed();
                info!(
                    "{} -> {} {:?} in {:.2}s",
                    scan.display(),
                    output_dir.display(),
                    dim,
                    elapsed.as_secs_f64()
                );
                ProcessingOutcome::Success {
                    scan: scan.to_path_buf(),
                    output_dir,
                    dim,
                    elapsed,
                }
            }
            Ok(Err(err)) => {
                let message = error_chain(&err);
                error!("{}: {message}", scan.display());
                ProcessingOutcome::Failure {
                    scan: scan.to_path_buf(),
                    kind: err.kind(),
                    stage,
                    message,
                    trace: format!("{err:#?}"),
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("{}: worker panicked: {message}", scan.display());
                ProcessingOutcome::Failure {
                    scan: scan.to_path_buf(),
                    kind: ErrorKind::Panic,
                    stage,
                    trace: message.clone(),
                    message,
                }
            }
        }
    }

    fn process_inner(
        &self,
        scan: &Path,
        stage: &Cell<Stage>,
    ) -> Result<(PathBuf, (usize, usize, usize)), ReconstructionError> {
        let output_dir =
            SliceWriter::output_dir(scan, &self.batch.source_marker, &self.batch.output_marker)?;
        SliceWriter::clear(&output_dir)?;

        let cropped = ScanPipeline::new(&self.source, &self.config)
            .with_tracker(stage)
            .reconstruct(scan)?;

        SliceWriter::persist(&cropped, &output_dir)?;
        stage.set(Stage::Persisted);
        Ok((output_dir, cropped.volume().dim()))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.batch.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            progress.set_style(style.progress_chars("#>-"));
        }
        progress
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::ScanSeries;
    use crate::series_loader::SeriesLoaderError;
    use ndarray::{Array2, Array3};
    use ndarray_npy::read_npy;
    use std::fs;

    const AXIAL: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    const CORONAL: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 0.0, -1.0];

    /// Series keyed on the scan id: `bad_*` is coronal, `panic_*` panics,
    /// `missing_*` fails to load
    fn source(scan: &Path) -> Result<ScanSeries, SeriesLoaderError> {
        let id = scan
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        if id.starts_with("missing") {
            return Err(SeriesLoaderError::NoValidImages);
        }
        if id.starts_with("panic") {
            panic!("decoder blew up on {id}");
        }
        let orientation = if id.starts_with("bad") { CORONAL } else { AXIAL };
        let data = Array3::from_shape_fn((6, 24, 20), |(z, y, x)| {
            if (6..18).contains(&y) && (4..16).contains(&x) {
                (z * 10 + y + x) as f32 + 0.25
            } else {
                -1000.0
            }
        });
        Ok(ScanSeries::new(data, orientation, (0.7, 0.7, 2.5), (0.0, 0.0, 0.0), scan))
    }

    fn make_scans(root: &Path, scans: &[(&str, &str)]) {
        for (collection, id) in scans {
            fs::create_dir_all(root.join(collection).join(id).join("dicom")).unwrap();
        }
    }

    type Source = fn(&Path) -> Result<ScanSeries, SeriesLoaderError>;

    fn orchestrator(root: &Path) -> BatchOrchestrator<Source> {
        BatchOrchestrator::new(
            BatchConfig::new(root).with_workers(3),
            ReconstructionConfig::default().with_footprint(16, 16),
            source as Source,
        )
    }

    #[test]
    fn test_enumerates_both_collections() {
        let root = tempfile::tempdir().unwrap();
        make_scans(root.path(), &[("train", "ID_b"), ("train", "ID_a"), ("test", "ID_c")]);
        fs::create_dir_all(root.path().join("train/ID_d/other")).unwrap();

        let scans = orchestrator(root.path()).enumerate_scans().unwrap();
        let expected: Vec<PathBuf> = ["train/ID_a", "train/ID_b", "test/ID_c"]
            .iter()
            .map(|id| root.path().join(id).join("dicom"))
            .collect();
        assert_eq!(scans, expected);
    }

    #[test]
    fn test_failures_are_isolated() {
        let root = tempfile::tempdir().unwrap();
        make_scans(
            root.path(),
            &[
                ("train", "ID_1"),
                ("train", "bad_2"),
                ("train", "panic_3"),
                ("test", "ID_4"),
                ("test", "missing_5"),
            ],
        );

        let (outcomes, summary) = orchestrator(root.path()).run().unwrap();
        assert_eq!(outcomes.len(), 5);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.succeeded, 2);

        let by_kind = summary.failures_by_kind();
        assert_eq!(by_kind.get(&ErrorKind::UnsupportedOrientation), Some(&1));
        assert_eq!(by_kind.get(&ErrorKind::Panic), Some(&1));
        assert_eq!(by_kind.get(&ErrorKind::Load), Some(&1));

        for id in ["train/ID_1", "test/ID_4"] {
            let out = root.path().join(id).join("3d");
            assert_eq!(fs::read_dir(&out).unwrap().count(), 6);
            let slice: Array2<i16> = read_npy(out.join("005.npy")).unwrap();
            assert_eq!(slice.dim(), (16, 16));
        }
        assert!(!root.path().join("train/bad_2/3d").exists());

        match &outcomes[1] {
            ProcessingOutcome::Failure { kind, stage, .. } => {
                assert_eq!(*kind, ErrorKind::UnsupportedOrientation);
                assert_eq!(*stage, Stage::Loaded);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let root = tempfile::tempdir().unwrap();
        make_scans(root.path(), &[("train", "ID_1")]);
        let orchestrator = orchestrator(root.path());
        let out = root.path().join("train/ID_1/3d");

        orchestrator.run().unwrap();
        let first: Vec<Vec<u8>> = (0..6)
            .map(|i| fs::read(out.join(format!("{i:03}.npy"))).unwrap())
            .collect();
        fs::write(out.join("999.npy"), b"stale").unwrap();

        let (outcomes, _) = orchestrator.run().unwrap();
        assert!(outcomes[0].is_success());
        let second: Vec<Vec<u8>> = (0..6)
            .map(|i| fs::read(out.join(format!("{i:03}.npy"))).unwrap())
            .collect();
        assert_eq!(first, second);
        assert!(!out.join("999.npy").exists());
    }

    #[test]
    fn test_failure_clears_previous_output() {
        let root = tempfile::tempdir().unwrap();
        make_scans(root.path(), &[("train", "bad_1")]);
        let stale = root.path().join("train/bad_1/3d");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("000.npy"), b"old").unwrap();

        let (outcomes, _) = orchestrator(root.path()).run().unwrap();
        assert!(!outcomes[0].is_success());
        assert!(!stale.exists());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
