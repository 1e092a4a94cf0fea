//! Scan orchestration.
//!
//! 1. reads: at most `max_in_flight` files are read concurrently, each on the
//!    blocking pool;
//! 2. scans: every text is scanned in parallel with rayon;
//! 3. merge: the aggregator runs once both stages have completed.
//!
//! A file that cannot be read contributes an empty result and a
//! [`FileFailure`]; it never aborts the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate, FactGraph};
use crate::config::Config;
use crate::discover::{discover_files, relative_path};
use crate::error::ScanError;
use crate::extract::types::FileFacts;
use crate::extract::scan_source;
use crate::manifest::{detect_frameworks, ManifestInfo};

/// Source of file contents.
pub trait SourceReader: Send + Sync + 'static {
    fn read(&self, path: &Path) -> Result<String, ScanError>;
}

/// Reads from the local filesystem, refusing files over a size limit.
#[derive(Debug, Clone)]
pub struct FsReader {
    max_file_kb: u64,
}

impl FsReader {
    pub fn new(max_file_kb: u64) -> Self {
        Self { max_file_kb }
    }
}

impl SourceReader for FsReader {
    fn read(&self, path: &Path) -> Result<String, ScanError> {
        let read_err = |source| ScanError::Read {
            path: path.to_path_buf(),
            source,
        };
        let len = fs::metadata(path).map_err(read_err)?.len();
        if len > self.max_file_kb.saturating_mul(1024) {
            return Err(ScanError::TooLarge {
                path: path.to_path_buf(),
                limit_kb: self.max_file_kb,
            });
        }
        let bytes = fs::read(path).map_err(read_err)?;
        String::from_utf8(bytes).map_err(|_| ScanError::Encoding {
            path: path.to_path_buf(),
        })
    }
}

/// A file that contributed nothing because it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// Path relative to the scan root.
    pub path: String,
    pub reason: String,
}

/// Counters for one run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub discovered: usize,
    pub scanned: usize,
    pub failures: Vec<FileFailure>,
    pub conflicts: usize,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub graph: FactGraph,
    pub stats: RunStats,
    pub manifest: ManifestInfo,
}

/// Runs discovery, reading, scanning and merging over one root.
pub struct Runner<R: SourceReader = FsReader> {
    root: PathBuf,
    config: Config,
    reader: Arc<R>,
}

impl Runner<FsReader> {
    /// Create a runner reading from the filesystem.
    pub fn new<P: AsRef<Path>>(root: P, config: Config) -> Self {
        let reader = FsReader::new(config.max_file_kb());
        Runner::with_reader(root, config, reader)
    }
}

impl<R: SourceReader> Runner<R> {
    pub fn with_reader<P: AsRef<Path>>(root: P, config: Config, reader: R) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            config,
            reader: Arc::new(reader),
        }
    }

    /// Discover files under the root and scan them.
    pub fn run(&self) -> anyhow::Result<ScanOutcome> {
        if !self.root.is_dir() {
            anyhow::bail!("{} is not a readable directory", self.root.display());
        }
        let files = discover_files(&self.root, &self.config)?;
        info!(root = %self.root.display(), files = files.len(), "discovered source files");
        self.scan_files(files)
    }

    /// Scan an explicit file list.
    pub fn scan_files(&self, files: Vec<PathBuf>) -> anyhow::Result<ScanOutcome> {
        let manifest = detect_frameworks(&self.root);
        if !manifest.frameworks.is_empty() {
            debug!(
                frameworks = %manifest
                    .frameworks
                    .iter()
                    .map(|f| f.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
                "manifest frameworks"
            );
        }

        let discovered = files.len();
        let jobs: Vec<(String, PathBuf)> = files
            .into_iter()
            .map(|path| (relative_path(&self.root, &path), path))
            .collect();

        let runtime = tokio::runtime::Runtime::new()?;
        let reads = runtime.block_on(read_all(
            Arc::clone(&self.reader),
            jobs,
            self.config.max_in_flight(),
        ));

        let mut failures = Vec::new();
        let mut texts = Vec::with_capacity(reads.len());
        for (rel, result) in reads {
            match result {
                Ok(text) => texts.push((rel, text)),
                Err(e) => {
                    warn!(file = %rel, error = %e, "skipping unreadable file");
                    failures.push(FileFailure {
                        path: rel,
                        reason: e.to_string(),
                    });
                }
            }
        }
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        let opts = self.config.scan_options()?;
        let mut results: Vec<FileFacts> = texts
            .par_iter()
            .map(|(rel, text)| scan_source(rel, text, &opts))
            .collect();
        let scanned = results.len();
        results.extend(failures.iter().map(|f| FileFacts::empty(&f.path)));

        let (graph, merge_stats) = aggregate(
            results,
            self.config.limit(),
            self.config.association_conflicts,
        )?;

        Ok(ScanOutcome {
            graph,
            stats: RunStats {
                discovered,
                scanned,
                failures,
                conflicts: merge_stats.conflicts,
            },
            manifest,
        })
    }
}

/// Read every file with at most `max_in_flight` reads outstanding.
async fn read_all<R: SourceReader>(
    reader: Arc<R>,
    jobs: Vec<(String, PathBuf)>,
    max_in_flight: usize,
) -> Vec<(String, Result<String, ScanError>)> {
    stream::iter(jobs)
        .map(|(rel, path)| {
            let reader = Arc::clone(&reader);
            async move {
                let task_path = path.clone();
                let result = tokio::task::spawn_blocking(move || reader.read(&task_path))
                    .await
                    .unwrap_or_else(|_| Err(ScanError::Cancelled { path }));
                (rel, result)
            }
        })
        .buffer_unordered(max_in_flight.max(1))
        .collect()
        .await
}
