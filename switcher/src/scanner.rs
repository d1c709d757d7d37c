//! Concurrent discovery of project roots.
//!
//! One scanner walks one configured root. A directory is a project root when
//! it contains one of the configured marker directories (`.git` by default);
//! the walk records it and does not descend any further into it, so
//! repositories nested inside a project are not indexed separately.
//!
//! # Architecture
//!
//! [`ScanSet::spawn`] starts one blocking task per root on the Tokio runtime.
//! Every scanner writes into the shared [`ProjectIndex`] and, for records the
//! index did not already hold, appends to the shared [`CandidateList`] the
//! picker is displaying. Each task finishes with a [`ScanReport`]; a failing
//! or panicking scanner only affects its own report.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use project_switcher::config::RootConfiguration;
//! use project_switcher::index::{CandidateList, ProjectIndex};
//! use project_switcher::scanner::{ScanOptions, ScanSet};
//!
//! #[tokio::main]
//! async fn main() {
//!     let index = Arc::new(ProjectIndex::empty("/tmp/cache.json"));
//!     let candidates = CandidateList::new(index.snapshot());
//!     let roots = vec![RootConfiguration::new("/home/u/dev", "")];
//!
//!     let scans = ScanSet::spawn(&roots, ScanOptions::default(), index, candidates.clone());
//!     for report in scans.wait_all().await {
//!         println!("{}: {} new", report.root.display(), report.discovered);
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::config::{Config, RootConfiguration, DEFAULT_MAX_DEPTH};
use crate::index::{CandidateList, ProjectIndex};
use crate::types::PathRecord;

/// Errors that end a single root's walk early.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The configured root is missing or not a directory.
    #[error("scan root does not exist: {0}")]
    RootNotFound(PathBuf),

    /// The walk hit a filesystem error.
    #[error("walking {root} failed: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// The scanner task panicked or was cancelled.
    #[error("scanner for {root} stopped unexpectedly: {message}")]
    Panicked { root: PathBuf, message: String },
}

/// Walk settings shared by every scanner.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Maximum depth below the root (the root itself is depth 0).
    pub max_depth: usize,

    /// Directory names marking a project root.
    pub markers: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            markers: vec![".git".to_string()],
        }
    }
}

impl From<&Config> for ScanOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_depth: config.max_depth,
            markers: config.markers.clone(),
        }
    }
}

/// Result of scanning one root.
#[derive(Debug)]
pub struct ScanReport {
    /// The root that was walked.
    pub root: PathBuf,

    /// Records this scanner added to the index.
    pub discovered: usize,

    /// `Err` if the walk stopped early; `discovered` still counts what was
    /// found before the failure.
    pub outcome: Result<(), ScanError>,
}

impl ScanReport {
    /// Returns `true` if the walk completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Walks `root`, adding newly found projects to `index` and `sink`.
///
/// Runs synchronously; [`ScanSet`] puts it on a blocking thread. The first
/// filesystem error ends the walk and is returned in the report.
pub fn scan_root(
    root: &RootConfiguration,
    options: &ScanOptions,
    index: &ProjectIndex,
    sink: &CandidateList,
) -> ScanReport {
    let mut discovered = 0;
    let outcome = walk(root, options, index, sink, &mut discovered);

    match &outcome {
        Ok(()) => info!(root = %root.path.display(), discovered, "Scan complete"),
        Err(e) => warn!(root = %root.path.display(), discovered, error = %e, "Scan aborted"),
    }

    ScanReport {
        root: root.path.clone(),
        discovered,
        outcome,
    }
}

fn walk(
    root: &RootConfiguration,
    options: &ScanOptions,
    index: &ProjectIndex,
    sink: &CandidateList,
    discovered: &mut usize,
) -> Result<(), ScanError> {
    if !root.path.is_dir() {
        return Err(ScanError::RootNotFound(root.path.clone()));
    }

    debug!(root = %root.path.display(), max_depth = options.max_depth, "Scanning root");

    let mut walker = WalkDir::new(&root.path)
        .follow_links(false)
        .max_depth(options.max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_type().is_dir());

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|source| ScanError::Walk {
            root: root.path.clone(),
            source,
        })?;

        if is_marker(entry.file_name(), &options.markers) {
            walker.skip_current_dir();
            continue;
        }

        if !contains_marker(entry.path(), &options.markers) {
            continue;
        }

        // Project boundary: nothing below it is indexed.
        walker.skip_current_dir();

        let record = PathRecord::derive(root, entry.path());
        if index.add(record.clone()) {
            trace!(path = %record.full_path().display(), session = %record.session_name(), "Discovered project");
            sink.push(record);
            *discovered += 1;
        }
    }

    Ok(())
}

fn is_marker(name: &std::ffi::OsStr, markers: &[String]) -> bool {
    markers.iter().any(|m| name == m.as_str())
}

fn contains_marker(dir: &Path, markers: &[String]) -> bool {
    markers.iter().any(|m| dir.join(m).is_dir())
}

/// The set of running scanners, one per root.
#[derive(Debug)]
pub struct ScanSet {
    tasks: JoinSet<ScanReport>,
    roots: HashMap<Id, PathBuf>,
}

impl ScanSet {
    /// Starts one blocking scan task per root.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        roots: &[RootConfiguration],
        options: ScanOptions,
        index: Arc<ProjectIndex>,
        sink: CandidateList,
    ) -> Self {
        let options = Arc::new(options);
        let mut tasks = JoinSet::new();
        let mut ids = HashMap::with_capacity(roots.len());

        for root in roots {
            let root = root.clone();
            let options = Arc::clone(&options);
            let index = Arc::clone(&index);
            let sink = sink.clone();
            let path = root.path.clone();

            let handle =
                tasks.spawn_blocking(move || scan_root(&root, &options, &index, &sink));
            ids.insert(handle.id(), path);
        }

        info!(roots = roots.len(), "Started scanners");

        Self { tasks, roots: ids }
    }

    /// Number of scanners that have not been collected yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Reports of scanners that already finished, without waiting.
    pub fn collect_finished(&mut self) -> Vec<ScanReport> {
        let mut reports = Vec::new();
        while let Some(result) = self.tasks.try_join_next_with_id() {
            reports.push(self.report_for(result));
        }
        reports
    }

    /// Waits for every scanner and returns all reports.
    pub async fn wait_all(mut self) -> Vec<ScanReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());
        while let Some(result) = self.tasks.join_next_with_id().await {
            reports.push(self.report_for(result));
        }
        reports
    }

    fn report_for(&mut self, result: Result<(Id, ScanReport), JoinError>) -> ScanReport {
        match result {
            Ok((id, report)) => {
                self.roots.remove(&id);
                report
            }
            Err(join_error) => {
                let root = self.roots.remove(&join_error.id()).unwrap_or_default();
                let message = if join_error.is_panic() {
                    "scanner panicked".to_string()
                } else {
                    join_error.to_string()
                };
                warn!(root = %root.display(), %message, "Scanner task failed");
                ScanReport {
                    root: root.clone(),
                    discovered: 0,
                    outcome: Err(ScanError::Panicked { root, message }),
                }
            }
        }
    }
}
