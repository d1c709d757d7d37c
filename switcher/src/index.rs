//! Persistent, deduplicated index of known projects.
//!
//! This module holds the two collections the switcher works with:
//!
//! - [`ProjectIndex`]: the set of every [`PathRecord`] ever discovered. It is
//!   loaded from the cache file at startup, mutated concurrently by the
//!   scanners, and written back once at the end of the run. It is the
//!   deduplication oracle.
//! - [`CandidateList`]: the append-only list the picker displays. It starts as
//!   a snapshot of the index and grows as scanners report new projects.
//!
//! # Store format
//!
//! ```json
//! {"paths":[{"FullPath":"/home/u/dev/api","SessionName":"api"}]}
//! ```
//!
//! Records are written sorted so the file is deterministic. A missing file
//! loads as an empty index.
//!
//! # Thread Safety
//!
//! Both types are internally synchronized. A membership check and the
//! insertion that follows it happen under one lock acquisition in
//! [`ProjectIndex::add`], so two scanners finding the same path cannot both
//! insert it.

use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::PathRecord;

/// Errors from loading or persisting the project index.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store exists but could not be read.
    #[error("could not read cache file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The store was read but its content is not a valid index.
    #[error("could not decode cache file {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The store could not be written.
    #[error("could not write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// On-disk document. `paths` may be `null` in stores written by older releases.
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    paths: Option<Vec<PathRecord>>,
}

#[derive(Debug, Default)]
struct IndexInner {
    members: HashSet<PathRecord>,
    /// Insertion order, used for presentation.
    order: Vec<PathRecord>,
}

impl IndexInner {
    fn insert(&mut self, record: PathRecord) -> bool {
        if self.members.contains(&record) {
            return false;
        }
        self.members.insert(record.clone());
        self.order.push(record);
        true
    }
}

/// The set of known projects, backed by a cache file.
#[derive(Debug)]
pub struct ProjectIndex {
    store_path: PathBuf,
    inner: Mutex<IndexInner>,
}

impl ProjectIndex {
    /// Creates an empty index that will persist to `store_path`.
    #[must_use]
    pub fn empty(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            inner: Mutex::new(IndexInner::default()),
        }
    }

    /// Loads the index from `store_path`.
    ///
    /// A missing store yields an empty index. With `clear` set the store is
    /// not read at all, so a corrupt cache can be discarded with `--clear`.
    /// Session names are normalized on the way in, so a legacy `site.io`
    /// entry collapses into the `site_io` record a scan derives.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Read`] if the store exists but cannot be read
    /// - [`StoreError::Format`] if its content cannot be decoded
    pub fn load(store_path: impl Into<PathBuf>, clear: bool) -> Result<Self, StoreError> {
        let index = Self::empty(store_path);

        if clear {
            info!(path = %index.store_path.display(), "Clearing project cache");
            return Ok(index);
        }

        let bytes = match fs::read(&index.store_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %index.store_path.display(), "No project cache yet");
                return Ok(index);
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: index.store_path.clone(),
                    source,
                })
            }
        };

        let document: StoreDocument =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Format {
                path: index.store_path.clone(),
                source,
            })?;

        {
            let mut inner = index.lock();
            for record in document.paths.unwrap_or_default() {
                inner.insert(record.normalized());
            }
        }

        info!(
            path = %index.store_path.display(),
            count = index.len(),
            "Loaded project cache"
        );

        Ok(index)
    }

    /// Inserts `record` unless it is already present.
    ///
    /// Returns `true` if the record was new. The check and the insertion are
    /// one critical section.
    pub fn add(&self, record: PathRecord) -> bool {
        self.lock().insert(record)
    }

    /// Returns `true` if `record` is in the index.
    #[must_use]
    pub fn contains(&self, record: &PathRecord) -> bool {
        self.lock().members.contains(record)
    }

    /// All records in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PathRecord> {
        self.lock().order.clone()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// Returns `true` if the index holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the backing store.
    #[must_use]
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Writes the full index to the store, replacing it atomically.
    ///
    /// The document is written to a temporary file in the store's directory
    /// and renamed over the target, so readers see either the old or the new
    /// file. Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if any step fails.
    pub fn persist(&self) -> Result<(), StoreError> {
        let mut records = self.snapshot();
        records.sort();
        let count = records.len();

        self.write_document(&StoreDocument {
            paths: Some(records),
        })
        .map_err(|source| StoreError::Write {
            path: self.store_path.clone(),
            source,
        })?;

        info!(path = %self.store_path.display(), count, "Persisted project cache");
        Ok(())
    }

    fn write_document(&self, document: &StoreDocument) -> io::Result<()> {
        let parent = match self.store_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        create_private_dir(&parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer(&mut writer, document)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.store_path).map_err(|e| e.error)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, IndexInner> {
        // A panicking scanner must not take the index down with it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

/// Append-only list of candidates shown by the picker.
///
/// Cloning produces another handle to the same list. Appends are visible to
/// every handle on its next read and keep their relative order.
#[derive(Debug, Clone, Default)]
pub struct CandidateList {
    items: Arc<RwLock<Vec<PathRecord>>>,
}

impl CandidateList {
    /// Creates a list seeded with `initial`.
    #[must_use]
    pub fn new(initial: Vec<PathRecord>) -> Self {
        Self {
            items: Arc::new(RwLock::new(initial)),
        }
    }

    /// Appends a record.
    pub fn push(&self, record: PathRecord) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Current number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if there are no candidates yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidate at `index`, if it exists.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<PathRecord> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    /// Candidates appended at or after position `start`.
    #[must_use]
    pub fn since(&self, start: usize) -> Vec<PathRecord> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Copy of the whole list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PathRecord> {
        self.since(0)
    }

    /// Display strings (the full paths) for candidates from `start` onward.
    #[must_use]
    pub fn display_strings(&self, start: usize) -> Vec<String> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        items
            .get(start..)
            .map(|tail| tail.iter().map(PathRecord::display).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn record(path: &str, name: &str) -> PathRecord {
        PathRecord::new(path, name)
    }

    fn store_in(dir: &TempDir) -> PathBuf {
        dir.path().join("project").join("config.json")
    }

    #[test]
    fn load_missing_store_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let index = ProjectIndex::load(store_in(&temp_dir), false).unwrap();

        assert!(index.is_empty());
    }

    #[test]
    fn add_is_idempotent() {
        let index = ProjectIndex::empty("/unused");
        let r = record("/home/u/dev/api", "api");

        assert!(index.add(r.clone()));
        assert!(!index.add(r.clone()));

        assert_eq!(index.snapshot(), vec![r.clone()]);
        assert!(index.contains(&r));
    }

    #[test]
    fn contains_requires_both_fields() {
        let index = ProjectIndex::empty("/unused");
        index.add(record("/a", "x"));

        assert!(index.contains(&record("/a", "x")));
        assert!(!index.contains(&record("/a", "y")));
    }

    #[test]
    fn snapshot_keeps_insertion_order() {
        let index = ProjectIndex::empty("/unused");
        index.add(record("/z", "z"));
        index.add(record("/a", "a"));
        index.add(record("/m", "m"));

        let paths: Vec<_> = index.snapshot().iter().map(PathRecord::display).collect();
        assert_eq!(paths, vec!["/z", "/a", "/m"]);
    }

    #[test]
    fn persist_then_load_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let path = store_in(&temp_dir);

        let index = ProjectIndex::empty(&path);
        index.add(record("/home/u/dev/b", "b"));
        index.add(record("/home/u/dev/a", "a"));
        index.add(record("/home/u/work/a", "w-a"));
        index.persist().unwrap();

        let loaded = ProjectIndex::load(&path, false).unwrap();
        let expected: HashSet<_> = index.snapshot().into_iter().collect();
        let actual: HashSet<_> = loaded.snapshot().into_iter().collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn persisted_file_is_sorted_and_uses_legacy_names() {
        let temp_dir = TempDir::new().unwrap();
        let path = store_in(&temp_dir);

        let index = ProjectIndex::empty(&path);
        index.add(record("/b", "b"));
        index.add(record("/a", "a"));
        index.persist().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            r#"{"paths":[{"FullPath":"/a","SessionName":"a"},{"FullPath":"/b","SessionName":"b"}]}"#
        );
    }

    #[test]
    fn persist_leaves_no_temporary_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = store_in(&temp_dir);

        let index = ProjectIndex::empty(&path);
        index.add(record("/a", "a"));
        index.persist().unwrap();
        index.persist().unwrap();

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("config.json")]);
    }

    #[test]
    fn clear_discards_existing_records() {
        let temp_dir = TempDir::new().unwrap();
        let path = store_in(&temp_dir);

        let index = ProjectIndex::empty(&path);
        for i in 0..5 {
            index.add(record(&format!("/p{i}"), &format!("p{i}")));
        }
        index.persist().unwrap();

        let cleared = ProjectIndex::load(&path, true).unwrap();
        assert_eq!(cleared.len(), 0);
    }

    #[test]
    fn clear_ignores_corrupt_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = store_in(&temp_dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();

        let cleared = ProjectIndex::load(&path, true).unwrap();
        assert!(cleared.is_empty());
    }

    #[test]
    fn corrupt_store_is_format_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = store_in(&temp_dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{\"paths\": [").unwrap();

        let err = ProjectIndex::load(&path, false).unwrap_err();
        assert!(matches!(err, StoreError::Format { .. }));
    }

    #[test]
    fn unreadable_store_is_read_error() {
        let temp_dir = TempDir::new().unwrap();
        // A directory exists at the store path but cannot be read as a file.
        let path = store_in(&temp_dir);
        fs::create_dir_all(&path).unwrap();

        let err = ProjectIndex::load(&path, false).unwrap_err();
        assert!(matches!(err, StoreError::Read { .. }));
    }

    #[test]
    fn null_paths_load_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = store_in(&temp_dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"paths":null}"#).unwrap();

        let index = ProjectIndex::load(&path, false).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn duplicate_records_in_store_collapse() {
        let temp_dir = TempDir::new().unwrap();
        let path = store_in(&temp_dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"{"paths":[{"FullPath":"/a","SessionName":"a"},{"FullPath":"/a","SessionName":"a"}]}"#,
        )
        .unwrap();

        let index = ProjectIndex::load(&path, false).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn write_error_when_parent_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let index = ProjectIndex::empty(blocker.join("config.json"));
        index.add(record("/a", "a"));

        let err = index.persist().unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
    }

    #[test]
    fn concurrent_adds_never_duplicate() {
        let index = Arc::new(ProjectIndex::empty("/unused"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    let mut inserted = 0;
                    for i in 0..100 {
                        if index.add(record(&format!("/p{i}"), &format!("p{i}"))) {
                            inserted += 1;
                        }
                    }
                    inserted
                })
            })
            .collect();

        let total_inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(total_inserted, 100);
        assert_eq!(index.len(), 100);
    }

    #[test]
    fn candidate_list_handles_share_appends() {
        let list = CandidateList::new(vec![record("/a", "a")]);
        let other = list.clone();

        other.push(record("/b", "b"));

        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1), Some(record("/b", "b")));
        assert_eq!(list.since(1), vec![record("/b", "b")]);
        assert!(list.since(5).is_empty());
        assert_eq!(list.get(2), None);
        assert_eq!(list.display_strings(0), vec!["/a", "/b"]);
        assert_eq!(list.display_strings(1), vec!["/b"]);
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::Write {
            path: PathBuf::from("/x/config.json"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "could not write cache file /x/config.json: denied");
    }
}
