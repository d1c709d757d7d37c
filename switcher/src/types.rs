//! Core record type for discovered projects.
//!
//! A [`PathRecord`] pairs the absolute path of a project root with the name
//! of the tmux session that hosts it. Records are plain values: two records
//! are equal exactly when both fields are equal, which makes them usable as
//! set keys in the [`index`](crate::index) module.
//!
//! Field names serialize as `FullPath` / `SessionName` so cache files written
//! by earlier releases of the tool keep loading.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::RootConfiguration;

/// Characters tmux refuses in session names; it silently rewrites them to `_`.
const TMUX_RESERVED_CHARS: [char; 2] = ['.', ':'];

/// One discoverable project: where it lives and which session it maps to.
///
/// Both fields are fixed at construction time. Use [`PathRecord::derive`]
/// to compute the session name from a root configuration, or
/// [`PathRecord::new`] when both values are already known (for example when
/// loading the cache).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathRecord {
    #[serde(rename = "FullPath")]
    full_path: PathBuf,

    #[serde(rename = "SessionName")]
    session_name: String,
}

impl PathRecord {
    /// Creates a record from an explicit path and session name.
    #[must_use]
    pub fn new(full_path: impl Into<PathBuf>, session_name: impl Into<String>) -> Self {
        Self {
            full_path: full_path.into(),
            session_name: session_name.into(),
        }
    }

    /// Derives the record for a project found under `root`.
    ///
    /// The session name is the root's prefix followed by the part of
    /// `full_path` below `root.path`, with leading separators removed.
    ///
    /// # Example
    ///
    /// ```
    /// use std::path::Path;
    /// use project_switcher::config::RootConfiguration;
    /// use project_switcher::types::PathRecord;
    ///
    /// let root = RootConfiguration::new("/home/u/dev", "w-");
    /// let record = PathRecord::derive(&root, Path::new("/home/u/dev/teamA/svc"));
    /// assert_eq!(record.session_name(), "w-teamA/svc");
    /// ```
    #[must_use]
    pub fn derive(root: &RootConfiguration, full_path: &Path) -> Self {
        let session_name = derive_session_name(root, full_path);
        Self::new(full_path, session_name)
    }

    /// Returns the record with its session name rewritten the way tmux would.
    ///
    /// Stores written by earlier releases may hold names containing `.` or
    /// `:`; these never match a live session and would duplicate the derived
    /// record for the same path.
    #[must_use]
    pub fn normalized(self) -> Self {
        if !self.session_name.contains(TMUX_RESERVED_CHARS) {
            return self;
        }
        let session_name = sanitize_session_name(&self.session_name);
        Self::new(self.full_path, session_name)
    }

    /// Absolute path of the project root directory.
    #[must_use]
    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    /// Name of the tmux session for this project.
    #[must_use]
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// String shown to the user in the picker.
    #[must_use]
    pub fn display(&self) -> String {
        self.full_path.display().to_string()
    }
}

impl fmt::Display for PathRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.full_path.display(), self.session_name)
    }
}

/// Computes `prefix + suffix` where `suffix` is `full_path` relative to the root.
///
/// A project that *is* the root directory uses the root's last component as
/// its suffix so it still gets a usable name.
fn derive_session_name(root: &RootConfiguration, full_path: &Path) -> String {
    let suffix = match full_path.strip_prefix(&root.path) {
        Ok(relative) if relative.as_os_str().is_empty() => full_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Ok(relative) => relative.to_string_lossy().into_owned(),
        Err(_) => full_path.to_string_lossy().into_owned(),
    };
    let suffix = suffix.trim_start_matches(std::path::MAIN_SEPARATOR);

    let mut name = String::with_capacity(root.prefix.len() + suffix.len());
    name.push_str(&root.prefix);
    name.push_str(suffix);
    sanitize_session_name(&name)
}

/// Rewrites characters tmux would rewrite anyway, so the stored name matches
/// what `list-sessions` reports.
#[must_use]
pub fn sanitize_session_name(name: &str) -> String {
    name.chars()
        .map(|c| if TMUX_RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect()
}
