//! Project switcher: pick a git project, land in its tmux session.
//!
//! The `project` binary loads a cached index of known projects, rescans the
//! configured root directories in the background, shows every project in a
//! fuzzy picker that grows as scanners find more, and then creates, switches
//! to, or attaches the tmux session for the chosen project.
//!
//! # Modules
//!
//! - [`types`]: [`PathRecord`] and session-name derivation
//! - [`config`]: config file, root directories, file locations
//! - [`index`]: the persisted [`ProjectIndex`] and the live [`CandidateList`]
//! - [`scanner`]: concurrent discovery of project roots
//! - [`matcher`]: fuzzy scoring used by the picker
//! - [`tui`]: the interactive picker
//! - [`session`]: tmux session reconciliation
//! - [`error`]: crate-wide error type

pub mod config;
pub mod error;
pub mod index;
pub mod matcher;
pub mod scanner;
pub mod session;
pub mod tui;
pub mod types;

pub use config::{Config, ConfigError, RootConfiguration};
pub use error::{Result, SwitcherError, TuiError};
pub use index::{CandidateList, ProjectIndex, StoreError};
pub use scanner::{scan_root, ScanError, ScanOptions, ScanReport, ScanSet};
pub use session::{
    plan, Multiplexer, MultiplexerError, MultiplexerState, SessionAction, SessionReconciler, Tmux,
};
pub use tui::{run_picker, Selection};
pub use types::PathRecord;
