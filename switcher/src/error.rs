//! Error types for the project switcher.
//!
//! Each module owns its error enum; [`SwitcherError`] collects them so library
//! callers can use a single `Result` type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::index::StoreError;
use crate::scanner::ScanError;
use crate::session::MultiplexerError;

/// Any failure the switcher can report.
///
/// # Examples
///
/// ```
/// use project_switcher::error::{Result, SwitcherError};
/// use project_switcher::index::ProjectIndex;
///
/// fn known_projects(path: &str) -> Result<usize> {
///     let index = ProjectIndex::load(path, false)?;
///     Ok(index.len())
/// }
///
/// assert_eq!(known_projects("/nonexistent/cache.json").unwrap(), 0);
/// ```
#[derive(Error, Debug)]
pub enum SwitcherError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The persistent project cache could not be read or written.
    #[error("cache error: {0}")]
    Store(#[from] StoreError),

    /// A root directory scan failed.
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// A tmux command failed.
    #[error("tmux error: {0}")]
    Multiplexer(#[from] MultiplexerError),

    /// The picker failed.
    #[error("TUI error: {0}")]
    Tui(#[from] TuiError),
}

/// Errors from the interactive picker.
#[derive(Error, Debug)]
pub enum TuiError {
    /// Terminal initialization failed.
    #[error("failed to initialize terminal: {0}")]
    TerminalInit(#[source] std::io::Error),

    /// Terminal rendering failed.
    #[error("render error: {0}")]
    Render(#[source] std::io::Error),

    /// Restoring the terminal after the picker closed failed.
    #[error("failed to restore terminal: {0}")]
    Restore(#[source] std::io::Error),

    /// The input event stream stopped.
    #[error("event error: {0}")]
    Event(String),
}

/// A specialized `Result` type for switcher operations.
pub type Result<T> = std::result::Result<T, SwitcherError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::path::PathBuf;

    #[test]
    fn config_error_display() {
        let err = SwitcherError::from(ConfigError::NoHomeDirectory);
        assert_eq!(
            err.to_string(),
            "configuration error: failed to determine home directory"
        );
    }

    #[test]
    fn scan_error_conversion() {
        let err: SwitcherError = ScanError::RootNotFound(PathBuf::from("/gone")).into();
        assert!(matches!(err, SwitcherError::Scan(_)));
        assert_eq!(err.to_string(), "scan error: scan root does not exist: /gone");
    }

    #[test]
    fn multiplexer_error_keeps_diagnostic() {
        let err: SwitcherError = MultiplexerError::Failed {
            command: "tmux switch-client -t =proj".to_string(),
            details: "no current client".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "tmux error: `tmux switch-client -t =proj` failed: no current client"
        );
    }

    #[test]
    fn store_error_source_chain() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SwitcherError = StoreError::Write {
            path: PathBuf::from("/x/config.json"),
            source: io_err,
        }
        .into();

        let store = err.source().expect("store error");
        assert!(store.source().is_some());
    }

    #[test]
    fn tui_error_display() {
        let err = TuiError::TerminalInit(std::io::Error::other("raw mode failed"));
        assert_eq!(err.to_string(), "failed to initialize terminal: raw mode failed");

        let err = SwitcherError::from(TuiError::Event("closed".to_string()));
        assert_eq!(err.to_string(), "TUI error: event error: closed");
    }

    #[test]
    fn result_type_alias_works() {
        fn failing() -> Result<()> {
            Err(TuiError::Event("test".to_string()).into())
        }
        assert!(failing().is_err());
    }
}
