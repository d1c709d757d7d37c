//! Full-screen fuzzy picker built with [`ratatui`].
//!
//! - [`app`]: picker state, input events, and [`run_picker`]
//! - [`ui`]: frame rendering
//! - [`terminal`]: terminal setup and teardown with panic handling

pub mod app;
pub mod terminal;
pub mod ui;

pub use app::{run_picker, PickerState, Selection, Theme, DEFAULT_HEADER};
pub use terminal::{install_panic_hook, Tui};
