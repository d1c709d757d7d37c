//! Terminal setup and RAII restoration for the picker.
//!
//! The picker draws on stderr so stdout stays free for scripted callers.
//! [`Tui`] enters raw mode and the alternate screen on creation and leaves
//! both when dropped. [`install_panic_hook`] does the same restoration before
//! a panic message is printed, so a crash never leaves the shell unusable.

use std::io::{self, Stderr};
use std::panic;

use crossterm::{
    cursor::{Hide, Show},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

/// Installs a panic hook that restores the terminal before reporting.
///
/// Call once at startup, before creating a [`Tui`].
pub fn install_panic_hook() {
    let previous_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        // Best effort: the terminal may already be in a bad state.
        let _ = execute!(io::stderr(), Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();

        previous_hook(panic_info);
    }));
}

/// A ratatui terminal on stderr that restores itself when dropped.
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stderr>>,
    restored: bool,
}

impl Tui {
    /// Enables raw mode, enters the alternate screen and hides the cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if any initialization step fails. Steps that already
    /// succeeded are undone first.
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;

        let mut stderr = io::stderr();
        if let Err(e) = execute!(stderr, EnterAlternateScreen, Hide) {
            let _ = disable_raw_mode();
            return Err(e);
        }

        let terminal = match Terminal::new(CrosstermBackend::new(stderr)) {
            Ok(t) => t,
            Err(e) => {
                let _ = execute!(io::stderr(), Show, LeaveAlternateScreen);
                let _ = disable_raw_mode();
                return Err(e);
            }
        };

        Ok(Self {
            terminal,
            restored: false,
        })
    }

    /// Draws one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the terminal fails.
    pub fn draw<F>(&mut self, f: F) -> io::Result<()>
    where
        F: FnOnce(&mut ratatui::Frame),
    {
        self.terminal.draw(f)?;
        Ok(())
    }

    /// Restores the terminal. Later calls and the drop are no-ops.
    ///
    /// # Errors
    ///
    /// Unlike [`Drop`], errors are returned to the caller.
    pub fn restore(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;

        execute!(io::stderr(), Show, LeaveAlternateScreen)?;
        disable_raw_mode()?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        // Errors ignored: we may be unwinding.
        let _ = execute!(io::stderr(), Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}
