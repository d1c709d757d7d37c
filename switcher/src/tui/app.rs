//! Picker state, input events, and the picker loop.
//!
//! # Architecture
//!
//! - [`PickerState`]: query, filtered view, and cursor. Pure; driven by key
//!   events and by [`PickerState::sync`] which pulls new candidates.
//! - [`EventHandler`]: async loop producing [`TuiEvent`]s from a tick
//!   interval and terminal input.
//! - [`run_picker`]: owns the terminal, feeds events to the state, and
//!   returns the user's [`Selection`].
//!
//! # Hot reload
//!
//! Scanners keep appending to the [`CandidateList`] while the picker is open.
//! Every tick re-reads the list length and pulls the new tail, so new
//! projects appear within one tick interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::style::{Color, Modifier, Style};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::TuiError;
use crate::index::CandidateList;
use crate::matcher;
use crate::tui::terminal::Tui;
use crate::tui::ui;

/// Header shown above the query line.
pub const DEFAULT_HEADER: &str = "Choose project";

/// Default tick rate for the event handler (60ms).
pub const DEFAULT_TICK_RATE_MS: u64 = 60;

/// Poll timeout for terminal input.
const DEFAULT_POLL_TIMEOUT_MS: u64 = 10;

/// Outcome of the picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Index into the [`CandidateList`].
    Chosen(usize),
    /// The user cancelled.
    Aborted,
}

/// Styles used by the picker.
///
/// [`Theme::from_env`] honours the [NO_COLOR](https://no-color.org/)
/// convention.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    /// Header label.
    pub header: Style,
    /// Match counter next to the header.
    pub counter: Style,
    /// The `>` before the query.
    pub prompt: Style,
    /// Query text.
    pub query: Style,
    /// Unselected candidate.
    pub candidate: Style,
    /// Candidate under the cursor.
    pub selected: Style,
    /// Hints and empty-state text.
    pub muted: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            header: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            counter: Style::default().fg(Color::Yellow),
            prompt: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            query: Style::default(),
            candidate: Style::default(),
            selected: Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
            muted: Style::default().fg(Color::DarkGray),
        }
    }
}

impl Theme {
    /// Modifier-only theme for terminals without color.
    #[must_use]
    pub fn monochrome() -> Self {
        Self {
            header: Style::default().add_modifier(Modifier::BOLD),
            counter: Style::default(),
            prompt: Style::default().add_modifier(Modifier::BOLD),
            query: Style::default(),
            candidate: Style::default(),
            selected: Style::default().add_modifier(Modifier::REVERSED),
            muted: Style::default().add_modifier(Modifier::DIM),
        }
    }

    /// [`Theme::monochrome`] if `NO_COLOR` is set, otherwise the default.
    #[must_use]
    pub fn from_env() -> Self {
        if std::env::var_os("NO_COLOR").is_some() {
            Self::monochrome()
        } else {
            Self::default()
        }
    }
}

/// Query, filtered candidates, and cursor of an open picker.
#[derive(Debug, Clone)]
pub struct PickerState {
    header: String,
    query: String,
    /// Display strings mirrored from the candidate list, same indices.
    items: Vec<String>,
    /// Indices into `items` matching the query, best first.
    matches: Vec<usize>,
    /// Position in `matches`.
    cursor: usize,
    pub theme: Theme,
}

impl PickerState {
    pub fn new(header: impl Into<String>, theme: Theme) -> Self {
        Self {
            header: header.into(),
            query: String::new(),
            items: Vec::new(),
            matches: Vec::new(),
            cursor: 0,
            theme,
        }
    }

    /// Pulls candidates appended since the last call.
    ///
    /// Returns `true` if anything new arrived. The highlighted candidate stays
    /// highlighted when new matches rank above it.
    pub fn sync(&mut self, candidates: &CandidateList) -> bool {
        if candidates.len() <= self.items.len() {
            return false;
        }
        let fresh = candidates.display_strings(self.items.len());
        if fresh.is_empty() {
            return false;
        }
        debug!(new = fresh.len(), total = self.items.len() + fresh.len(), "Picker received candidates");
        self.extend(fresh);
        true
    }

    /// Appends display strings and re-ranks.
    pub(crate) fn extend<I: IntoIterator<Item = String>>(&mut self, items: I) {
        self.items.extend(items);
        self.refilter();
    }

    /// Applies a key press. Returns a selection when the picker should close.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Selection> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Enter => return self.selected().map(Selection::Chosen),
            KeyCode::Esc => return Some(Selection::Aborted),
            KeyCode::Char('c' | 'd' | 'g') if ctrl => return Some(Selection::Aborted),
            KeyCode::Up => self.move_up(),
            KeyCode::Down => self.move_down(),
            KeyCode::Char('p' | 'k') if ctrl => self.move_up(),
            KeyCode::Char('n' | 'j') if ctrl => self.move_down(),
            KeyCode::Char('u') if ctrl => {
                self.query.clear();
                self.refilter_reset();
            }
            KeyCode::Char('w') if ctrl => {
                let trimmed = self.query.trim_end_matches(|c: char| c == '/' || c == ' ').len();
                let keep = self.query[..trimmed].rfind(['/', ' ']).map_or(0, |i| i + 1);
                self.query.truncate(keep);
                self.refilter_reset();
            }
            KeyCode::Backspace => {
                if self.query.pop().is_some() {
                    self.refilter_reset();
                }
            }
            KeyCode::Char(c) if !ctrl => {
                self.query.push(c);
                self.refilter_reset();
            }
            _ => {}
        }
        None
    }

    /// Candidate index under the cursor.
    #[must_use]
    pub fn selected(&self) -> Option<usize> {
        self.matches.get(self.cursor).copied()
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Matching candidate indices, best first.
    pub fn matches(&self) -> &[usize] {
        &self.matches
    }

    /// Display string of the candidate at `index`.
    pub fn item(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(String::as_str)
    }

    /// Number of candidates known to the picker.
    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Position of the cursor within [`PickerState::matches`].
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn move_down(&mut self) {
        if self.cursor + 1 < self.matches.len() {
            self.cursor += 1;
        }
    }

    /// Recomputes matches after the query changed; cursor goes to the top.
    fn refilter_reset(&mut self) {
        self.matches = matcher::rank(&self.query, &self.items);
        self.cursor = 0;
    }

    /// Recomputes matches after new items arrived, keeping the selection.
    fn refilter(&mut self) {
        let previous = self.selected();
        self.matches = matcher::rank(&self.query, &self.items);
        self.cursor = previous
            .and_then(|idx| self.matches.iter().position(|&m| m == idx))
            .unwrap_or(0);
    }
}

/// Events consumed by the picker loop.
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Periodic tick; drives the hot reload.
    Tick,
    /// Key press.
    Key(KeyEvent),
    /// Terminal resized to (columns, rows).
    Resize(u16, u16),
}

/// Produces [`TuiEvent`]s from a tick interval and terminal input.
///
/// Runs in its own task until the shutdown channel fires or the receiver is
/// dropped. Terminal input is read by a single blocking thread for the whole
/// run, so a key read from the terminal always reaches the channel.
#[derive(Debug)]
pub struct EventHandler {
    event_tx: mpsc::Sender<TuiEvent>,
    shutdown_rx: oneshot::Receiver<()>,
    tick_rate: Duration,
}

impl EventHandler {
    pub fn new(event_tx: mpsc::Sender<TuiEvent>, shutdown_rx: oneshot::Receiver<()>) -> Self {
        Self::with_tick_rate(
            event_tx,
            shutdown_rx,
            Duration::from_millis(DEFAULT_TICK_RATE_MS),
        )
    }

    pub fn with_tick_rate(
        event_tx: mpsc::Sender<TuiEvent>,
        shutdown_rx: oneshot::Receiver<()>,
        tick_rate: Duration,
    ) -> Self {
        Self {
            event_tx,
            shutdown_rx,
            tick_rate,
        }
    }

    pub fn tick_rate(&self) -> Duration {
        self.tick_rate
    }

    /// Runs the event loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the input reader panics.
    pub async fn run(self) -> std::io::Result<()> {
        self.run_with_input(Self::poll_terminal_event).await
    }

    /// Runs the event loop with `poll` as the input source.
    ///
    /// `poll` runs on one long-lived blocking thread and every event it
    /// returns is forwarded. The thread stops once shutdown is signalled or
    /// the receiver is gone.
    async fn run_with_input<F>(mut self, poll: F) -> std::io::Result<()>
    where
        F: FnMut(Duration) -> Option<TuiEvent> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let event_tx = self.event_tx.clone();
            let stop = Arc::clone(&stop);
            tokio::task::spawn_blocking(move || forward_input(poll, &event_tx, &stop))
        };

        let mut tick_interval = tokio::time::interval(self.tick_rate);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tick_interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => {
                    debug!("EventHandler received shutdown signal");
                    break;
                }

                _ = tick_interval.tick() => {
                    if self.event_tx.send(TuiEvent::Tick).await.is_err() {
                        break;
                    }
                }
            }
        }

        stop.store(true, Ordering::Relaxed);
        reader.await.map_err(|join_error| {
            tracing::error!("Terminal input reader panicked: {}", join_error);
            std::io::Error::other("terminal input reader panicked")
        })
    }

    /// Polls for one terminal event. Poll failures (no terminal) count as no event.
    fn poll_terminal_event(timeout: Duration) -> Option<TuiEvent> {
        match event::poll(timeout) {
            Ok(true) => match event::read() {
                Ok(crossterm_event) => Self::convert_crossterm_event(crossterm_event),
                Err(e) => {
                    tracing::trace!("Failed to read terminal event: {}", e);
                    None
                }
            },
            Ok(false) => None,
            Err(e) => {
                tracing::trace!("Failed to poll terminal: {}", e);
                std::thread::sleep(timeout);
                None
            }
        }
    }

    fn convert_crossterm_event(event: CrosstermEvent) -> Option<TuiEvent> {
        match event {
            CrosstermEvent::Key(key_event) => Some(TuiEvent::Key(key_event)),
            CrosstermEvent::Resize(cols, rows) => Some(TuiEvent::Resize(cols, rows)),
            CrosstermEvent::Mouse(_)
            | CrosstermEvent::FocusGained
            | CrosstermEvent::FocusLost
            | CrosstermEvent::Paste(_) => None,
        }
    }
}

/// Forwards events from `poll` until `stop` is set or the receiver closes.
fn forward_input<F>(mut poll: F, event_tx: &mpsc::Sender<TuiEvent>, stop: &AtomicBool)
where
    F: FnMut(Duration) -> Option<TuiEvent>,
{
    let timeout = Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS);
    while !stop.load(Ordering::Relaxed) {
        if let Some(event) = poll(timeout) {
            if event_tx.blocking_send(event).is_err() {
                break;
            }
        }
    }
}

/// Shows the picker over `candidates` until the user chooses or aborts.
///
/// The returned index refers to `candidates`.
///
/// # Errors
///
/// Returns [`TuiError`] if the terminal cannot be set up, drawn, or restored.
pub async fn run_picker(candidates: CandidateList, header: &str) -> Result<Selection, TuiError> {
    let mut tui = Tui::new().map_err(TuiError::TerminalInit)?;

    let (event_tx, mut event_rx) = mpsc::channel(100);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let event_task = tokio::spawn(EventHandler::new(event_tx, shutdown_rx).run());

    let mut state = PickerState::new(header, Theme::from_env());
    state.sync(&candidates);

    let mut dirty = true;
    let outcome = loop {
        if dirty {
            if let Err(e) = tui.draw(|frame| ui::render(frame, &state)) {
                break Err(TuiError::Render(e));
            }
            dirty = false;
        }

        match event_rx.recv().await {
            Some(TuiEvent::Tick) => dirty = state.sync(&candidates),
            Some(TuiEvent::Key(key)) => {
                if let Some(selection) = state.handle_key(key) {
                    break Ok(selection);
                }
                dirty = true;
            }
            Some(TuiEvent::Resize(..)) => dirty = true,
            None => break Err(TuiError::Event("input event stream closed".to_string())),
        }
    };

    drop(event_rx);
    let _ = shutdown_tx.send(());
    if let Err(e) = event_task.await {
        debug!(error = %e, "Event handler task ended abnormally");
    }
    tui.restore().map_err(TuiError::Restore)?;

    debug!(?outcome, query = state.query(), "Picker closed");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PathRecord;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_str(state: &mut PickerState, text: &str) {
        for c in text.chars() {
            assert_eq!(state.handle_key(key(KeyCode::Char(c))), None);
        }
    }

    fn state_with(items: &[&str]) -> PickerState {
        let mut state = PickerState::new(DEFAULT_HEADER, Theme::default());
        state.extend(items.iter().map(|s| s.to_string()));
        state
    }

    #[test]
    fn enter_chooses_top_match() {
        let mut state = state_with(&["/dev/tool", "/dev/api"]);
        type_str(&mut state, "api");

        assert_eq!(state.handle_key(key(KeyCode::Enter)), Some(Selection::Chosen(1)));
    }

    #[test]
    fn enter_without_matches_is_ignored() {
        let mut state = state_with(&["/dev/tool"]);
        type_str(&mut state, "zzz");

        assert!(state.matches().is_empty());
        assert_eq!(state.handle_key(key(KeyCode::Enter)), None);
    }

    #[test]
    fn escape_and_ctrl_c_abort() {
        let mut state = state_with(&["/dev/tool"]);
        assert_eq!(state.handle_key(key(KeyCode::Esc)), Some(Selection::Aborted));
        assert_eq!(state.handle_key(ctrl('c')), Some(Selection::Aborted));
        assert_eq!(state.handle_key(ctrl('d')), Some(Selection::Aborted));
    }

    #[test]
    fn cursor_moves_within_bounds() {
        let mut state = state_with(&["/a", "/b", "/c"]);

        state.handle_key(key(KeyCode::Up));
        assert_eq!(state.cursor(), 0);

        state.handle_key(key(KeyCode::Down));
        state.handle_key(ctrl('n'));
        state.handle_key(key(KeyCode::Down));
        assert_eq!(state.cursor(), 2);

        state.handle_key(ctrl('p'));
        assert_eq!(state.selected(), Some(1));
    }

    #[test]
    fn backspace_and_clear_edit_query() {
        let mut state = state_with(&["/dev/api"]);
        type_str(&mut state, "apx");
        assert!(state.matches().is_empty());

        state.handle_key(key(KeyCode::Backspace));
        assert_eq!(state.query(), "ap");
        assert_eq!(state.matches(), &[0]);

        state.handle_key(ctrl('u'));
        assert_eq!(state.query(), "");
    }

    #[test]
    fn ctrl_w_deletes_last_path_segment() {
        let mut state = state_with(&[]);
        type_str(&mut state, "dev/tea");
        state.handle_key(ctrl('w'));
        assert_eq!(state.query(), "dev/");
        state.handle_key(ctrl('w'));
        assert_eq!(state.query(), "");
    }

    #[test]
    fn release_events_are_ignored() {
        let mut state = state_with(&["/a"]);
        let mut release = key(KeyCode::Esc);
        release.kind = KeyEventKind::Release;
        assert_eq!(state.handle_key(release), None);
    }

    #[test]
    fn sync_pulls_new_candidates_and_keeps_selection() {
        let list = CandidateList::new(vec![
            PathRecord::new("/dev/a", "a"),
            PathRecord::new("/dev/b", "b"),
        ]);
        let mut state = PickerState::new(DEFAULT_HEADER, Theme::default());

        assert!(state.sync(&list));
        state.handle_key(key(KeyCode::Down));
        assert_eq!(state.selected(), Some(1));

        assert!(!state.sync(&list));

        list.push(PathRecord::new("/dev/c", "c"));
        assert!(state.sync(&list));
        assert_eq!(state.total(), 3);
        assert_eq!(state.selected(), Some(1));
        assert_eq!(state.item(2), Some("/dev/c"));
    }

    #[test]
    fn monochrome_theme_has_no_colors() {
        let theme = Theme::monochrome();
        for style in [theme.header, theme.counter, theme.prompt, theme.selected, theme.muted] {
            assert_eq!(style.fg, None);
            assert_eq!(style.bg, None);
        }
    }

    #[test]
    fn event_handler_tick_rate() {
        let (event_tx, _event_rx) = mpsc::channel(10);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let handler = EventHandler::with_tick_rate(event_tx, shutdown_rx, Duration::from_millis(33));
        assert_eq!(handler.tick_rate(), Duration::from_millis(33));
    }

    #[tokio::test]
    async fn event_handler_emits_ticks_and_stops_on_shutdown() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handler = EventHandler::with_tick_rate(event_tx, shutdown_rx, Duration::from_millis(5));
        let task = tokio::spawn(handler.run());

        let first = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match event_rx.recv().await {
                    Some(TuiEvent::Tick) => break true,
                    Some(_) => continue,
                    None => break false,
                }
            }
        })
        .await
        .unwrap();
        assert!(first);

        drop(event_rx);
        let _ = shutdown_tx.send(());
        let result = tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn event_handler_delivers_every_key_while_ticking() {
        let (event_tx, mut event_rx) = mpsc::channel(100);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handler = EventHandler::with_tick_rate(event_tx, shutdown_rx, Duration::from_millis(1));

        let mut typed: std::collections::VecDeque<char> = "switcher".chars().collect();
        let input = move |timeout: Duration| {
            std::thread::sleep(timeout);
            typed.pop_front().map(|c| TuiEvent::Key(key(KeyCode::Char(c))))
        };
        let task = tokio::spawn(handler.run_with_input(input));

        let mut received = String::new();
        let mut ticks = 0;
        tokio::time::timeout(Duration::from_secs(5), async {
            while received.len() < "switcher".len() {
                match event_rx.recv().await {
                    Some(TuiEvent::Key(KeyEvent { code: KeyCode::Char(c), .. })) => received.push(c),
                    Some(TuiEvent::Tick) => ticks += 1,
                    Some(_) => {}
                    None => break,
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(received, "switcher");
        assert!(ticks > 0);

        drop(event_rx);
        let _ = shutdown_tx.send(());
        let result = tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn convert_ignores_mouse_and_focus() {
        assert!(EventHandler::convert_crossterm_event(CrosstermEvent::FocusGained).is_none());
        assert!(matches!(
            EventHandler::convert_crossterm_event(CrosstermEvent::Resize(80, 24)),
            Some(TuiEvent::Resize(80, 24))
        ));
    }
}
