//! Rendering for the picker.
//!
//! ```text
//! Choose project  3/42
//! > query
//! ▶ /home/u/dev/api
//!   /home/u/dev/web
//! ```

use ratatui::{
    layout::{Constraint, Layout, Rect},
    text::{Line, Span},
    widgets::{List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::tui::app::PickerState;

const CURSOR_MARKER: &str = "▶ ";

/// Draws the whole picker into `frame`.
pub fn render(frame: &mut Frame, state: &PickerState) {
    let [header_area, query_area, list_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(frame.area());

    render_header(frame, header_area, state);
    render_query(frame, query_area, state);
    render_candidates(frame, list_area, state);
}

fn render_header(frame: &mut Frame, area: Rect, state: &PickerState) {
    let theme = &state.theme;
    let line = Line::from(vec![
        Span::styled(state.header().to_string(), theme.header),
        Span::raw("  "),
        Span::styled(
            format!("{}/{}", state.matches().len(), state.total()),
            theme.counter,
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_query(frame: &mut Frame, area: Rect, state: &PickerState) {
    let theme = &state.theme;
    let line = Line::from(vec![
        Span::styled("> ", theme.prompt),
        Span::styled(state.query().to_string(), theme.query),
    ]);
    frame.render_widget(Paragraph::new(line), area);

    // Terminal cursor sits after the query text.
    let width = u16::try_from(state.query().chars().count()).unwrap_or(u16::MAX);
    let x = area.x.saturating_add(2).saturating_add(width);
    if area.height > 0 && x < area.right() {
        frame.set_cursor_position((x, area.y));
    }
}

fn render_candidates(frame: &mut Frame, area: Rect, state: &PickerState) {
    let theme = &state.theme;

    if state.matches().is_empty() {
        let message = if state.total() == 0 {
            "Scanning for projects..."
        } else {
            "No matching projects"
        };
        frame.render_widget(Paragraph::new(Span::styled(message, theme.muted)), area);
        return;
    }

    let items: Vec<ListItem> = state
        .matches()
        .iter()
        .filter_map(|&idx| state.item(idx))
        .map(|text| ListItem::new(text.to_string()).style(theme.candidate))
        .collect();

    let list = List::new(items)
        .highlight_style(theme.selected)
        .highlight_symbol(CURSOR_MARKER);
    let mut list_state = ListState::default().with_selected(Some(state.cursor()));
    frame.render_stateful_widget(list, area, &mut list_state);
}
