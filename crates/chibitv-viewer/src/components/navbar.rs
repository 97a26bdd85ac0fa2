//! Navbar component: top bar.
//!
//! Row 1: app title, selected service + provider, connection badge, clock.
//! Row 2: current programme with time window and remaining time.
//! Below, when disclosed: the programme's description entries.
//!
//! Not focusable; `d` toggles the disclosure from anywhere.

use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};

use chibitv_proto::model::Event;
use chibitv_proto::time::{format_duration, format_time, format_time_range};

use crate::{
    action::ComponentId,
    app_state::AppState,
    component::Component,
    theme::{
        C_ACCENT, C_BADGE_PENDING, C_MUTED, C_PLAYING, C_PRIMARY, C_PROVIDER, C_SECONDARY,
        C_TIME,
    },
    widgets::wrap::word_wrap,
};

/// Description lines shown at most; longer descriptions are cut with "…".
const MAX_DESCRIPTION_LINES: usize = 8;

pub struct Navbar;

impl Navbar {
    pub fn new() -> Self {
        Self
    }

    /// Rows the navbar needs at `width`, disclosure included.
    pub fn height(&self, state: &AppState, width: u16) -> u16 {
        2 + description_lines(state, width).len() as u16
    }
}

impl Default for Navbar {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for Navbar {
    fn id(&self) -> ComponentId {
        ComponentId::Navbar
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, state: &AppState) {
        if area.height == 0 {
            return;
        }
        frame.render_widget(Clear, area);

        let row1 = Rect { height: 1, ..area };
        frame.render_widget(Paragraph::new(build_title_row(state)), row1);
        frame.render_widget(
            Paragraph::new(Span::styled(
                format!("{} ", format_time(state.now)),
                Style::default().fg(C_SECONDARY),
            ))
            .alignment(Alignment::Right),
            row1,
        );

        if area.height < 2 {
            return;
        }
        let row2 = Rect {
            y: area.y + 1,
            height: 1,
            ..area
        };
        frame.render_widget(Paragraph::new(build_event_row(state)), row2);

        if area.height > 2 {
            let rest = Rect {
                y: area.y + 2,
                height: area.height - 2,
                ..area
            };
            let lines = description_lines(state, area.width);
            frame.render_widget(Paragraph::new(lines), rest);
        }
    }
}

fn build_title_row(state: &AppState) -> Line<'static> {
    let mut spans = vec![Span::styled(
        " chibitv",
        Style::default().fg(C_ACCENT).add_modifier(Modifier::BOLD),
    )];

    match state.selected_service() {
        Some(service) => {
            spans.push(Span::styled("  ·  ", Style::default().fg(C_MUTED)));
            spans.push(Span::styled(
                service.name.clone(),
                Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
            ));
            if !service.provider_name.is_empty() {
                spans.push(Span::raw("  "));
                spans.push(Span::styled(
                    service.provider_name.clone(),
                    Style::default().fg(C_PROVIDER),
                ));
            }
        }
        None if state.session.is_loaded() => {
            spans.push(Span::styled("  ·  ", Style::default().fg(C_MUTED)));
            spans.push(Span::styled("no service tuned", Style::default().fg(C_MUTED)));
        }
        None => {}
    }

    let badge = if state.session.mutation_pending() {
        Some(("switching", C_BADGE_PENDING))
    } else if state.session.stale {
        Some(("stale", C_ACCENT))
    } else {
        None
    };
    if let Some((text, color)) = badge {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("[{}]", text),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
    }

    Line::from(spans)
}

fn build_event_row(state: &AppState) -> Line<'static> {
    if !state.session.is_loaded() {
        let msg = if state.session.stale {
            format!("   cannot reach {}", state.server_url)
        } else {
            format!("   connecting to {}…", state.server_url)
        };
        return Line::from(Span::styled(msg, Style::default().fg(C_MUTED)));
    }

    let Some(event) = state.current_event() else {
        return Line::from(Span::styled(
            "   no programme information",
            Style::default().fg(C_MUTED),
        ));
    };

    let mut spans = vec![
        Span::styled(" ▶ ", Style::default().fg(C_PLAYING)),
        Span::styled(
            event.title.clone(),
            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(
            format_time_range(event.start_at, event.end_at),
            Style::default().fg(C_TIME),
        ),
    ];
    if let Some(left) = remaining(event, state) {
        spans.push(Span::styled(
            format!("  · {} left", left),
            Style::default().fg(C_SECONDARY),
        ));
    }
    if state.has_description() {
        let hint = if state.description_open {
            "  [d] hide details ▴"
        } else {
            "  [d] details ▾"
        };
        spans.push(Span::styled(hint, Style::default().fg(C_MUTED)));
    }
    Line::from(spans)
}

fn remaining(event: &Event, state: &AppState) -> Option<String> {
    event
        .is_current(state.now)
        .then(|| format_duration(state.now, event.end_at))
}

/// The disclosed description, empty when closed or when there is nothing to
/// show.  Starts with a blank spacer row.
fn description_lines(state: &AppState, width: u16) -> Vec<Line<'static>> {
    if !state.description_open {
        return Vec::new();
    }
    let Some(event) = state.current_event() else {
        return Vec::new();
    };

    let wrap_width = (width as usize).saturating_sub(6).max(10);
    let mut lines = vec![Line::default()];
    for entry in event.visible_description() {
        if !entry.name.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("   {}", entry.name),
                Style::default().fg(C_SECONDARY).add_modifier(Modifier::BOLD),
            )));
        }
        for text in word_wrap(&entry.content, wrap_width) {
            lines.push(Line::from(Span::styled(
                format!("     {}", text),
                Style::default().fg(C_PRIMARY),
            )));
        }
    }
    if lines.len() == 1 {
        return Vec::new();
    }
    if lines.len() > MAX_DESCRIPTION_LINES + 1 {
        lines.truncate(MAX_DESCRIPTION_LINES);
        lines.push(Line::from(Span::styled(
            "     …",
            Style::default().fg(C_MUTED),
        )));
    }
    lines
}
