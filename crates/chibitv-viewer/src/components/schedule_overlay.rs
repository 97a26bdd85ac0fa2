//! ScheduleOverlay component: the menu popup listing upcoming programmes of
//! the selected service, the one on air marked.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};

use chibitv_proto::model::Event;
use chibitv_proto::schedule;
use chibitv_proto::time::{format_duration, format_time_range};
use chrono::NaiveDateTime;

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    components::help_overlay::centered_rect,
    theme::{C_ACCENT, C_MUTED, C_PLAYING, C_PRIMARY, C_SECONDARY, C_TIME},
    widgets::pane_chrome::{pane_chrome, Badge},
};

pub struct ScheduleOverlay {
    scroll: usize,
}

impl ScheduleOverlay {
    pub fn new() -> Self {
        Self { scroll: 0 }
    }

    fn scroll_by(&mut self, delta: isize) {
        self.scroll = self.scroll.saturating_add_signed(delta);
    }
}

impl Default for ScheduleOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for ScheduleOverlay {
    fn id(&self) -> ComponentId {
        ComponentId::ScheduleOverlay
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.scroll_by(-1),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_by(1),
            KeyCode::PageUp => self.scroll_by(-10),
            KeyCode::PageDown => self.scroll_by(10),
            KeyCode::Home | KeyCode::Char('g') => self.scroll = 0,
            KeyCode::Esc => return vec![Action::CloseMenu],
            _ => {}
        }
        vec![]
    }

    fn handle_mouse(&mut self, event: MouseEvent, _state: &AppState) -> Vec<Action> {
        match event.kind {
            MouseEventKind::ScrollUp => self.scroll_by(-1),
            MouseEventKind::ScrollDown => self.scroll_by(1),
            _ => {}
        }
        vec![]
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) {
        if matches!(
            action,
            Action::ToggleMenu | Action::CloseMenu | Action::SelectService(_)
        ) {
            self.scroll = 0;
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, state: &AppState) {
        if !state.menu_open {
            return;
        }

        let body = match state.schedule() {
            Some(events) if events.is_empty() => {
                vec![message_line("no upcoming programmes", C_MUTED)]
            }
            Some(events) => build_lines(&events, state.now),
            None => vec![placeholder(state)],
        };

        let height = popup_height(body.len(), area.height);
        let popup = centered_rect(72, height, area);

        let title = match state.selected_service() {
            Some(s) => format!("schedule · {}", s.name),
            None => "schedule".to_string(),
        };
        let badge = state.events.error().map(|_| Badge {
            text: "STALE",
            color: C_ACCENT,
        });
        let block = pane_chrome(&title, Some('m'), true, badge);
        let inner = block.inner(popup);

        let max_scroll = body.len().saturating_sub(inner.height as usize);
        self.scroll = self.scroll.min(max_scroll);

        frame.render_widget(Clear, popup);
        frame.render_widget(block, popup);
        let scroll = u16::try_from(self.scroll).unwrap_or(u16::MAX);
        frame.render_widget(Paragraph::new(body).scroll((scroll, 0)), inner);
    }
}

/// Rows plus borders, at least 5 and leaving a margin of one row top and
/// bottom where the area allows.
fn popup_height(rows: usize, area_height: u16) -> u16 {
    u16::try_from(rows)
        .unwrap_or(u16::MAX)
        .saturating_add(2)
        .clamp(5, area_height.saturating_sub(2).max(5))
}

fn message_line(text: &str, color: Color) -> Line<'static> {
    Line::from(Span::styled(format!("  {}", text), Style::default().fg(color)))
}

fn placeholder(state: &AppState) -> Line<'static> {
    if state.selected_service_id().is_none() {
        return message_line("no service tuned", C_MUTED);
    }
    match state.events.error() {
        Some(e) => message_line(&format!("schedule unavailable: {}", e), C_ACCENT),
        None => message_line("fetching schedule…", C_MUTED),
    }
}

/// One row per programme: marker, time window, length, title.
fn build_lines(events: &[Event], now: NaiveDateTime) -> Vec<Line<'static>> {
    let on_air_id = schedule::current(events, now).map(|e| e.id);
    events
        .iter()
        .map(|event| {
            let on_air = Some(event.id) == on_air_id;
            let (marker, title_style) = if on_air {
                (
                    Span::styled(" ● ", Style::default().fg(C_PLAYING)),
                    Style::default().fg(C_PLAYING).add_modifier(Modifier::BOLD),
                )
            } else {
                (Span::raw("   "), Style::default().fg(C_PRIMARY))
            };
            Line::from(vec![
                marker,
                Span::styled(
                    format_time_range(event.start_at, event.end_at),
                    Style::default().fg(C_TIME),
                ),
                Span::styled(
                    format!("  {:>4}  ", format_duration(event.start_at, event.end_at)),
                    Style::default().fg(C_SECONDARY),
                ),
                Span::styled(event.title.clone(), title_style),
            ])
        })
        .collect()
}
