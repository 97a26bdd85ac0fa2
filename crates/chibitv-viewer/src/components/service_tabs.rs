//! ServiceTabs component: one tab per service, the confirmed one marked.

use ratatui::crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use unicode_width::UnicodeWidthStr;

use chibitv_proto::model::{Service, ServiceId};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{
        C_BADGE_ERR, C_BADGE_LIVE, C_BADGE_PENDING, C_MUTED, C_NUMBER_HINT, C_PLAYING,
        C_PRIMARY, C_SECONDARY, C_SELECTION_BG,
    },
    widgets::pane_chrome::{pane_chrome, Badge},
};

const TAB_GAP: u16 = 1;

pub struct ServiceTabs {
    /// Index into the service list the keyboard cursor is on.
    cursor: Option<usize>,
    /// View-only: which tab gets the pending marker while a switch is in
    /// flight.  Never consulted for the active service, which always comes
    /// from the confirmed session, and cleared by `sync` once nothing is
    /// pending.
    requested: Option<ServiceId>,
    /// Screen columns of each visible tab from the last draw, for clicks.
    hit_boxes: Vec<(Rect, ServiceId)>,
}

impl ServiceTabs {
    pub fn new() -> Self {
        Self {
            cursor: None,
            requested: None,
            hit_boxes: Vec::new(),
        }
    }

    /// Keep the cursor valid after the service list or session changed.
    pub fn sync(&mut self, state: &AppState) {
        let services = state.service_list();
        if services.is_empty() {
            self.cursor = None;
            return;
        }
        match self.cursor {
            Some(i) if i < services.len() => {}
            _ => {
                let selected = state.selected_service_id();
                self.cursor = Some(
                    services
                        .iter()
                        .position(|s| Some(s.id) == selected)
                        .unwrap_or(0),
                );
            }
        }
        if !state.session.mutation_pending() {
            self.requested = None;
        }
    }

    fn select_index(&mut self, idx: usize, services: &[Service]) -> Vec<Action> {
        let Some(service) = services.get(idx) else {
            return vec![];
        };
        self.cursor = Some(idx);
        self.requested = Some(service.id);
        vec![Action::SelectService(service.id)]
    }

    fn move_cursor(&mut self, delta: isize, len: usize) {
        if len == 0 {
            return;
        }
        let cur = self.cursor.unwrap_or(0) as isize;
        self.cursor = Some((cur + delta).clamp(0, len as isize - 1) as usize);
    }

    fn tab_label(idx: usize, service: &Service) -> String {
        if idx < 9 {
            format!(" {} {} ", idx + 1, service.name)
        } else {
            format!(" {} ", service.name)
        }
    }

    /// First tab to draw so the cursor stays visible in `width` columns.
    fn first_visible(labels: &[String], cursor: usize, width: u16) -> usize {
        let mut first = 0;
        loop {
            let used: u16 = labels[first..=cursor]
                .iter()
                .map(|l| l.width() as u16 + TAB_GAP)
                .sum();
            if used <= width || first == cursor {
                return first;
            }
            first += 1;
        }
    }
}

impl Default for ServiceTabs {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for ServiceTabs {
    fn id(&self) -> ComponentId {
        ComponentId::ServiceTabs
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        let services = state.service_list();
        match key.code {
            KeyCode::Left | KeyCode::Char('h') => self.move_cursor(-1, services.len()),
            KeyCode::Right | KeyCode::Char('l') => self.move_cursor(1, services.len()),
            KeyCode::Home => self.move_cursor(isize::MIN / 2, services.len()),
            KeyCode::End => self.move_cursor(isize::MAX / 2, services.len()),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(idx) = self.cursor {
                    return self.select_index(idx, services);
                }
            }
            KeyCode::Char(c @ '1'..='9') => {
                let idx = (c as u8 - b'1') as usize;
                return self.select_index(idx, services);
            }
            _ => {}
        }
        vec![]
    }

    fn handle_mouse(&mut self, event: MouseEvent, state: &AppState) -> Vec<Action> {
        if !matches!(event.kind, MouseEventKind::Down(MouseButton::Left)) {
            return vec![];
        }
        let hit = self.hit_boxes.iter().find(|(r, _)| {
            event.row >= r.y
                && event.row < r.y + r.height
                && event.column >= r.x
                && event.column < r.x + r.width
        });
        let Some(&(_, id)) = hit else {
            return vec![];
        };
        let services = state.service_list();
        match services.iter().position(|s| s.id == id) {
            Some(idx) => self.select_index(idx, services),
            None => vec![],
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, state: &AppState) {
        let pending = state.session.mutation_pending();
        let badge = if pending {
            Some(Badge {
                text: "SWITCHING",
                color: C_BADGE_PENDING,
            })
        } else if state.services.error().is_some() {
            Some(Badge {
                text: "ERR",
                color: C_BADGE_ERR,
            })
        } else if state.selected_service_id().is_some() {
            Some(Badge {
                text: "LIVE",
                color: C_BADGE_LIVE,
            })
        } else {
            None
        };
        let block = pane_chrome("services", None, true, badge);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.hit_boxes.clear();

        let services = state.service_list();
        if services.is_empty() {
            let msg = match state.services.error() {
                Some(e) => format!(" services unavailable: {}", e),
                None if state.services.value().is_some() => " no services".to_string(),
                None => " loading services…".to_string(),
            };
            frame.render_widget(
                Paragraph::new(Span::styled(msg, Style::default().fg(C_MUTED))),
                inner,
            );
            return;
        }

        let selected = state.selected_service_id();
        let labels: Vec<String> = services
            .iter()
            .enumerate()
            .map(|(i, s)| Self::tab_label(i, s))
            .collect();
        let cursor = self.cursor.unwrap_or(0).min(services.len() - 1);
        let first = Self::first_visible(&labels, cursor, inner.width);

        let mut spans = Vec::new();
        let mut x = inner.x;
        for (idx, service) in services.iter().enumerate().skip(first) {
            let label = &labels[idx];
            let w = label.width() as u16;
            if x + w > inner.x + inner.width {
                spans.push(Span::styled("…", Style::default().fg(C_MUTED)));
                break;
            }

            let is_active = Some(service.id) == selected;
            let is_requested = pending && self.requested == Some(service.id);
            let fg = if is_active {
                C_PLAYING
            } else if is_requested {
                C_BADGE_PENDING
            } else if idx == cursor {
                C_PRIMARY
            } else {
                C_SECONDARY
            };
            let mut style = Style::default().fg(fg);
            if is_active || idx == cursor {
                style = style.add_modifier(Modifier::BOLD);
            }
            if idx == cursor {
                style = style.bg(C_SELECTION_BG);
            }
            if is_active {
                style = style.add_modifier(Modifier::UNDERLINED);
            }

            spans.push(Span::styled(label.clone(), style));
            spans.push(Span::styled(" ", Style::default().fg(C_NUMBER_HINT)));
            self.hit_boxes.push((
                Rect {
                    x,
                    y: inner.y,
                    width: w,
                    height: 1,
                },
                service.id,
            ));
            x += w + TAB_GAP;
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), inner);
    }
}
