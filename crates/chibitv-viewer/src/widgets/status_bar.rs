//! Status bar: bottom line with connection state and keybindings.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::app_state::AppState;
use crate::theme::{C_ACCENT, C_BADGE_PENDING, C_MUTED, C_PLAYING, C_SECONDARY};

/// Which key set the footer advertises.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMode {
    Normal,
    Menu,
    Help,
}

impl InputMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "LIVE",
            Self::Menu => "MENU",
            Self::Help => "HELP",
        }
    }

    fn keys(self) -> &'static str {
        match self {
            Self::Normal => {
                " ←→/hl move  Enter tune  1-9 tune  m menu  d details  r refresh  ? help  q quit"
            }
            Self::Menu => " ↑↓/jk scroll  PgUp/PgDn page  g top  m/Esc close  q quit",
            Self::Help => " any key closes help",
        }
    }
}

/// Draw the keybindings footer bar (one row).
pub fn draw_keys_bar(frame: &mut Frame, area: Rect, mode: InputMode, state: &AppState) {
    let conn = if state.session.stale || !state.session.is_loaded() {
        Span::styled("○", Style::default().fg(C_ACCENT))
    } else if state.session.mutation_pending() {
        Span::styled("◌", Style::default().fg(C_BADGE_PENDING))
    } else {
        Span::styled("●", Style::default().fg(C_PLAYING))
    };

    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", mode.label()),
            Style::default()
                .fg(C_SECONDARY)
                .add_modifier(Modifier::BOLD),
        ),
        conn,
        Span::raw(" "),
        Span::styled(mode.keys(), Style::default().fg(C_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}
