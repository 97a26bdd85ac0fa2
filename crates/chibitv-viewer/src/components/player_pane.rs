//! PlayerPane component: where the video plays.  The picture itself goes to
//! the pipeline's own window; this pane reports what the player is doing.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::{
    action::ComponentId,
    app_state::AppState,
    component::Component,
    player::Lifecycle,
    theme::{
        style_default, style_muted, style_secondary, C_BADGE_ERR, C_BADGE_LIVE, C_BADGE_PENDING,
        C_CONNECTING, C_ERROR, C_MUTED, C_PLAYING,
    },
    widgets::pane_chrome::{pane_chrome, Badge},
};

pub struct PlayerPane;

impl PlayerPane {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlayerPane {
    fn default() -> Self {
        Self::new()
    }
}

/// Headline for the pane: what the viewer should take away at a glance.
fn headline(state: &AppState) -> (&'static str, Color) {
    if state.player.surface.is_none() {
        return ("video output unavailable", C_MUTED);
    }
    if state.session.mutation_pending() {
        return ("switching service…", C_CONNECTING);
    }
    match state.player.lifecycle {
        Lifecycle::Absent => ("idle", C_MUTED),
        Lifecycle::Constructing => ("starting player…", C_CONNECTING),
        Lifecycle::Attached if state.player.error.is_some() => ("playback failed", C_ERROR),
        Lifecycle::Attached => ("buffering…", C_CONNECTING),
        Lifecycle::Playing => ("▶ on air", C_PLAYING),
        Lifecycle::Released => ("stopped", C_MUTED),
    }
}

impl Component for PlayerPane {
    fn id(&self) -> ComponentId {
        ComponentId::PlayerPane
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, state: &AppState) {
        let badge = match state.player.lifecycle {
            Lifecycle::Playing => Some(Badge {
                text: "PLAYING",
                color: C_BADGE_LIVE,
            }),
            Lifecycle::Constructing | Lifecycle::Attached if state.player.error.is_none() => {
                Some(Badge {
                    text: "LOADING",
                    color: C_BADGE_PENDING,
                })
            }
            _ if state.player.error.is_some() => Some(Badge {
                text: "ERR",
                color: C_BADGE_ERR,
            }),
            _ => None,
        };
        let block = pane_chrome("player", None, false, badge);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let (text, color) = headline(state);
        let mut lines = vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("  {}", text),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("  stream   ", style_muted()),
                Span::styled(state.stream_url.clone(), style_secondary()),
            ]),
        ];
        if let Some(surface) = &state.player.surface {
            lines.push(Line::from(vec![
                Span::styled("  output   ", style_muted()),
                Span::styled(surface.clone(), style_secondary()),
            ]));
        }
        if state.player.mounts > 0 {
            lines.push(Line::from(vec![
                Span::styled("  mounts   ", style_muted()),
                Span::styled(state.player.mounts.to_string(), style_default()),
            ]));
        }
        if let Some(err) = &state.player.error {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!("  {}", err),
                Style::default().fg(C_ERROR),
            )));
        }
        frame.render_widget(Paragraph::new(lines), inner);
    }
}
