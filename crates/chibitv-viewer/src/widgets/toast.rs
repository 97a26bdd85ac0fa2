//! Toasts: short-lived notices stacked above the keys bar.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::Span,
    widgets::{Clear, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::theme::{C_TOAST_INFO, C_TOAST_WARNING};

const MAX_VISIBLE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Info,
    Warning,
}

impl Severity {
    fn lifetime(self) -> Duration {
        match self {
            Severity::Info => Duration::from_secs(2),
            Severity::Warning => Duration::from_secs(5),
        }
    }
}

struct Toast {
    text: String,
    severity: Severity,
    expires: Instant,
}

#[derive(Default)]
pub struct ToastManager {
    toasts: VecDeque<Toast>,
}

impl ToastManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: impl Into<String>, severity: Severity, lifetime: Duration) {
        let text = text.into();
        // Repeating a notice restarts it rather than stacking a copy.
        self.toasts.retain(|t| t.text != text);
        self.toasts.push_back(Toast {
            text,
            severity,
            expires: Instant::now() + lifetime,
        });
        if self.toasts.len() > MAX_VISIBLE {
            self.toasts.pop_front();
        }
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(text, Severity::Info, Severity::Info.lifetime());
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.push(text, Severity::Warning, Severity::Warning.lifetime());
    }

    /// Expire old notices; true when the visible set changed.
    pub fn tick(&mut self) -> bool {
        let now = Instant::now();
        let before = self.toasts.len();
        self.toasts.retain(|t| t.expires > now);
        self.toasts.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }

    /// Right-aligned, newest at the bottom, directly above the last row of
    /// `area`.
    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        if area.height < 2 {
            return;
        }
        let max_width = area.width.saturating_sub(2);
        let bottom = area.y + area.height - 1;

        for (i, toast) in self.toasts.iter().rev().enumerate() {
            let Some(y) = bottom.checked_sub(1 + i as u16).filter(|y| *y >= area.y) else {
                break;
            };
            let (color, marker) = match toast.severity {
                Severity::Info => (C_TOAST_INFO, "·"),
                Severity::Warning => (C_TOAST_WARNING, "!"),
            };
            let label = format!(" {} {} ", marker, toast.text);
            let width = (label.width() as u16).min(max_width);
            let rect = Rect {
                x: area.x + area.width - width - 1,
                y,
                width,
                height: 1,
            };
            frame.render_widget(Clear, rect);
            frame.render_widget(
                Paragraph::new(Span::styled(
                    label,
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                )),
                rect,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_notice_is_not_stacked() {
        let mut toasts = ToastManager::new();
        toasts.warning("could not switch to NHK");
        toasts.warning("could not switch to NHK");
        assert_eq!(toasts.toasts.len(), 1);
    }

    #[test]
    fn oldest_notice_makes_room() {
        let mut toasts = ToastManager::new();
        for i in 0..=MAX_VISIBLE {
            toasts.info(format!("notice {}", i));
        }
        assert_eq!(toasts.toasts.len(), MAX_VISIBLE);
        assert_eq!(toasts.toasts[0].text, "notice 1");
    }

    #[test]
    fn expired_notices_are_dropped() {
        let mut toasts = ToastManager::new();
        toasts.push("gone", Severity::Info, Duration::ZERO);
        toasts.warning("stays");
        assert!(toasts.tick());
        assert_eq!(toasts.toasts.len(), 1);
        assert!(!toasts.tick());
    }
}
