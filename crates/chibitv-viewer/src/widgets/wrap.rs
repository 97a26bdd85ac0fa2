//! Display-width aware word wrapping.
//!
//! Breaks at whitespace when it can and inside a word when a single word is
//! wider than the line, which is the normal case for CJK text.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub fn word_wrap(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let sep = usize::from(!current.is_empty());
            if current.width() + sep + word.width() <= width {
                if sep == 1 {
                    current.push(' ');
                }
                current.push_str(word);
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            for ch in word.chars() {
                let w = ch.width().unwrap_or(0);
                if current.width() + w > width && !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                current.push(ch);
            }
        }
        if !current.is_empty() || paragraph.trim().is_empty() {
            lines.push(current);
        }
    }
    lines
}
