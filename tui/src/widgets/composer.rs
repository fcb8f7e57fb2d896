use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub struct ComposerWidget<'a> {
    input: &'a str,
    busy: bool,
}

impl<'a> ComposerWidget<'a> {
    pub fn new(input: &'a str, busy: bool) -> Self {
        Self { input, busy }
    }

    /// Where the terminal cursor belongs after the visible input
    pub fn cursor_position(&self, area: Rect) -> Option<(u16, u16)> {
        let inner = Block::default().borders(Borders::ALL).inner(area);
        if inner.width == 0 || inner.height == 0 {
            return None;
        }
        let visible = visible_tail(self.input, inner.width.saturating_sub(1) as usize);
        let offset = u16::try_from(visible.width()).unwrap_or(inner.width);
        Some((inner.x + offset.min(inner.width - 1), inner.y))
    }
}

/// Longest suffix of `input` that fits in `max_width` columns.
pub fn visible_tail(input: &str, max_width: usize) -> &str {
    let mut width = 0;
    let mut start = input.len();
    for (idx, ch) in input.char_indices().rev() {
        let w = ch.width().unwrap_or(0);
        if width + w > max_width {
            break;
        }
        width += w;
        start = idx;
    }
    &input[start..]
}

impl Widget for ComposerWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner_width = Block::default().borders(Borders::ALL).inner(area).width;
        let line = if self.input.is_empty() {
            Line::from(Span::styled(
                "Type your message…",
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            ))
        } else {
            Line::from(visible_tail(
                self.input,
                inner_width.saturating_sub(1) as usize,
            ))
        };
        let title = if self.busy { "Message (sending…)" } else { "Message" };
        Paragraph::new(line)
            .block(Block::default().borders(Borders::ALL).title(title))
            .render(area, buf);
    }
}
