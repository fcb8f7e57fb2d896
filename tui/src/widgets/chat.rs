use chrono::Local;
use parley_protocol::{Message, Role};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Paragraph, Widget, Wrap},
};

const WELCOME: &str = "Welcome to Parley! Type your message below.";

/// Scrollable message history. Follows the bottom unless `scroll_back` lines are requested.
pub struct ChatWidget<'a> {
    messages: &'a [Message],
    scroll_back: u16,
}

impl<'a> ChatWidget<'a> {
    pub fn new(messages: &'a [Message]) -> Self {
        Self {
            messages,
            scroll_back: 0,
        }
    }

    pub fn with_scroll_back(mut self, lines: u16) -> Self {
        self.scroll_back = lines;
        self
    }

    fn build_lines(&self) -> Vec<Line<'a>> {
        if self.messages.is_empty() {
            return vec![Line::from(Span::styled(
                WELCOME,
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::DIM),
            ))];
        }

        let mut lines: Vec<Line> = Vec::with_capacity(self.messages.len() * 3);
        for (i, message) in self.messages.iter().enumerate() {
            let label_style = match message.role() {
                Role::User => Style::default().fg(Color::Yellow),
                Role::Assistant => Style::default().fg(Color::Green),
            }
            .add_modifier(Modifier::BOLD);
            let time = message
                .timestamp()
                .with_timezone(&Local)
                .format("%H:%M:%S")
                .to_string();

            lines.push(Line::from(vec![
                Span::styled(message.role().label(), label_style),
                Span::raw("  "),
                Span::styled(time, Style::default().fg(Color::DarkGray)),
            ]));
            for text in message.content().lines() {
                lines.push(Line::from(Span::raw(text)));
            }

            if i + 1 < self.messages.len() {
                lines.push(Line::from(""));
            }
        }
        lines
    }
}

impl Widget for ChatWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let paragraph = Paragraph::new(Text::from(self.build_lines()))
            .wrap(Wrap { trim: false })
            .alignment(Alignment::Left);

        let total = paragraph.line_count(area.width);
        let bottom = total.saturating_sub(area.height as usize);
        let top = bottom.saturating_sub(self.scroll_back as usize);
        let top = u16::try_from(top).unwrap_or(u16::MAX);

        paragraph.scroll((top, 0)).render(area, buf);
    }
}
