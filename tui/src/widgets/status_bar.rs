use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};

const HINTS: &str = "Enter send · PgUp/PgDn scroll · Esc quit";

pub struct StatusBar {
    loading: bool,
    message_count: usize,
    capacity: usize,
}

impl StatusBar {
    pub fn new(loading: bool, message_count: usize, capacity: usize) -> Self {
        Self {
            loading,
            message_count,
            capacity,
        }
    }
}

impl Widget for StatusBar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let (label, bg) = if self.loading {
            (" Sending… ", Color::Yellow)
        } else {
            (" Ready ", Color::Cyan)
        };
        let line = Line::from(vec![
            Span::styled(
                label,
                Style::default()
                    .fg(Color::Black)
                    .bg(bg)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(
                format!("{}/{} messages", self.message_count, self.capacity),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw("  |  "),
            Span::styled(HINTS, Style::default().fg(Color::Gray)),
        ]);
        Paragraph::new(line)
            .alignment(Alignment::Left)
            .render(area, buf);
    }
}
