//! Render-time fault isolation.
//!
//! Every render pass runs inside `catch_unwind`. The first panic latches the
//! barrier and from then on only the static fallback view is drawn; recovering
//! means a full reload of the chat view.

use ratatui::{
    layout::Alignment,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

pub const FALLBACK_TITLE: &str = "Something went wrong";
pub const FALLBACK_HINT: &str = "Press r to reload, q to quit.";

#[derive(Debug, Default)]
pub struct FaultBarrier {
    fault: Option<String>,
}

impl FaultBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tripped(&self) -> bool {
        self.fault.is_some()
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn render<F>(&mut self, frame: &mut Frame<'_>, draw: F)
    where
        F: FnOnce(&mut Frame<'_>),
    {
        if self.fault.is_none() {
            match panic::catch_unwind(AssertUnwindSafe(|| draw(frame))) {
                Ok(()) => return,
                Err(payload) => {
                    let fault = panic_message(payload.as_ref());
                    error!(%fault, "render fault, switching to fallback view");
                    self.fault = Some(fault);
                }
            }
        }

        let area = frame.area();
        frame.render_widget(Clear, area);
        frame.render_widget(fallback(self.fault.as_deref().unwrap_or_default()), area);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown fault".to_string()
    }
}

fn fallback(detail: &str) -> Paragraph<'_> {
    let lines = vec![
        Line::from(Span::styled(
            FALLBACK_TITLE,
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Please reload the chat and try again."),
        Line::from(Span::styled(
            FALLBACK_HINT,
            Style::default().fg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            format!("Error details: {detail}"),
            Style::default().fg(Color::DarkGray),
        )),
    ];
    Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(" Parley "),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
}
