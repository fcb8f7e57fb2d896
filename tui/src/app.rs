use crate::fault_barrier::FaultBarrier;
use crate::widgets::{chat::ChatWidget, composer::ComposerWidget, status_bar::StatusBar};
use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use parley_core::{ConversationController, ConversationSnapshot};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame, Terminal,
};
use tokio::sync::watch;
use tokio::time::{interval, Duration};

const SCROLL_STEP: u16 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppExit {
    Quit,
    /// Throw away the view and controller and start over
    Reload,
}

/// Interactive chat view over a [`ConversationController`]
pub struct ChatApp {
    controller: ConversationController,
    updates: watch::Receiver<ConversationSnapshot>,
    input: String,
    scroll_back: u16,
    barrier: FaultBarrier,
    exit: Option<AppExit>,
}

impl ChatApp {
    pub fn new(controller: ConversationController) -> Self {
        let updates = controller.subscribe();
        Self {
            controller,
            updates,
            input: String::new(),
            scroll_back: 0,
            barrier: FaultBarrier::new(),
            exit: None,
        }
    }

    pub async fn run<B>(mut self, terminal: &mut Terminal<B>) -> Result<AppExit>
    where
        B: Backend,
    {
        let mut events = EventStream::new();
        let mut tick = interval(Duration::from_millis(250));

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if let Some(exit) = self.exit.take() {
                return Ok(exit);
            }

            tokio::select! {
                maybe_event = events.next() => match maybe_event {
                    Some(Ok(Event::Key(key))) => self.handle_key_event(key),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(AppExit::Quit),
                },
                changed = self.updates.changed() => {
                    if changed.is_err() {
                        return Ok(AppExit::Quit);
                    }
                }
                _ = tick.tick() => {}
            }
        }
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if self.barrier.is_tripped() {
            match key.code {
                KeyCode::Char('r') => self.exit = Some(AppExit::Reload),
                KeyCode::Char('q') | KeyCode::Esc => self.exit = Some(AppExit::Quit),
                KeyCode::Char('c') if ctrl => self.exit = Some(AppExit::Quit),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Esc => self.exit = Some(AppExit::Quit),
            KeyCode::Char('c') if ctrl => self.exit = Some(AppExit::Quit),
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::PageUp => self.scroll_back = self.scroll_back.saturating_add(SCROLL_STEP),
            KeyCode::PageDown => self.scroll_back = self.scroll_back.saturating_sub(SCROLL_STEP),
            KeyCode::End => self.scroll_back = 0,
            KeyCode::Char(c) if !ctrl => self.input.push(c),
            _ => {}
        }
    }

    fn submit(&mut self) {
        if self.input.trim().is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.input);
        self.scroll_back = 0;
        // Completion is observed through the watch channel.
        drop(self.controller.dispatch(text));
    }

    pub fn draw(&mut self, frame: &mut Frame<'_>) {
        let snapshot = self.updates.borrow().clone();
        let input = self.input.as_str();
        let scroll_back = self.scroll_back;
        let capacity = self.controller.limits().history_capacity;
        self.barrier.render(frame, |frame| {
            draw_chat(frame, &snapshot, input, scroll_back, capacity)
        });
    }
}

fn draw_chat(
    frame: &mut Frame<'_>,
    snapshot: &ConversationSnapshot,
    input: &str,
    scroll_back: u16,
    capacity: usize,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let header = Line::from(Span::styled(
        "Parley",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ));
    frame.render_widget(Paragraph::new(header), chunks[0]);

    frame.render_widget(
        ChatWidget::new(&snapshot.messages).with_scroll_back(scroll_back),
        chunks[1],
    );

    let composer = ComposerWidget::new(input, snapshot.is_loading);
    if let Some(position) = composer.cursor_position(chunks[2]) {
        frame.set_cursor_position(position);
    }
    frame.render_widget(composer, chunks[2]);

    frame.render_widget(
        StatusBar::new(snapshot.is_loading, snapshot.messages.len(), capacity),
        chunks[3],
    );
}
