pub mod app;
pub mod fault_barrier;
pub mod widgets;

use anyhow::Result;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parley_core::ConversationController;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::panic;

pub use app::{AppExit, ChatApp};
pub use fault_barrier::FaultBarrier;

/// Run the interactive chat until the user quits.
///
/// `new_controller` is called once per session; a reload from the fault
/// fallback starts a brand new session with an empty history.
pub async fn run_chat<F>(new_controller: F) -> Result<()>
where
    F: Fn() -> Result<ConversationController>,
{
    enable_raw_mode()?;
    let mut terminal = or_rollback(enter_terminal, restore_terminal)?;

    // Panic output on stderr would scribble over the alternate screen.
    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(|info| {
        tracing::error!(%info, "panic");
    }));

    let result = drive(&mut terminal, new_controller).await;

    let _ = panic::take_hook();
    panic::set_hook(previous_hook);
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Run `setup`; if it fails, undo what was already done with `rollback`.
fn or_rollback<T, S, R>(setup: S, rollback: R) -> Result<T>
where
    S: FnOnce() -> Result<T>,
    R: FnOnce(),
{
    setup().inspect_err(|_| rollback())
}

fn restore_terminal() {
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
    let _ = disable_raw_mode();
}

fn enter_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

async fn drive<B, F>(terminal: &mut Terminal<B>, new_controller: F) -> Result<()>
where
    B: ratatui::backend::Backend,
    F: Fn() -> Result<ConversationController>,
{
    loop {
        let app = ChatApp::new(new_controller()?);
        match app.run(terminal).await? {
            AppExit::Quit => return Ok(()),
            AppExit::Reload => {
                tracing::info!("reloading chat view");
                terminal.clear()?;
            }
        }
    }
}
