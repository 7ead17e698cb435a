//! Terminal input handling.
//!
//! Every terminal event is classified for the activity monitor, and key
//! presses are translated into application state changes.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind};
use tokenwarden_core::auth::InputEvent;

use crate::app::{App, AppState};

/// Classify a terminal event for idle tracking.
pub fn activity_of(event: &Event) -> InputEvent {
    match event {
        Event::Key(_) | Event::Paste(_) => InputEvent::KeyPress,
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Moved | MouseEventKind::Drag(_) => InputEvent::PointerMove,
            MouseEventKind::Down(_) => InputEvent::Click,
            MouseEventKind::ScrollUp
            | MouseEventKind::ScrollDown
            | MouseEventKind::ScrollLeft
            | MouseEventKind::ScrollRight => InputEvent::Scroll,
            MouseEventKind::Up(_) => InputEvent::Other,
        },
        Event::FocusGained | Event::FocusLost | Event::Resize(_, _) => InputEvent::Other,
    }
}

/// Handle a key event.
pub fn handle_key(app: &mut App, key: KeyEvent) {
    // Releases and repeats are reported on some platforms
    if key.kind != KeyEventKind::Press {
        return;
    }

    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.state = AppState::Quitting;
        return;
    }

    match app.state {
        AppState::ShowingHelp => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                app.state = AppState::Running;
            }
        }
        AppState::ConfirmingQuit => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                app.state = AppState::Quitting;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                app.state = AppState::Running;
            }
            _ => {}
        },
        AppState::Running => handle_running_key(app, key),
        AppState::Quitting => {}
    }
}

fn handle_running_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('r') => app.refresh(),
        KeyCode::Enter if app.show_prompt() => app.refresh(),
        KeyCode::Char('d') | KeyCode::Esc => app.dismiss(),
        KeyCode::Char('i') => app.login(),
        KeyCode::Char('o') => app.logout(),
        KeyCode::Char('?') => app.state = AppState::ShowingHelp,
        KeyCode::Char('q') => app.state = AppState::ConfirmingQuit,
        _ => {}
    }
}
