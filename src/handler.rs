use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.on_tick().await,
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    if app.show_help {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
            app.show_help = false;
        }
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key).await,
        InputMode::Editing => handle_editing_mode(app, key),
    }

    Ok(())
}

async fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    // The rotation warning takes over step 4 until it is answered
    if app.session.show_warning() {
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('y') => app.continue_anyway(),
            KeyCode::Char('r') => app.restart(),
            KeyCode::Char('h') | KeyCode::Left | KeyCode::Char('p') => app.previous_step(),
            KeyCode::Char('q') => app.should_quit = true,
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('?') => app.show_help = true,

        // Step navigation
        KeyCode::Char('n') | KeyCode::Char('l') | KeyCode::Right => app.next_step(),
        KeyCode::Char('p') | KeyCode::Char('h') | KeyCode::Left => app.previous_step(),

        _ if app.session.steps().is_last() => handle_chat_normal(app, key).await,

        KeyCode::Char('j') | KeyCode::Down => app.list_down(),
        KeyCode::Char('k') | KeyCode::Up => app.list_up(),
        KeyCode::Tab if app.current_step() == 3 => app.toggle_region_focus(),
        KeyCode::Enter | KeyCode::Char(' ') => app.choose_highlighted(),

        _ => {}
    }
}

async fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('i') | KeyCode::Enter => {
            app.cursor = app.session.chat_input.chars().count();
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('s') => app.start_planning(),
        KeyCode::Char('d') => app.direct_submit(),
        KeyCode::Char('m') => {
            if !app.session.is_loading() {
                app.toggle_recording().await;
            }
        }
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(),
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    let chatting = app.session.steps().is_last();

    match key.code {
        KeyCode::Esc => {
            if chatting {
                app.input_mode = InputMode::Normal;
            } else {
                app.finish_soil_edit();
            }
        }
        // Shift+Enter keeps typing on a new line in the chat box
        KeyCode::Enter if chatting && key.modifiers.contains(KeyModifiers::SHIFT) => {
            insert_char(app, '\n');
        }
        KeyCode::Enter => {
            if chatting {
                if !app.session.is_loading() {
                    app.send_chat_input();
                    app.input_mode = InputMode::Normal;
                }
            } else {
                app.finish_soil_edit();
            }
        }
        KeyCode::Backspace => {
            if app.cursor > 0 {
                let cursor = app.cursor - 1;
                if let Some(buffer) = app.edit_buffer() {
                    let byte_pos = char_to_byte_index(buffer, cursor);
                    buffer.remove(byte_pos);
                }
                app.cursor = cursor;
            }
        }
        KeyCode::Delete => {
            let cursor = app.cursor;
            if let Some(buffer) = app.edit_buffer() {
                if cursor < buffer.chars().count() {
                    let byte_pos = char_to_byte_index(buffer, cursor);
                    buffer.remove(byte_pos);
                }
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let len = app.edit_buffer().map(|b| b.chars().count()).unwrap_or(0);
            app.cursor = (app.cursor + 1).min(len);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.edit_buffer().map(|b| b.chars().count()).unwrap_or(0);
        }
        KeyCode::Char(c) => insert_char(app, c),
        _ => {}
    }
}

fn insert_char(app: &mut App, c: char) {
    let cursor = app.cursor;
    if let Some(buffer) = app.edit_buffer() {
        let byte_pos = char_to_byte_index(buffer, cursor);
        buffer.insert(byte_pos, c);
        app.cursor = cursor + 1;
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if !app.session.steps().is_last() {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            for _ in 0..3 {
                app.scroll_chat_down();
            }
        }
        MouseEventKind::ScrollUp => {
            for _ in 0..3 {
                app.scroll_chat_up();
            }
        }
        _ => {}
    }
}
