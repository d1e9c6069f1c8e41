use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, FocusPane, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Apply a cursor-editing key to a single-line buffer. Returns false if the
/// key is not an editing key.
fn edit_line(buffer: &mut String, cursor: &mut usize, code: KeyCode) -> bool {
    let char_count = buffer.chars().count();
    match code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(buffer, *cursor);
                buffer.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < char_count {
                let byte_pos = char_to_byte_index(buffer, *cursor);
                buffer.remove(byte_pos);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(char_count),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = char_count,
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(buffer, *cursor);
            buffer.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick(),
    }
    app.poll_completion().await;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }
    if key.code == KeyCode::Tab {
        app.toggle_focus();
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => match app.focus {
            FocusPane::Credential if app.show_credential_form() => handle_api_key_editing(app, key),
            _ => handle_query_editing(app, key),
        },
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,

        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down()
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up()
        }
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::PageUp => app.scroll_half_page_up(),
        KeyCode::Char('g') | KeyCode::Home => app.scroll_to_top(),
        KeyCode::Char('G') | KeyCode::End => app.scroll_to_bottom(),

        _ => {}
    }
}

fn handle_api_key_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.submit_api_key(),
        code => {
            edit_line(&mut app.api_key_input, &mut app.api_key_input_cursor, code);
        }
    }
}

fn handle_query_editing(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Esc {
        app.input_mode = InputMode::Normal;
        return;
    }

    // The input box is disabled while a reply is on its way
    if app.is_waiting() {
        return;
    }

    match key.code {
        KeyCode::Enter => app.submit_query(),
        code => {
            edit_line(&mut app.query_input, &mut app.query_cursor, code);
        }
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(true);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            for _ in 0..3 {
                app.scroll_down();
            }
        }
        MouseEventKind::ScrollUp => {
            for _ in 0..3 {
                app.scroll_up();
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chat_core::{ChatSession, Completer, CompletionError, MemoryCredentialStore, CREDENTIAL_KEY};
    use crossterm::event::{KeyEventKind, KeyEventState};
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl Completer for Echo {
        async fn complete(&self, prompt: &str, _credential: &str) -> Result<String, CompletionError> {
            Ok(format!("echo: {}", prompt))
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_key(app, key(KeyCode::Char(c)));
        }
    }

    fn app(store: MemoryCredentialStore) -> App {
        App::new(ChatSession::new(Box::new(store)), Arc::new(Echo), "test-model")
    }

    #[test]
    fn test_edit_line_is_utf8_safe() {
        let mut buffer = String::new();
        let mut cursor = 0;
        for c in "héllo".chars() {
            edit_line(&mut buffer, &mut cursor, KeyCode::Char(c));
        }
        edit_line(&mut buffer, &mut cursor, KeyCode::Home);
        edit_line(&mut buffer, &mut cursor, KeyCode::Right);
        edit_line(&mut buffer, &mut cursor, KeyCode::Delete);
        assert_eq!(buffer, "hllo");

        edit_line(&mut buffer, &mut cursor, KeyCode::Char('é'));
        edit_line(&mut buffer, &mut cursor, KeyCode::End);
        edit_line(&mut buffer, &mut cursor, KeyCode::Backspace);
        assert_eq!(buffer, "héll");
        assert_eq!(cursor, 4);
    }

    #[tokio::test]
    async fn test_typing_and_enter_sends_turn() {
        let mut app = app(MemoryCredentialStore::with_entry(CREDENTIAL_KEY, "sk-test123"));
        type_text(&mut app, "Hello");
        handle_key(&mut app, key(KeyCode::Enter));

        // Keystrokes are swallowed while waiting
        type_text(&mut app, "more");
        assert!(app.query_input.is_empty());

        app.finish_pending().await;
        let texts: Vec<&str> = app
            .session
            .conversation()
            .turns()
            .iter()
            .map(|t| t.text())
            .collect();
        assert_eq!(texts, vec!["Hello", "echo: Hello"]);
    }

    #[tokio::test]
    async fn test_key_form_takes_input_first() {
        let mut app = app(MemoryCredentialStore::new());
        type_text(&mut app, "pplx-abc");
        handle_key(&mut app, key(KeyCode::Enter));

        assert!(!app.show_credential_form());
        assert_eq!(app.focus, FocusPane::Input);
        assert!(app.query_input.is_empty());
    }

    #[tokio::test]
    async fn test_tab_moves_between_form_and_input() {
        let mut app = app(MemoryCredentialStore::new());
        assert_eq!(app.focus, FocusPane::Credential);

        handle_key(&mut app, key(KeyCode::Tab));
        assert_eq!(app.focus, FocusPane::Input);
        handle_key(&mut app, key(KeyCode::Tab));
        assert_eq!(app.focus, FocusPane::Credential);
    }

    #[tokio::test]
    async fn test_q_quits_only_in_normal_mode() {
        let mut app = app(MemoryCredentialStore::with_entry(CREDENTIAL_KEY, "sk"));
        handle_key(&mut app, key(KeyCode::Char('q')));
        assert!(!app.should_quit);
        assert_eq!(app.query_input, "q");

        handle_key(&mut app, key(KeyCode::Esc));
        handle_key(&mut app, key(KeyCode::Char('q')));
        assert!(app.should_quit);
    }
}
