use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
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
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_query_task().await;
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
        InputMode::Naming => handle_naming_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,

        // Tabs
        KeyCode::Char('n') => {
            app.name_input.clear();
            app.input_mode = InputMode::Naming;
        }
        KeyCode::Char('t') => app.start_temporary_chat(),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_down(app.chat_height / 2);
        }
        KeyCode::Char('d') => app.delete_active_tab(),
        KeyCode::Tab => app.next_tab(),
        KeyCode::BackTab => app.prev_tab(),
        KeyCode::Char(c @ '1'..='9') => {
            let index = c as usize - '1' as usize;
            app.select_tab_index(index);
        }

        // Scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_up(app.chat_height / 2);
        }
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_to_bottom(),

        // Actions
        KeyCode::Char('y') => app.copy_last_reply(),
        KeyCode::Char('e') => app.export_active(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter if key.modifiers.intersects(KeyModifiers::ALT | KeyModifiers::SHIFT) => {
            insert_char(app, '\n');
        }
        KeyCode::Enter => app.send_input(),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::Char(c) => insert_char(app, c),
        _ => {}
    }
}

fn insert_char(app: &mut App, c: char) {
    let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
    app.input.insert(byte_pos, c);
    app.input_cursor += 1;
}

fn handle_naming_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.name_input.clear();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.create_tab();
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Backspace => {
            app.name_input.pop();
        }
        KeyCode::Char(c) => app.name_input.push(c),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Store;
    use std::time::Duration;
    use tabchat_core::{MemoryStore, OllamaClient, Session, TabStore};

    fn app() -> App {
        let store: Store = Box::new(MemoryStore::new());
        let session = Session::open(TabStore::new(store, "chat_app_")).unwrap();
        let ollama = OllamaClient::new("http://127.0.0.1:9/api/chat", "m", Duration::from_secs(2)).unwrap();
        App::new(session, ollama, std::env::temp_dir())
    }

    fn press(app: &mut App, code: KeyCode) {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_str(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_char_to_byte_index() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("abc", 10), 3);
    }

    #[test]
    fn test_editing_with_multibyte_cursor() {
        let mut app = app();
        type_str(&mut app, "سلام");
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Backspace);

        assert_eq!(app.input, "سلم");
        assert_eq!(app.input_cursor, 2);
    }

    #[test]
    fn test_alt_enter_inserts_newline() {
        let mut app = app();
        type_str(&mut app, "a");
        handle_key(&mut app, KeyEvent::new(KeyCode::Enter, KeyModifiers::ALT));
        type_str(&mut app, "b");

        assert_eq!(app.input, "a\nb");
        assert!(app.session.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_enter_sends_message() {
        let mut app = app();
        type_str(&mut app, "Hi");
        press(&mut app, KeyCode::Enter);

        assert!(app.input.is_empty());
        assert_eq!(app.session.transcript().len(), 1);
        assert!(app.session.is_pending());
    }

    #[tokio::test]
    async fn test_new_tab_prompt_and_number_select() {
        let mut app = app();
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.input_mode, InputMode::Naming);

        type_str(&mut app, "Work");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.session.active().tab_name(), Some("Work"));
        assert_eq!(app.input_mode, InputMode::Editing);

        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('1'));
        assert_eq!(app.session.active().tab_name(), Some("Default Chat"));
    }

    #[tokio::test]
    async fn test_temporary_then_delete_keys() {
        let mut app = app();
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('d'));
        assert!(app.session.active().is_temporary());
        assert!(app.session.tabs().is_empty());

        press(&mut app, KeyCode::Char('t'));
        assert!(app.session.active().is_temporary());
    }

    #[test]
    fn test_ctrl_c_quits_while_editing() {
        let mut app = app();
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }
}
