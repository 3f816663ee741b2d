use std::fs;
use std::path::PathBuf;
use anyhow::{Context, Result};
use tabchat_core::{
    ChatError, ChatTarget, KeyValueStore, OllamaClient, OutgoingRequest, RequestId, Session,
    SessionError,
};
use tokio::task::JoinHandle;

use crate::clipboard::copy_to_clipboard;

pub type Store = Box<dyn KeyValueStore>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
    /// Typing the name of a new tab
    Naming,
}

pub struct InFlight {
    pub id: RequestId,
    pub handle: JoinHandle<Result<String, ChatError>>,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    pub session: Session<Store>,
    pub ollama: OllamaClient,

    // Message input
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars

    // New tab prompt
    pub name_input: String,

    // Chat view scrolling, dimensions updated during render
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub total_chat_lines: u16,

    pub query_task: Option<InFlight>,
    pub status: Option<String>,
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub export_dir: PathBuf,
}

impl App {
    pub fn new(session: Session<Store>, ollama: OllamaClient, export_dir: PathBuf) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            session,
            ollama,
            input: String::new(),
            input_cursor: 0,
            name_input: String::new(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            total_chat_lines: 0,
            query_task: None,
            status: None,
            animation_frame: 0,
            export_dir,
        }
    }

    pub fn active_title(&self) -> String {
        match self.session.active() {
            ChatTarget::Tab(name) => name.clone(),
            ChatTarget::Temporary => "Temporary chat".to_string(),
        }
    }

    /// Send the input box contents as a user message
    pub fn send_input(&mut self) {
        match self.session.submit(&self.input) {
            Ok(Some(request)) => {
                self.input.clear();
                self.input_cursor = 0;
                self.status = None;
                self.spawn_request(request);
            }
            Ok(None) => {}
            Err(e) => self.report(e),
        }
    }

    fn spawn_request(&mut self, request: OutgoingRequest) {
        let ollama = self.ollama.clone();
        let OutgoingRequest { id, messages, .. } = request;
        let handle = tokio::spawn(async move { ollama.chat(&messages).await });
        self.query_task = Some(InFlight { id, handle });
    }

    /// Hand a finished request back to the session
    pub async fn poll_query_task(&mut self) {
        let finished = self
            .query_task
            .as_ref()
            .is_some_and(|task| task.handle.is_finished());
        if !finished {
            return;
        }
        let Some(task) = self.query_task.take() else {
            return;
        };

        match task.handle.await {
            Ok(result) => {
                if let Err(e) = self.session.complete(task.id, result) {
                    self.report(e);
                }
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                tracing::error!(id = task.id, "chat task failed: {e}");
                self.session.cancel_pending();
            }
        }
    }

    /// Abort the running request if the session no longer waits for it
    fn sync_query_task(&mut self) {
        let stale = self
            .query_task
            .as_ref()
            .is_some_and(|task| self.session.pending_id() != Some(task.id));
        if stale {
            if let Some(task) = self.query_task.take() {
                tracing::debug!(id = task.id, "aborting chat request");
                task.handle.abort();
            }
        }
    }

    pub fn abort_query_task(&mut self) {
        self.session.cancel_pending();
        self.sync_query_task();
    }

    pub fn create_tab(&mut self) {
        let name = std::mem::take(&mut self.name_input);
        let result = self.session.create_tab(&name);
        self.after_tab_change(result);
    }

    pub fn select_tab_index(&mut self, index: usize) {
        let Some(name) = self.session.tabs().get(index).cloned() else {
            return;
        };
        let result = self.session.select_tab(&name);
        self.after_tab_change(result);
    }

    pub fn next_tab(&mut self) {
        let count = self.session.tabs().len();
        if count == 0 {
            return;
        }
        let next = match self.session.active_index() {
            Some(i) => (i + 1) % count,
            None => 0,
        };
        self.select_tab_index(next);
    }

    pub fn prev_tab(&mut self) {
        let count = self.session.tabs().len();
        if count == 0 {
            return;
        }
        let prev = match self.session.active_index() {
            Some(i) => (i + count - 1) % count,
            None => count - 1,
        };
        self.select_tab_index(prev);
    }

    pub fn delete_active_tab(&mut self) {
        let Some(name) = self.session.active().tab_name().map(str::to_string) else {
            self.status = Some("Temporary chats have nothing to delete".to_string());
            return;
        };
        let result = self.session.delete_tab(&name);
        self.after_tab_change(result);
        if self.status.is_none() {
            self.status = Some(format!("Deleted \"{}\"", name));
        }
    }

    pub fn start_temporary_chat(&mut self) {
        self.session.start_temporary_chat();
        self.after_tab_change(Ok(()));
    }

    fn after_tab_change(&mut self, result: Result<(), SessionError>) {
        self.sync_query_task();
        match result {
            Ok(()) => {
                self.status = None;
                self.chat_scroll = 0;
            }
            Err(e) => self.report(e),
        }
    }

    /// Copy the newest assistant reply, raw Markdown included
    pub fn copy_last_reply(&mut self) {
        let Some(text) = self
            .session
            .last_copyable_index()
            .and_then(|i| self.session.copy_text(i))
        else {
            self.status = Some("Nothing to copy yet".to_string());
            return;
        };

        match copy_to_clipboard(text) {
            Ok(()) => self.status = Some("Copied to clipboard!".to_string()),
            Err(e) => {
                tracing::warn!("copy failed: {e:#}");
                self.status = Some(format!("Copy failed: {e}"));
            }
        }
    }

    /// Write the active conversation as a standalone HTML page
    pub fn export_active(&mut self) {
        match self.write_export() {
            Ok(path) => self.status = Some(format!("Exported to {}", path.display())),
            Err(e) => {
                tracing::warn!("export failed: {e:#}");
                self.status = Some(format!("Export failed: {e}"));
            }
        }
    }

    fn write_export(&self) -> Result<PathBuf> {
        let title = self.active_title();
        fs::create_dir_all(&self.export_dir)
            .with_context(|| format!("creating {}", self.export_dir.display()))?;
        let path = self.export_dir.join(format!("{}.html", export_file_stem(&title)));
        fs::write(&path, self.session.view().to_html_document(&title))
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    fn report(&mut self, error: SessionError) {
        if matches!(error, SessionError::Storage(_)) {
            tracing::error!("{error}");
        }
        self.status = Some(error.to_string());
    }

    pub fn tick_animation(&mut self) {
        if self.session.is_pending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn max_chat_scroll(&self) -> u16 {
        self.total_chat_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = (self.chat_scroll + lines).min(self.max_chat_scroll());
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
    }
}

/// File name for an exported chat: keeps letters, digits, `-` and `_`
pub fn export_file_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "chat".to_string()
    } else {
        stem
    }
}
