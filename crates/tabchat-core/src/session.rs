//! Tab lifecycle and the active conversation
//!
//! [`Session`] owns all mutable chat state: the tab list, which chat is
//! active, its transcript and rendered view, and the one request that may
//! be in flight. Front ends call its operations from their event loop and
//! draw [`Session::view`]; they never touch storage directly.

use thiserror::Error;

use crate::ai::ChatError;
use crate::render::{Card, ConversationView};
use crate::state::{ChatMessage, ChatTarget, Transcript};
use crate::storage::{KeyValueStore, TabStore};

pub const DEFAULT_TAB_NAME: &str = "Default Chat";

pub type RequestId = u64;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("tab name cannot be empty")]
    EmptyName,

    #[error("tab name {0:?} contains control characters")]
    InvalidName(String),

    #[error("a tab named \"{0}\" already exists")]
    DuplicateName(String),

    #[error("no tab named \"{0}\"")]
    UnknownTab(String),

    #[error("still waiting for the previous reply")]
    RequestInFlight,

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// A chat request the front end should send upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub id: RequestId,
    pub target: ChatTarget,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone)]
struct PendingRequest {
    id: RequestId,
    target: ChatTarget,
}

pub struct Session<S> {
    store: TabStore<S>,
    tabs: Vec<String>,
    active: ChatTarget,
    transcript: Transcript,
    view: ConversationView,
    pending: Option<PendingRequest>,
    next_request_id: RequestId,
}

impl<S: KeyValueStore> Session<S> {
    /// Restore tabs from storage, activating the first one. With nothing
    /// stored, a default tab is created and persisted.
    pub fn open(store: TabStore<S>) -> Result<Self, SessionError> {
        let tabs = store.list_tab_names()?;
        let mut session = Self {
            store,
            tabs: Vec::new(),
            active: ChatTarget::Temporary,
            transcript: Transcript::new(),
            view: ConversationView::new(),
            pending: None,
            next_request_id: 1,
        };

        match tabs.first().cloned() {
            None => {
                tracing::info!("no stored tabs, creating \"{DEFAULT_TAB_NAME}\"");
                session.create_tab(DEFAULT_TAB_NAME)?;
            }
            Some(first) => {
                tracing::info!(count = tabs.len(), "restored tabs");
                session.tabs = tabs;
                session.select_tab(&first)?;
            }
        }

        Ok(session)
    }

    pub fn tabs(&self) -> &[String] {
        &self.tabs
    }

    pub fn active(&self) -> &ChatTarget {
        &self.active
    }

    pub fn active_index(&self) -> Option<usize> {
        let name = self.active.tab_name()?;
        self.tabs.iter().position(|tab| tab == name)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn view(&self) -> &ConversationView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ConversationView {
        &mut self.view
    }

    pub fn store(&self) -> &TabStore<S> {
        &self.store
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_id(&self) -> Option<RequestId> {
        self.pending.as_ref().map(|p| p.id)
    }

    pub fn create_tab(&mut self, name: &str) -> Result<(), SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        if name.chars().any(char::is_control) {
            return Err(SessionError::InvalidName(name.to_string()));
        }
        if self.tabs.iter().any(|tab| tab == name) {
            return Err(SessionError::DuplicateName(name.to_string()));
        }

        self.cancel_pending();
        self.store.save(name, &Transcript::new())?;
        self.tabs.push(name.to_string());
        self.active = ChatTarget::Tab(name.to_string());
        self.transcript = Transcript::new();
        self.view.clear();

        tracing::info!(tab = name, "created tab");
        Ok(())
    }

    pub fn select_tab(&mut self, name: &str) -> Result<(), SessionError> {
        if !self.tabs.iter().any(|tab| tab == name) {
            return Err(SessionError::UnknownTab(name.to_string()));
        }
        if self.active.tab_name() == Some(name) {
            return Ok(());
        }

        let transcript = self.store.load(name)?;
        self.cancel_pending();
        self.active = ChatTarget::Tab(name.to_string());
        self.transcript = transcript;
        self.view.rebuild(&self.transcript);

        tracing::info!(tab = name, messages = self.transcript.len(), "selected tab");
        Ok(())
    }

    pub fn delete_tab(&mut self, name: &str) -> Result<(), SessionError> {
        let Some(index) = self.tabs.iter().position(|tab| tab == name) else {
            return Err(SessionError::UnknownTab(name.to_string()));
        };

        self.store.delete(name)?;
        self.tabs.remove(index);

        if self.active.tab_name() == Some(name) {
            self.cancel_pending();
            self.active = ChatTarget::Temporary;
            self.transcript = Transcript::new();
            self.view.clear();
        }

        tracing::info!(tab = name, "deleted tab");
        Ok(())
    }

    /// Switch to a chat that is never written to storage
    pub fn start_temporary_chat(&mut self) {
        self.cancel_pending();
        self.active = ChatTarget::Temporary;
        self.transcript = Transcript::new();
        self.view.clear();

        tracing::info!("started temporary chat");
    }

    /// Append the user's message and hand back the request to send.
    ///
    /// Blank input is ignored. Only one request may be in flight.
    pub fn submit(&mut self, text: &str) -> Result<Option<OutgoingRequest>, SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::RequestInFlight);
        }
        if text.trim().is_empty() {
            return Ok(None);
        }

        let message = ChatMessage::user(text);
        self.commit(message)?;

        let id = self.next_request_id;
        self.next_request_id += 1;
        self.pending = Some(PendingRequest {
            id,
            target: self.active.clone(),
        });

        tracing::debug!(id, target = ?self.active, "queued chat request");
        Ok(Some(OutgoingRequest {
            id,
            target: self.active.clone(),
            messages: self.transcript.messages().to_vec(),
        }))
    }

    /// Deliver the outcome of a request. Returns `false` when the request
    /// was cancelled or superseded and the result was dropped.
    pub fn complete(
        &mut self,
        id: RequestId,
        result: Result<String, ChatError>,
    ) -> Result<bool, SessionError> {
        match &self.pending {
            Some(pending) if pending.id == id && pending.target == self.active => {}
            _ => {
                tracing::debug!(id, "dropping response for a stale request");
                return Ok(false);
            }
        }
        self.pending = None;

        match result {
            Ok(reply) => {
                tracing::debug!(id, chars = reply.len(), "received reply");
                self.commit(ChatMessage::assistant(reply))?;
            }
            Err(e) => {
                tracing::warn!(id, "chat request failed: {e}");
                self.view.append(Card::error(e.user_message()));
            }
        }
        Ok(true)
    }

    /// Forget the in-flight request, if any, so its result will be dropped
    pub fn cancel_pending(&mut self) -> Option<RequestId> {
        let pending = self.pending.take()?;
        tracing::debug!(id = pending.id, "cancelled chat request");
        Some(pending.id)
    }

    /// Raw text of a copyable card
    pub fn copy_text(&self, card_index: usize) -> Option<&str> {
        self.view
            .cards()
            .get(card_index)
            .filter(|card| card.copyable())
            .map(|card| card.raw.as_str())
    }

    pub fn last_copyable_index(&self) -> Option<usize> {
        self.view.cards().iter().rposition(|card| card.copyable())
    }

    /// Append a message once it is stored. On a failed save neither the
    /// transcript nor the view changes.
    fn commit(&mut self, message: ChatMessage) -> Result<(), SessionError> {
        if let ChatTarget::Tab(name) = &self.active {
            let mut candidate = self.transcript.clone();
            candidate.push(message.clone());
            self.store.save(name, &candidate)?;
        }

        self.view.append(Card::from_message(&message));
        self.transcript.push(message);
        Ok(())
    }
}
