//! Session store: the single source of truth for sessions and their
//! message logs.
//!
//! Sessions are kept newest first. Exactly one session is current once any
//! exists. Message history only grows through `append_turn`, one
//! user/assistant pair at a time.

use std::sync::{Arc, Mutex, MutexGuard};

use smartgov_core::Role;

use crate::error::ChatError;
use crate::transport::SessionBackend;
use crate::types::{Message, Session};

#[derive(Default)]
struct StoreInner {
    sessions: Vec<Session>,
    current: Option<String>,
}

impl StoreInner {
    fn find_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }
}

/// Owns the session list, the current selection and every message log.
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    inner: Mutex<StoreInner>,
    title_max_chars: usize,
}

impl SessionStore {
    /// Create an empty store allocating sessions through `backend`.
    ///
    /// `title_max_chars` bounds the title derived from a session's first
    /// user message.
    pub fn new(backend: Arc<dyn SessionBackend>, title_max_chars: usize) -> Self {
        Self {
            backend,
            inner: Mutex::new(StoreInner::default()),
            title_max_chars,
        }
    }

    // A poisoned lock still guards consistent data: every mutation below
    // completes before it can panic.
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All sessions, most recently created first.
    pub fn list_sessions(&self) -> Vec<Session> {
        self.lock().sessions.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    /// The current session, if any.
    pub fn current(&self) -> Option<Session> {
        let inner = self.lock();
        let id = inner.current.as_deref()?;
        inner.sessions.iter().find(|s| s.id == id).cloned()
    }

    pub fn current_id(&self) -> Option<String> {
        self.lock().current.clone()
    }

    /// Look up a session by id.
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.lock()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
    }

    /// Message log of a session, in append order.
    pub fn messages(&self, session_id: &str) -> Result<Vec<Message>, ChatError> {
        self.get(session_id)
            .map(|s| s.messages)
            .ok_or_else(|| ChatError::NotFound(session_id.to_string()))
    }

    /// Allocate a session on the backend, insert it first and make it current.
    ///
    /// Nothing is inserted if the backend cannot allocate an id.
    pub async fn create_session(&self) -> Result<Session, ChatError> {
        let record = self.backend.create_session().await.map_err(|e| {
            tracing::warn!(error = %e, "Session allocation failed");
            ChatError::BackendUnavailable(e.to_string())
        })?;

        if record.id.trim().is_empty() {
            return Err(ChatError::BackendUnavailable(
                "backend returned an empty session id".to_string(),
            ));
        }

        let session = Session::from(record);
        {
            let mut inner = self.lock();
            inner.sessions.retain(|s| s.id != session.id);
            inner.sessions.insert(0, session.clone());
            inner.current = Some(session.id.clone());
        }

        tracing::info!(session_id = %session.id, "Session created");
        Ok(session)
    }

    /// Replace the in-memory list with the backend's and select the first
    /// session, creating one if the backend has none.
    ///
    /// On failure the previous list is kept.
    pub async fn load_sessions(&self) -> Result<Vec<Session>, ChatError> {
        let records = self.backend.list_sessions().await.map_err(|e| {
            tracing::warn!(error = %e, "Session listing failed");
            ChatError::BackendUnavailable(e.to_string())
        })?;

        if records.is_empty() {
            tracing::info!("No sessions on backend, creating one");
            {
                let mut inner = self.lock();
                inner.sessions.clear();
                inner.current = None;
            }
            self.create_session().await?;
            return Ok(self.list_sessions());
        }

        let sessions: Vec<Session> = records.into_iter().map(Session::from).collect();
        {
            let mut inner = self.lock();
            inner.current = sessions.first().map(|s| s.id.clone());
            inner.sessions = sessions.clone();
        }

        tracing::info!(count = sessions.len(), "Sessions loaded");
        Ok(sessions)
    }

    /// Make the session with `session_id` current.
    ///
    /// Only the in-memory list is consulted.
    pub fn select_session(&self, session_id: &str) -> Result<Session, ChatError> {
        let mut inner = self.lock();
        let session = inner
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(|| ChatError::NotFound(session_id.to_string()))?;
        inner.current = Some(session.id.clone());
        tracing::info!(session_id = %session.id, "Session selected");
        Ok(session)
    }

    /// Append a user message and its assistant reply as one unit.
    ///
    /// Either both messages are appended or neither is. The first turn of an
    /// untitled session also names it after the user text.
    pub fn append_turn(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(Message, Message), ChatError> {
        let title_max_chars = self.title_max_chars;
        let mut inner = self.lock();
        let session = inner
            .find_mut(session_id)
            .ok_or_else(|| ChatError::NotFound(session_id.to_string()))?;

        let user = Message::new(Role::User, user_text);
        let assistant = Message::new(Role::Assistant, assistant_text);
        session.messages.push(user.clone());
        session.messages.push(assistant.clone());

        if session.title.is_none() && session.messages.len() == 2 {
            session.title = Some(user_text.chars().take(title_max_chars).collect());
        }

        tracing::debug!(
            session_id = %session_id,
            messages = session.messages.len(),
            "Turn appended"
        );
        Ok((user, assistant))
    }
}

// =============================================================================
// Tests
// =============================================================================
