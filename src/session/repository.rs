//! Session repository
//!
//! Owns the in-memory session collection and mirrors it to the persistent
//! store after every change. Updates are applied as whole-collection
//! transforms under one lock, so two callers that race never lose each
//! other's changes.

use super::reducer::{reduce, SessionAction};
use super::{collect_bookmarks, now_ms, BookmarkEntry, ChatSession};
use crate::error::{Result, TutorError};
use crate::storage::{PersistentStore, WriteOutcome, BOOKMARKS_KEY, SESSIONS_KEY};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Typed, persisted session collection
pub struct SessionRepository {
    store: PersistentStore,
    sessions: Mutex<Vec<ChatSession>>,
}

impl SessionRepository {
    /// Load the collection from the store, dropping invalid entries
    pub fn load(store: PersistentStore) -> Self {
        let (sessions, dropped) = validate_stored(store.read_value(SESSIONS_KEY));
        if dropped > 0 {
            tracing::warn!(dropped, kept = sessions.len(), "Dropped invalid stored sessions");
        }
        tracing::debug!(count = sessions.len(), "Loaded sessions");

        Self {
            store,
            sessions: Mutex::new(sessions),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ChatSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the current collection
    pub fn snapshot(&self) -> Vec<ChatSession> {
        self.lock().clone()
    }

    /// Copy of one session
    pub fn session(&self, id: &str) -> Option<ChatSession> {
        self.lock().iter().find(|s| s.id == id).cloned()
    }

    /// Resolve a session by full id or unique id prefix
    pub fn find(&self, id_or_prefix: &str) -> Option<ChatSession> {
        let sessions = self.lock();
        if let Some(exact) = sessions.iter().find(|s| s.id == id_or_prefix) {
            return Some(exact.clone());
        }

        let needle = id_or_prefix.to_uppercase();
        let mut matches = sessions.iter().filter(|s| s.id.starts_with(&needle));
        match (matches.next(), matches.next()) {
            (Some(only), None) => Some(only.clone()),
            _ => None,
        }
    }

    /// Number of sessions
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Every bookmarked message in the collection
    pub fn bookmarks(&self) -> Vec<BookmarkEntry> {
        collect_bookmarks(&self.lock())
    }

    /// Replace the whole collection
    pub fn set(&self, sessions: Vec<ChatSession>) {
        self.update(|_| sessions);
    }

    /// Replace the collection with a transform of its previous value
    pub fn update<F>(&self, transform: F)
    where
        F: FnOnce(Vec<ChatSession>) -> Vec<ChatSession>,
    {
        let mut sessions = self.lock();
        let next = transform(std::mem::take(&mut *sessions));
        *sessions = next;
        self.persist(&sessions, true);
    }

    /// Validate and apply one action through the reducer
    ///
    /// # Errors
    ///
    /// Returns `TutorError::SessionNotFound`, `TutorError::MessageNotFound`
    /// or `TutorError::InvalidInput` when the action cannot apply; the
    /// collection is left untouched in that case
    pub fn dispatch(&self, action: SessionAction) -> Result<()> {
        let mut sessions = self.lock();
        validate_action(&sessions, &action)?;

        let name = action.name();
        let bookmarks_changed = action.affects_bookmarks();
        let next = reduce(std::mem::take(&mut *sessions), action, now_ms());
        *sessions = next;
        tracing::debug!(action = name, count = sessions.len(), "Applied session action");

        self.persist(&sessions, bookmarks_changed);
        Ok(())
    }

    /// Write the current collection without changing it
    pub fn save(&self) -> WriteOutcome {
        let sessions = self.lock();
        self.store.write(SESSIONS_KEY, &*sessions)
    }

    fn persist(&self, sessions: &[ChatSession], bookmarks_changed: bool) {
        let outcome = self.store.write(SESSIONS_KEY, sessions);
        if !outcome.is_success() {
            tracing::warn!("Sessions not persisted; keeping in-memory copy");
        }
        if bookmarks_changed {
            self.store.write(BOOKMARKS_KEY, &collect_bookmarks(sessions));
        }
    }
}

fn validate_action(sessions: &[ChatSession], action: &SessionAction) -> Result<()> {
    let Some(session_id) = action.target_session() else {
        return Ok(());
    };

    let session = sessions
        .iter()
        .find(|s| s.id == session_id)
        .ok_or_else(|| TutorError::SessionNotFound(session_id.to_string()))?;

    match action {
        SessionAction::ToggleBookmark { message_id, .. } => {
            if !session.messages.iter().any(|m| &m.id == message_id) {
                return Err(TutorError::MessageNotFound(message_id.clone()).into());
            }
        }
        SessionAction::Rename { title, .. } => {
            if title.trim().is_empty() {
                return Err(TutorError::InvalidInput("title cannot be empty".to_string()).into());
            }
        }
        _ => {}
    }

    Ok(())
}

/// Decode stored sessions, dropping entries without a string `id` or an
/// array of `messages`, entries that fail to decode, and duplicate ids
fn validate_stored(value: Option<Value>) -> (Vec<ChatSession>, usize) {
    let entries = match value {
        None => return (Vec::new(), 0),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            tracing::warn!("Stored sessions are not a list, starting empty");
            return (Vec::new(), 0);
        }
    };

    let total = entries.len();
    let mut seen = HashSet::new();
    let sessions: Vec<ChatSession> = entries
        .into_iter()
        .filter(|entry| {
            entry.get("id").map_or(false, Value::is_string)
                && entry.get("messages").map_or(false, Value::is_array)
        })
        .filter_map(|entry| match serde_json::from_value::<ChatSession>(entry) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::debug!(error = %e, "Stored session failed to decode");
                None
            }
        })
        .filter(|session| seen.insert(session.id.clone()))
        .collect();

    let dropped = total - sessions.len();
    (sessions, dropped)
}
