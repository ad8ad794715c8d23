//! The single state transform for the session collection
//!
//! `reduce` is a pure function of (collection, action, now). Actions that
//! target a missing session or message leave the collection unchanged; the
//! repository rejects those before reducing so callers get an error.

use super::{derive_title, ChatSession, Message, Role, DEFAULT_TITLE};

/// A mutation of the session collection
#[derive(Debug, Clone)]
pub enum SessionAction {
    /// Insert a new session at the front of the collection
    Create(ChatSession),

    /// Append a message (phase one of a send)
    AppendMessage {
        /// Target session
        session_id: String,
        /// Message to append
        message: Message,
    },

    /// Append a reply, inserting the user message first if it is missing
    /// (phase two of a send)
    CompleteExchange {
        /// Target session
        session_id: String,
        /// The optimistic user message of this exchange
        user_message: Message,
        /// Assistant reply or synthetic error message
        reply: Message,
    },

    /// Flip the bookmark flag of one message
    ToggleBookmark {
        /// Target session
        session_id: String,
        /// Target message
        message_id: String,
    },

    /// Explicitly retitle a session
    Rename {
        /// Target session
        session_id: String,
        /// New title
        title: String,
    },

    /// Remove one session
    Delete {
        /// Target session
        session_id: String,
    },

    /// Remove every session
    ClearAll,
}

impl SessionAction {
    /// Session this action operates on, if any
    pub fn target_session(&self) -> Option<&str> {
        match self {
            SessionAction::AppendMessage { session_id, .. }
            | SessionAction::CompleteExchange { session_id, .. }
            | SessionAction::ToggleBookmark { session_id, .. }
            | SessionAction::Rename { session_id, .. }
            | SessionAction::Delete { session_id } => Some(session_id),
            SessionAction::Create(_) | SessionAction::ClearAll => None,
        }
    }

    /// Whether the persisted bookmarks list may change
    pub fn affects_bookmarks(&self) -> bool {
        matches!(
            self,
            SessionAction::ToggleBookmark { .. }
                | SessionAction::Rename { .. }
                | SessionAction::Delete { .. }
                | SessionAction::ClearAll
        )
    }

    /// Short label for logs
    pub fn name(&self) -> &'static str {
        match self {
            SessionAction::Create(_) => "create",
            SessionAction::AppendMessage { .. } => "append_message",
            SessionAction::CompleteExchange { .. } => "complete_exchange",
            SessionAction::ToggleBookmark { .. } => "toggle_bookmark",
            SessionAction::Rename { .. } => "rename",
            SessionAction::Delete { .. } => "delete",
            SessionAction::ClearAll => "clear_all",
        }
    }
}

fn touch(session: &mut ChatSession, now_ms: i64) {
    session.updated_at = session.updated_at.max(now_ms).max(session.created_at);
}

fn append(session: &mut ChatSession, message: Message) {
    if message.role == Role::User && !session.has_user_message() && session.title == DEFAULT_TITLE
    {
        let title = derive_title(&message.content);
        if !title.is_empty() {
            session.title = title;
        }
    }
    session.messages.push(message);
}

/// Apply `action` to `sessions`
pub fn reduce(mut sessions: Vec<ChatSession>, action: SessionAction, now_ms: i64) -> Vec<ChatSession> {
    match action {
        SessionAction::Create(session) => {
            if sessions.iter().any(|s| s.id == session.id) {
                tracing::debug!(session_id = %session.id, "Session already exists, ignoring create");
            } else {
                sessions.insert(0, session);
            }
        }
        SessionAction::AppendMessage {
            session_id,
            message,
        } => {
            if let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) {
                append(session, message);
                touch(session, now_ms);
            }
        }
        SessionAction::CompleteExchange {
            session_id,
            user_message,
            reply,
        } => {
            if let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) {
                let already_committed = session.messages.iter().any(|m| {
                    m.id == user_message.id
                        || (m.role == user_message.role && m.content == user_message.content)
                });
                if !already_committed {
                    append(session, user_message);
                }
                session.messages.push(reply);
                touch(session, now_ms);
            }
        }
        SessionAction::ToggleBookmark {
            session_id,
            message_id,
        } => {
            if let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) {
                if let Some(message) = session.messages.iter_mut().find(|m| m.id == message_id) {
                    message.is_bookmarked = !message.is_bookmarked;
                    touch(session, now_ms);
                }
            }
        }
        SessionAction::Rename { session_id, title } => {
            if let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) {
                session.title = title;
                touch(session, now_ms);
            }
        }
        SessionAction::Delete { session_id } => {
            sessions.retain(|s| s.id != session_id);
        }
        SessionAction::ClearAll => sessions.clear(),
    }
    sessions
}
