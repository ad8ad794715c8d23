//! Chat session data model
//!
//! Sessions own their messages. Messages are immutable once created except
//! for the bookmark flag. Every mutation of the session collection goes
//! through [`reducer::reduce`], applied by the [`SessionRepository`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

pub mod reducer;
pub mod repository;

pub use reducer::{reduce, SessionAction};
pub use repository::SessionRepository;

/// Title given to a session before its first user message
pub const DEFAULT_TITLE: &str = "New Chat";

/// Characters kept when a title is derived from message content
pub const TITLE_MAX_CHARS: usize = 50;

/// Current time in epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Derive a session title from the first user message
///
/// # Examples
///
/// ```
/// use tutorchat::session::derive_title;
///
/// assert_eq!(derive_title("  What is 2+2?  "), "What is 2+2?");
/// assert_eq!(derive_title(&"a".repeat(80)).chars().count(), 50);
/// ```
pub fn derive_title(content: &str) -> String {
    let title: String = content.trim().chars().take(TITLE_MAX_CHARS).collect();
    title.trim_end().to_string()
}

/// Who sent a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The learner
    User,
    /// The tutor model
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Tutoring level requested for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// New to the topic
    Beginner,
    /// Comfortable with the basics
    Intermediate,
    /// Looking for depth and rigor
    Advanced,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Beginner => write!(f, "beginner"),
            Difficulty::Intermediate => write!(f, "intermediate"),
            Difficulty::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(format!(
                "Invalid difficulty: {}. Must be one of: beginner, intermediate, advanced",
                other
            )),
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier (ULID)
    pub id: String,
    /// Message text
    pub content: String,
    /// Sender
    pub role: Role,
    /// Creation time (epoch ms)
    pub timestamp: i64,
    /// Whether the user bookmarked this message
    #[serde(default)]
    pub is_bookmarked: bool,
    /// Whether this is a synthetic error reply
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    fn new(role: Role, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            id: Ulid::new().to_string(),
            content: content.into(),
            role,
            timestamp: now_ms(),
            is_bookmarked: false,
            is_error,
        }
    }

    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use tutorchat::session::{Message, Role};
    ///
    /// let msg = Message::user("Explain photosynthesis");
    /// assert_eq!(msg.role, Role::User);
    /// assert!(!msg.is_error);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, false)
    }

    /// Creates a new assistant reply
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, false)
    }

    /// Creates a synthetic assistant message flagged as an error
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, true)
    }
}

/// One tutoring conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// Unique identifier (ULID)
    pub id: String,
    /// Display title
    pub title: String,
    /// Chronological message history
    pub messages: Vec<Message>,
    /// Creation time (epoch ms)
    pub created_at: i64,
    /// Last mutation time (epoch ms), never before `created_at`
    pub updated_at: i64,
    /// Subject being studied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Requested tutoring level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

impl ChatSession {
    /// Create an empty session with the default title
    pub fn new(subject: Option<String>, difficulty: Option<Difficulty>) -> Self {
        let now = now_ms();
        Self {
            id: Ulid::new().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            subject,
            difficulty,
        }
    }

    /// Whether the session contains a message from the user
    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    /// Number of bookmarked messages
    pub fn bookmark_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_bookmarked).count()
    }

    /// First eight characters of the id, for display
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

/// A bookmarked message together with the session it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkEntry {
    /// Owning session id
    pub session_id: String,
    /// Owning session title at the time of the write
    pub session_title: String,
    /// The bookmarked message
    pub message: Message,
}

/// Collect every bookmarked message, newest session first
pub fn collect_bookmarks(sessions: &[ChatSession]) -> Vec<BookmarkEntry> {
    sessions
        .iter()
        .flat_map(|session| {
            session
                .messages
                .iter()
                .filter(|m| m.is_bookmarked)
                .map(move |m| BookmarkEntry {
                    session_id: session.id.clone(),
                    session_title: session.title.clone(),
                    message: m.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_defaults() {
        let session = ChatSession::new(Some("math".into()), Some(Difficulty::Beginner));
        assert_eq!(session.title, DEFAULT_TITLE);
        assert!(session.messages.is_empty());
        assert_eq!(session.created_at, session.updated_at);
        assert_eq!(session.id.len(), 26);
    }

    #[test]
    fn test_derive_title_truncates_to_fifty_chars() {
        let long = "é".repeat(70);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn test_difficulty_parse_and_display() {
        assert_eq!("Advanced".parse::<Difficulty>(), Ok(Difficulty::Advanced));
        assert!("expert".parse::<Difficulty>().is_err());
        assert_eq!(Difficulty::Intermediate.to_string(), "intermediate");
    }

    #[test]
    fn test_message_serializes_camel_case() {
        let msg = Message::error("oops");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["isError"], true);
        assert_eq!(json["isBookmarked"], false);
    }

    #[test]
    fn test_message_flags_default_when_missing() {
        let json = r#"{"id":"m1","content":"hi","role":"user","timestamp":5}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(!msg.is_bookmarked);
        assert!(!msg.is_error);
    }

    #[test]
    fn test_session_omits_absent_optional_fields() {
        let session = ChatSession::new(None, None);
        let json = serde_json::to_string(&session).unwrap();
        assert!(!json.contains("subject"));
        assert!(!json.contains("difficulty"));
        assert!(json.contains("createdAt"));
    }

    #[test]
    fn test_collect_bookmarks() {
        let mut session = ChatSession::new(None, None);
        let mut marked = Message::assistant("keep this");
        marked.is_bookmarked = true;
        session.messages.push(Message::user("q"));
        session.messages.push(marked.clone());

        let bookmarks = collect_bookmarks(&[session.clone()]);
        assert_eq!(bookmarks.len(), 1);
        assert_eq!(bookmarks[0].session_id, session.id);
        assert_eq!(bookmarks[0].message, marked);
    }
}
