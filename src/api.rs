//! Wire types shared by the chat client and the proxy endpoint

use crate::session::{ChatSession, Difficulty, Role};
use serde::{Deserialize, Serialize};

/// One conversation turn as sent over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Sender of the turn
    pub role: Role,
    /// Turn text
    pub content: String,
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far, oldest first
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    /// Subject being studied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Requested tutoring level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

impl ChatRequest {
    /// Build a request carrying every message of `session`
    ///
    /// # Examples
    ///
    /// ```
    /// use tutorchat::api::ChatRequest;
    /// use tutorchat::session::{ChatSession, Message};
    ///
    /// let mut session = ChatSession::new(Some("math".into()), None);
    /// session.messages.push(Message::user("What is 2+2?"));
    ///
    /// let request = ChatRequest::from_session(&session);
    /// assert_eq!(request.messages.len(), 1);
    /// assert_eq!(request.subject.as_deref(), Some("math"));
    /// ```
    pub fn from_session(session: &ChatSession) -> Self {
        Self {
            messages: session
                .messages
                .iter()
                .map(|m| ChatTurn {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
            subject: session.subject.clone(),
            difficulty: session.difficulty,
        }
    }
}

/// Successful reply body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Tutor reply text
    pub message: String,
}

/// Error reply body; `message` carries fallback text the client may show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short description of what went wrong
    pub error: String,
    /// Fallback reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Error without fallback text
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    /// Error with fallback text
    pub fn with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
        }
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server answers
    pub status: String,
    /// Crate version
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request = ChatRequest {
            messages: vec![ChatTurn {
                role: Role::User,
                content: "hi".into(),
            }],
            subject: None,
            difficulty: Some(Difficulty::Beginner),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"messages": [{"role": "user", "content": "hi"}], "difficulty": "beginner"})
        );
    }

    #[test]
    fn test_request_messages_default_to_empty() {
        let request: ChatRequest = serde_json::from_str(r#"{"subject":"history"}"#).unwrap();
        assert!(request.messages.is_empty());
    }

    #[test]
    fn test_error_body_omits_missing_message() {
        let value = serde_json::to_value(ErrorBody::new("Messages are required")).unwrap();
        assert_eq!(value, json!({"error": "Messages are required"}));
    }
}
