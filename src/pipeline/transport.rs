//! Client side of `POST /api/chat`

use crate::api::{ChatRequest, ChatResponse, ErrorBody};
use crate::error::{Result, TutorError};
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// Why a chat request produced no reply
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never completed (connection refused, reset, DNS, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// The attempt exceeded its deadline
    #[error("Request timed out")]
    Timeout,

    /// The endpoint answered with a non-2xx status
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Error text reported by the endpoint
        message: String,
        /// Fallback reply supplied by the endpoint, if any
        fallback: Option<String>,
    },

    /// A 2xx response whose body was not a chat reply
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Only failures where the request may not have reached the endpoint
    /// are worth repeating
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Network(_) | TransportError::Timeout)
    }

    /// Reply text the endpoint sent along with its error, if any
    pub fn fallback(&self) -> Option<&str> {
        match self {
            TransportError::Status { fallback, .. } => fallback
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty()),
            _ => None,
        }
    }

    /// Text suitable for showing to the learner
    ///
    /// # Examples
    ///
    /// ```
    /// use tutorchat::pipeline::TransportError;
    ///
    /// let err = TransportError::Status {
    ///     status: 429,
    ///     message: "Too many requests".into(),
    ///     fallback: None,
    /// };
    /// assert!(err.user_message().contains("rate limit"));
    /// ```
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Status { status: 429, .. } => {
                "You're sending messages too quickly and hit the rate limit. Please wait a minute and try again.".to_string()
            }
            TransportError::Status { status: 503, .. } => {
                "The tutor service is temporarily unavailable. Please try again shortly.".to_string()
            }
            TransportError::Status { status, .. } if *status >= 500 => {
                format!("The server encountered an error ({}). Please try again later.", status)
            }
            TransportError::Status {
                status, message, ..
            } => format!("The request was rejected ({}): {}", status, message),
            TransportError::Timeout => {
                "The request timed out. Please check your connection and try again.".to_string()
            }
            TransportError::Network(_) => {
                "Could not reach the tutor service. Please check your network connection."
                    .to_string()
            }
            TransportError::Decode(_) => {
                "Received an unexpected response from the tutor service.".to_string()
            }
        }
    }
}

/// Sends one chat request and returns the reply text
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Perform a single attempt; retries and deadlines are the caller's job
    async fn send(&self, request: &ChatRequest) -> std::result::Result<String, TransportError>;
}

/// [`ChatTransport`] over HTTP to a proxy endpoint
#[derive(Debug, Clone)]
pub struct HttpChatTransport {
    client: Client,
    url: String,
}

impl HttpChatTransport {
    /// Create a transport for the endpoint at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    ///
    /// # Examples
    ///
    /// ```
    /// use tutorchat::pipeline::HttpChatTransport;
    ///
    /// let transport = HttpChatTransport::new("http://127.0.0.1:3000/").unwrap();
    /// assert_eq!(transport.url(), "http://127.0.0.1:3000/api/chat");
    /// ```
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tutorchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TutorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let url = format!("{}/api/chat", base_url.trim_end_matches('/'));
        tracing::debug!("Initialized chat transport: url={}", url);

        Ok(Self { client, url })
    }

    /// Full request URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send(&self, request: &ChatRequest) -> std::result::Result<String, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::warn!("Chat endpoint returned error {}: {}", status, body);
            let (message, fallback) = match serde_json::from_str::<ErrorBody>(&body) {
                Ok(parsed) => (parsed.error, parsed.message),
                Err(_) if !body.trim().is_empty() => (body, None),
                Err(_) => (
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown error")
                        .to_string(),
                    None,
                ),
            };
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
                fallback,
            });
        }

        let reply: ChatResponse =
            serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;
        if reply.message.trim().is_empty() {
            return Err(TransportError::Decode("empty reply".to_string()));
        }

        Ok(reply.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> TransportError {
        TransportError::Status {
            status: code,
            message: "Bad things".into(),
            fallback: None,
        }
    }

    #[test]
    fn test_only_network_and_timeout_retry() {
        assert!(TransportError::Network("refused".into()).is_retryable());
        assert!(TransportError::Timeout.is_retryable());
        assert!(!status(500).is_retryable());
        assert!(!status(429).is_retryable());
        assert!(!TransportError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_user_messages_by_status() {
        assert!(status(503).user_message().contains("temporarily unavailable"));
        assert!(status(500).user_message().contains("server encountered an error"));
        assert!(status(400).user_message().contains("Bad things"));
        assert!(TransportError::Timeout.user_message().contains("timed out"));
        assert!(TransportError::Network("x".into())
            .user_message()
            .contains("network"));
    }

    #[test]
    fn test_fallback_only_from_status_with_text() {
        let with_text = TransportError::Status {
            status: 503,
            message: "AI service temporarily unavailable".into(),
            fallback: Some(" Let's try that again in a moment. ".into()),
        };
        assert_eq!(with_text.fallback(), Some("Let's try that again in a moment."));

        let blank = TransportError::Status {
            status: 500,
            message: "oops".into(),
            fallback: Some("   ".into()),
        };
        assert_eq!(blank.fallback(), None);
        assert_eq!(status(503).fallback(), None);
        assert_eq!(TransportError::Timeout.fallback(), None);
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let transport = HttpChatTransport::new("http://localhost:9999").unwrap();
        assert_eq!(transport.url(), "http://localhost:9999/api/chat");
    }
}
