//! Error types for TutorChat
//!
//! This module defines the crate-wide error type, using `thiserror` for
//! ergonomic error handling. Component-specific taxonomies (storage backend,
//! client transport, upstream provider) live next to the code that raises them
//! and convert into [`TutorError`] where they cross a module boundary.

use thiserror::Error;

/// Main error type for TutorChat operations
///
/// Most of these never reach the user: validation and persistence failures are
/// recovered locally, and the message pipeline converts send failures into an
/// in-chat error message instead of propagating them.
#[derive(Error, Debug)]
pub enum TutorError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local key/value storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// A session id that does not exist in the collection
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A message id that does not exist in the session
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Input that failed validation (empty message, bad title, etc.)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Proxy server errors (bind failures, serve loop exit)
    #[error("Server error: {0}")]
    Server(String),

    /// Speech capability errors
    #[error("Speech error: {0}")]
    Speech(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for TutorChat operations
///
/// Uses `anyhow::Error` so callers can attach context; the concrete
/// [`TutorError`] stays reachable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;
