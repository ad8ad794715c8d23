//! TutorChat - AI tutoring chat client and proxy library
//!
//! This library provides the core functionality for TutorChat: learner
//! sessions and their persistence, the message pipeline that talks to the
//! tutor, progress tracking, preferences, and the proxy endpoint that relays
//! conversations to a model provider.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Session and message model, the reducer and the repository
//! - `storage`: JSON key/value persistence with capacity handling
//! - `pipeline`: Send state machine, retries and the HTTP transport
//! - `progress`: Learning statistics and keyword extraction
//! - `preferences`: Learner preferences
//! - `capability`: Speech synthesis and recognition probing
//! - `proxy`: Rate-limited `/api/chat` endpoint and upstream provider
//! - `api`: Wire types shared by the client and the proxy
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use tutorchat::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod capability;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod preferences;
pub mod progress;
pub mod proxy;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, TutorError};
pub use pipeline::{MessagePipeline, SendOutcome};
pub use session::{ChatSession, Message, SessionRepository};
