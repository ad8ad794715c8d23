//! Message pipeline
//!
//! Drives a single send from validation to a terminal outcome:
//!
//! ```text
//! Idle -> Validating -> SessionResolved -> Sending -> Succeeded
//!                                            |  ^
//!                                            v  |
//!                                          Retrying -> Failed
//! ```
//!
//! A send that is superseded by a newer one, or torn down, ends `Cancelled`
//! and never touches session state after that point.
//!
//! The user message is committed before any network I/O. The reply (or the
//! synthetic error message) is committed through
//! [`SessionAction::CompleteExchange`], which re-inserts the user message only
//! if it went missing.

use crate::api::ChatRequest;
use crate::config::ClientConfig;
use crate::error::{Result, TutorError};
use crate::metrics::SendMetrics;
use crate::progress::ProgressTracker;
use crate::session::{ChatSession, Difficulty, Message, SessionAction, SessionRepository};
use metrics::increment_counter;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

pub mod transport;

pub use transport::{ChatTransport, HttpChatTransport, TransportError};

/// Reply appended to the session when a send fails
pub const APOLOGY_MESSAGE: &str =
    "I'm sorry, I couldn't respond to that right now. Please try again in a moment.";

/// Error state used when a send fails for an unexpected internal reason
pub const INTERNAL_ERROR_MESSAGE: &str =
    "Something went wrong while sending your message. Please try again.";

/// Where the most recent send currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    /// No send has started, or the pipeline was reset
    Idle,
    /// Checking the message content
    Validating,
    /// Target session is known
    SessionResolved,
    /// An attempt is in flight
    Sending,
    /// Waiting out a backoff before the next attempt
    Retrying,
    /// The reply was committed
    Succeeded,
    /// The error message was committed
    Failed,
    /// Superseded or torn down
    Cancelled,
}

impl SendPhase {
    /// Whether a send is still running in this phase
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            SendPhase::Validating
                | SendPhase::SessionResolved
                | SendPhase::Sending
                | SendPhase::Retrying
        )
    }
}

/// Terminal result of [`MessagePipeline::send_message`]
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Empty content; nothing happened
    Rejected,
    /// The reply was appended
    Succeeded {
        /// Session the exchange belongs to
        session_id: String,
        /// The committed assistant reply
        reply: Message,
    },
    /// The send failed; `error` is suitable for showing to the learner
    Failed {
        /// Human-readable error
        error: String,
        /// Reply text the endpoint supplied with its error
        fallback: Option<String>,
    },
    /// A newer send or a teardown took over
    Cancelled,
}

impl SendOutcome {
    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            SendOutcome::Rejected => "rejected",
            SendOutcome::Succeeded { .. } => "succeeded",
            SendOutcome::Failed { .. } => "failed",
            SendOutcome::Cancelled => "cancelled",
        }
    }
}

/// Subject and difficulty applied to sessions the pipeline creates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineContext {
    /// Subject being studied
    pub subject: Option<String>,
    /// Requested tutoring level
    pub difficulty: Option<Difficulty>,
}

struct PipelineState {
    current_session: Option<String>,
    context: PipelineContext,
    phase: SendPhase,
    last_error: Option<String>,
    generation: u64,
    cancel: CancellationToken,
}

enum Delivery {
    Reply(String),
    Failed(TransportError),
    Cancelled,
}

/// Sends learner messages and commits the results to the session repository
pub struct MessagePipeline {
    config: ClientConfig,
    sessions: Arc<SessionRepository>,
    progress: Arc<ProgressTracker>,
    transport: Arc<dyn ChatTransport>,
    state: Mutex<PipelineState>,
}

impl MessagePipeline {
    /// Create a pipeline with no current session
    pub fn new(
        config: ClientConfig,
        sessions: Arc<SessionRepository>,
        progress: Arc<ProgressTracker>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            config,
            sessions,
            progress,
            transport,
            state: Mutex::new(PipelineState {
                current_session: None,
                context: PipelineContext::default(),
                phase: SendPhase::Idle,
                last_error: None,
                generation: 0,
                cancel: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Phase of the most recent send
    pub fn phase(&self) -> SendPhase {
        self.lock().phase
    }

    /// Whether a send is in flight
    pub fn is_loading(&self) -> bool {
        self.phase().is_in_flight()
    }

    /// Error from the most recent failed send
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Dismiss the current error
    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    /// Id of the session new messages go to
    pub fn current_session_id(&self) -> Option<String> {
        self.lock().current_session.clone()
    }

    /// Copy of the session new messages go to
    pub fn current_session(&self) -> Option<ChatSession> {
        let id = self.current_session_id()?;
        self.sessions.session(&id)
    }

    /// Subject and difficulty for new sessions
    pub fn context(&self) -> PipelineContext {
        self.lock().context.clone()
    }

    /// Set subject and difficulty for sessions created from now on
    pub fn set_context(&self, subject: Option<String>, difficulty: Option<Difficulty>) {
        self.lock().context = PipelineContext {
            subject,
            difficulty,
        };
    }

    /// Abandon any in-flight send and start the next message in a fresh
    /// session
    pub fn new_chat(&self) {
        let mut state = self.lock();
        Self::reset(&mut state);
        state.current_session = None;
        tracing::debug!("Starting new chat");
    }

    /// Abandon any in-flight send and direct new messages to `session_id`
    ///
    /// # Errors
    ///
    /// Returns `TutorError::SessionNotFound` if the session does not exist
    pub fn select_session(&self, session_id: &str) -> Result<()> {
        if self.sessions.session(session_id).is_none() {
            return Err(TutorError::SessionNotFound(session_id.to_string()).into());
        }

        let mut state = self.lock();
        Self::reset(&mut state);
        state.current_session = Some(session_id.to_string());
        tracing::debug!(session_id, "Selected session");
        Ok(())
    }

    /// Cancel any in-flight send
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.phase.is_in_flight() {
            state.phase = SendPhase::Cancelled;
        }
        state.cancel.cancel();
    }

    fn reset(state: &mut PipelineState) {
        state.cancel.cancel();
        state.cancel = CancellationToken::new();
        state.generation += 1;
        state.phase = SendPhase::Idle;
        state.last_error = None;
    }

    /// Send `content` as the learner's next message
    ///
    /// Never fails: every error ends as [`SendOutcome::Failed`] with an error
    /// message committed to the session, or [`SendOutcome::Cancelled`] when
    /// a newer send took over.
    pub async fn send_message(&self, content: &str) -> SendOutcome {
        let content = content.trim();
        if content.is_empty() {
            tracing::warn!("Ignoring empty message");
            increment_counter!("pipeline_sends_total", "outcome" => "rejected");
            return SendOutcome::Rejected;
        }

        let metrics = SendMetrics::start();
        let (generation, token) = self.begin();

        let outcome = match self.run(content, generation, &token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Send failed unexpectedly");
                if self.is_live(generation, &token) {
                    self.finish(
                        generation,
                        SendPhase::Failed,
                        Some(INTERNAL_ERROR_MESSAGE.to_string()),
                    );
                    SendOutcome::Failed {
                        error: INTERNAL_ERROR_MESSAGE.to_string(),
                        fallback: None,
                    }
                } else {
                    SendOutcome::Cancelled
                }
            }
        };

        metrics.record(outcome.label());
        outcome
    }

    /// Supersede the previous send and claim a new generation
    fn begin(&self) -> (u64, CancellationToken) {
        let mut state = self.lock();
        if state.phase.is_in_flight() {
            tracing::debug!(generation = state.generation, "Superseding in-flight send");
        }
        state.cancel.cancel();
        state.cancel = CancellationToken::new();
        state.generation += 1;
        state.phase = SendPhase::Validating;
        state.last_error = None;
        (state.generation, state.cancel.clone())
    }

    fn is_live(&self, generation: u64, token: &CancellationToken) -> bool {
        !token.is_cancelled() && self.lock().generation == generation
    }

    fn set_phase(&self, generation: u64, phase: SendPhase) {
        let mut state = self.lock();
        if state.generation == generation {
            state.phase = phase;
        }
    }

    fn finish(&self, generation: u64, phase: SendPhase, error: Option<String>) {
        let mut state = self.lock();
        if state.generation == generation {
            state.phase = phase;
            state.last_error = error;
        }
    }

    async fn run(
        &self,
        content: &str,
        generation: u64,
        token: &CancellationToken,
    ) -> Result<SendOutcome> {
        let (session_id, created) = match self.current_session_id() {
            Some(id) => (id, false),
            None => {
                let context = self.context();
                let session = ChatSession::new(context.subject, context.difficulty);
                let id = session.id.clone();
                self.sessions.dispatch(SessionAction::Create(session))?;
                self.progress.record_session_created();
                self.lock().current_session = Some(id.clone());
                tracing::info!(session_id = %id, "Created session");
                (id, true)
            }
        };
        self.set_phase(generation, SendPhase::SessionResolved);

        // The learner's text is committed even if this send is superseded below.
        let user_message = Message::user(content);
        self.sessions.dispatch(SessionAction::AppendMessage {
            session_id: session_id.clone(),
            message: user_message.clone(),
        })?;

        if created {
            tokio::select! {
                _ = token.cancelled() => return Ok(SendOutcome::Cancelled),
                _ = tokio::time::sleep(self.config.session_settle()) => {}
            }
        }
        if !self.is_live(generation, token) {
            return Ok(SendOutcome::Cancelled);
        }

        let session = self
            .sessions
            .session(&session_id)
            .ok_or_else(|| TutorError::SessionNotFound(session_id.clone()))?;
        let request = ChatRequest::from_session(&session);

        self.set_phase(generation, SendPhase::Sending);
        let delivery = self.deliver(&request, generation, token).await;
        if !self.is_live(generation, token) {
            tracing::debug!(session_id = %session_id, "Send superseded, discarding result");
            return Ok(SendOutcome::Cancelled);
        }

        match delivery {
            Delivery::Cancelled => Ok(SendOutcome::Cancelled),
            Delivery::Reply(text) => {
                let reply = Message::assistant(text);
                self.sessions.dispatch(SessionAction::CompleteExchange {
                    session_id: session_id.clone(),
                    user_message,
                    reply: reply.clone(),
                })?;
                self.progress
                    .record_exchange(content, session.subject.as_deref());
                self.finish(generation, SendPhase::Succeeded, None);
                tracing::debug!(session_id = %session_id, "Reply committed");

                Ok(SendOutcome::Succeeded { session_id, reply })
            }
            Delivery::Failed(e) => {
                let error = e.user_message();
                let fallback = e.fallback().map(str::to_string);
                tracing::warn!(session_id = %session_id, error = %e, "Send failed");
                self.sessions.dispatch(SessionAction::CompleteExchange {
                    session_id,
                    user_message,
                    reply: Message::error(APOLOGY_MESSAGE),
                })?;
                self.finish(generation, SendPhase::Failed, Some(error.clone()));

                Ok(SendOutcome::Failed { error, fallback })
            }
        }
    }

    /// Attempt the request, retrying transport failures with exponential
    /// backoff
    async fn deliver(
        &self,
        request: &ChatRequest,
        generation: u64,
        token: &CancellationToken,
    ) -> Delivery {
        let max_attempts = self.config.max_retries + 1;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = tokio::select! {
                _ = token.cancelled() => return Delivery::Cancelled,
                r = tokio::time::timeout(self.config.request_timeout(), self.transport.send(request)) => {
                    r.unwrap_or(Err(TransportError::Timeout))
                }
            };

            match result {
                Ok(reply) => return Delivery::Reply(reply),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.retry_base_delay() * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Chat request failed, retrying"
                    );
                    increment_counter!("pipeline_retries_total");
                    self.set_phase(generation, SendPhase::Retrying);

                    tokio::select! {
                        _ = token.cancelled() => return Delivery::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    self.set_phase(generation, SendPhase::Sending);
                }
                Err(e) => return Delivery::Failed(e),
            }
        }
    }
}

impl Drop for MessagePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
