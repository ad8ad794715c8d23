//! Command handlers for TutorChat
//!
//! Each CLI subcommand maps to a handler here. Local commands open the
//! persistent store through [`LocalState`]; `serve` runs the proxy.

pub mod sessions;
pub mod special_commands;
pub mod stats;

use crate::config::StorageConfig;
use crate::error::Result;
use crate::preferences::PreferenceStore;
use crate::progress::ProgressTracker;
use crate::session::SessionRepository;
use crate::storage::{PersistentStore, DEFAULT_CAPACITY_BYTES};
use std::sync::Arc;

/// Repositories backed by one local store
pub struct LocalState {
    /// Session collection
    pub sessions: Arc<SessionRepository>,
    /// Learning progress
    pub progress: Arc<ProgressTracker>,
    /// Learner preferences
    pub preferences: PreferenceStore,
}

impl LocalState {
    /// Open the on-disk store and load every repository from it
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened
    pub fn open(config: &StorageConfig) -> Result<Self> {
        Ok(Self::from_store(PersistentStore::open(config)?))
    }

    /// Load every repository from `store`
    pub fn from_store(store: PersistentStore) -> Self {
        Self {
            sessions: Arc::new(SessionRepository::load(store.clone())),
            progress: Arc::new(ProgressTracker::load(store.clone())),
            preferences: PreferenceStore::load(store),
        }
    }

    /// Repositories over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::from_store(PersistentStore::in_memory(DEFAULT_CAPACITY_BYTES))
    }
}

/// List bookmarked messages across all sessions
pub fn list_bookmarks(state: &LocalState) -> Result<()> {
    sessions::print_bookmarks(&state.sessions.bookmarks());
    Ok(())
}

// Chat command handler
pub mod chat {
    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::{sessions, stats, LocalState};
    use crate::capability::{SpeechCapabilities, SpeechOptions};
    use crate::config::Config;
    use crate::error::{Result, TutorError};
    use crate::pipeline::{HttpChatTransport, MessagePipeline, PipelineContext, SendOutcome};
    use crate::preferences::UserPreferences;
    use crate::session::{ChatSession, Difficulty, Role, SessionAction};
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::sync::Arc;
    use std::time::Instant;

    /// Run the interactive tutoring chat
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `subject` - Subject for new sessions, overriding the preference
    /// * `difficulty` - Difficulty for new sessions, overriding the preference
    /// * `resume` - Session id or prefix to continue
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened, an argument is invalid,
    /// or the line editor cannot start
    pub async fn run_chat(
        config: Config,
        subject: Option<String>,
        difficulty: Option<String>,
        resume: Option<String>,
    ) -> Result<()> {
        let state = LocalState::open(&config.storage)?;
        let prefs = state.preferences.get();

        let difficulty = match difficulty {
            Some(d) => Some(d.parse::<Difficulty>().map_err(TutorError::InvalidInput)?),
            None => prefs.default_difficulty,
        };
        let subject = subject.or_else(|| prefs.default_subject.clone());

        let transport = Arc::new(HttpChatTransport::new(&config.client.endpoint)?);
        let pipeline = MessagePipeline::new(
            config.client.clone(),
            state.sessions.clone(),
            state.progress.clone(),
            transport,
        );
        pipeline.set_context(subject, difficulty);

        if let Some(id) = resume {
            let session = sessions::resolve(&state, &id)?;
            pipeline.select_session(&session.id)?;
            sessions::print_transcript(&session);
        }

        let speech = SpeechCapabilities::resolve(&config.speech);
        let mut rl = DefaultEditor::new()?;
        let started = Instant::now();

        print_welcome_banner(&pipeline.context(), &config.client.endpoint);

        loop {
            let prompt = format_prompt(pipeline.current_session().as_ref());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}", e.to_string().red());
                            continue;
                        }
                    };

                    match command {
                        SpecialCommand::None => {}
                        SpecialCommand::Exit => break,
                        other => {
                            if let Err(e) =
                                handle_special(other, &state, &pipeline, &speech, &prefs).await
                            {
                                eprintln!("{}", format!("Error: {}", e).red());
                            }
                            continue;
                        }
                    }

                    println!("{}", "Thinking...".dimmed());
                    match pipeline.send_message(trimmed).await {
                        SendOutcome::Succeeded { reply, .. } => {
                            println!("\n{}\n", reply.content);
                            if prefs.speech_enabled && prefs.auto_speak {
                                speak(&speech, &prefs, &reply.content).await;
                            }
                        }
                        SendOutcome::Failed { error, fallback } => {
                            if let Some(text) = fallback {
                                println!("\n{}\n", text);
                            }
                            eprintln!("{}\n", error.red());
                        }
                        SendOutcome::Rejected | SendOutcome::Cancelled => {}
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        pipeline.shutdown();
        let minutes = started.elapsed().as_secs() / 60;
        if minutes > 0 {
            state.progress.record_time_spent(minutes);
        }

        println!("Goodbye!");
        Ok(())
    }

    async fn handle_special(
        command: SpecialCommand,
        state: &LocalState,
        pipeline: &MessagePipeline,
        speech: &SpeechCapabilities,
        prefs: &UserPreferences,
    ) -> Result<()> {
        match command {
            SpecialCommand::NewChat => {
                pipeline.new_chat();
                println!("{}", "Started a new chat. Ask your first question.".green());
            }
            SpecialCommand::ListSessions => {
                let all = state.sessions.snapshot();
                if all.is_empty() {
                    println!("{}", "No tutoring sessions yet.".yellow());
                } else {
                    sessions::print_session_table(&all);
                    println!("Use {} to continue one.", "/switch <n>".cyan());
                }
            }
            SpecialCommand::SwitchSession(target) => {
                let session = resolve_switch_target(state, &target)?;
                pipeline.select_session(&session.id)?;
                sessions::print_transcript(&session);
            }
            SpecialCommand::ShowTranscript => match pipeline.current_session() {
                Some(session) => sessions::print_transcript(&session),
                None => println!("{}", "No active session yet.".yellow()),
            },
            SpecialCommand::ToggleBookmark(number) => {
                let session = require_session(pipeline)?;
                let message = number
                    .checked_sub(1)
                    .and_then(|i| session.messages.get(i))
                    .ok_or_else(|| {
                        TutorError::InvalidInput(format!(
                            "No message {} in this session ({} messages)",
                            number,
                            session.messages.len()
                        ))
                    })?;
                state.sessions.dispatch(SessionAction::ToggleBookmark {
                    session_id: session.id.clone(),
                    message_id: message.id.clone(),
                })?;
                let label = if message.is_bookmarked {
                    "Removed bookmark from"
                } else {
                    "Bookmarked"
                };
                println!("{} message {}", label, number.to_string().cyan());
            }
            SpecialCommand::ListBookmarks => {
                sessions::print_bookmarks(&state.sessions.bookmarks());
            }
            SpecialCommand::Rename(title) => {
                let session = require_session(pipeline)?;
                state.sessions.dispatch(SessionAction::Rename {
                    session_id: session.id,
                    title: title.clone(),
                })?;
                println!("Renamed session to \"{}\"", title);
            }
            SpecialCommand::SetSubject(subject) => {
                let context = pipeline.context();
                println!(
                    "Subject for new sessions: {}",
                    subject.as_deref().unwrap_or("none").cyan()
                );
                pipeline.set_context(subject, context.difficulty);
            }
            SpecialCommand::SetDifficulty(difficulty) => {
                let context = pipeline.context();
                pipeline.set_context(context.subject, Some(difficulty));
                println!(
                    "Level for new sessions: {}",
                    difficulty.to_string().cyan()
                );
            }
            SpecialCommand::Speak => {
                let session = require_session(pipeline)?;
                let last_reply = session
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::Assistant && !m.is_error)
                    .ok_or_else(|| TutorError::InvalidInput("No reply to read yet".to_string()))?;
                if !prefs.speech_enabled {
                    println!("{}", "Speech is turned off in preferences.".yellow());
                } else {
                    speak(speech, prefs, &last_reply.content).await;
                }
            }
            SpecialCommand::ShowStats => stats::print_stats(&state.progress.stats()),
            SpecialCommand::ShowStatus => print_status(pipeline, speech),
            SpecialCommand::Help => print_help(),
            SpecialCommand::Exit | SpecialCommand::None => {}
        }
        Ok(())
    }

    fn require_session(pipeline: &MessagePipeline) -> Result<ChatSession> {
        pipeline.current_session().ok_or_else(|| {
            TutorError::InvalidInput("No active session yet; ask a question first".to_string())
                .into()
        })
    }

    /// `/switch 2` picks the second listed session, anything else is an id prefix
    fn resolve_switch_target(state: &LocalState, target: &str) -> Result<ChatSession> {
        if let Ok(number) = target.parse::<usize>() {
            let all = state.sessions.snapshot();
            if let Some(session) = number.checked_sub(1).and_then(|i| all.get(i)) {
                return Ok(session.clone());
            }
        }
        sessions::resolve(state, target)
    }

    async fn speak(speech: &SpeechCapabilities, prefs: &UserPreferences, text: &str) {
        let Some(synthesizer) = speech.synthesis.get() else {
            if let Some(reason) = speech.synthesis.reason() {
                println!("{}", format!("Speech unavailable: {}", reason).yellow());
            }
            return;
        };

        let options = SpeechOptions {
            voice: prefs.voice.clone(),
            rate: prefs.speech_rate,
        };
        if let Err(e) = synthesizer.speak(text, &options).await {
            tracing::warn!("Speech synthesis failed: {}", e);
            eprintln!("{}", format!("Could not speak reply: {}", e).red());
        }
    }

    fn print_status(pipeline: &MessagePipeline, speech: &SpeechCapabilities) {
        let context = pipeline.context();
        match pipeline.current_session() {
            Some(session) => println!(
                "Session:   {} ({}, {} messages)",
                session.title.bold(),
                session.short_id().cyan(),
                session.messages.len()
            ),
            None => println!("Session:   {}", "new (created with your next question)".dimmed()),
        }
        println!(
            "Subject:   {}",
            context.subject.as_deref().unwrap_or("any")
        );
        println!(
            "Level:     {}",
            context
                .difficulty
                .map(|d| d.to_string())
                .unwrap_or_else(|| "not set".to_string())
        );
        let speech_status = match speech.synthesis.reason() {
            None => "available".green(),
            Some(reason) => reason.yellow(),
        };
        println!("Speech:    {}", speech_status);
        if let Some(error) = pipeline.last_error() {
            println!("Last error: {}", error.red());
        }
    }

    fn format_prompt(session: Option<&ChatSession>) -> String {
        match session {
            Some(session) => format!("[{}] >> ", sessions::truncate(&session.title, 24)),
            None => "[new] >> ".to_string(),
        }
    }

    /// Display welcome banner at the start of a chat
    fn print_welcome_banner(context: &PipelineContext, endpoint: &str) {
        let subject = context.subject.as_deref().unwrap_or("any subject");
        let level = context
            .difficulty
            .map(|d| d.to_string())
            .unwrap_or_else(|| "any level".to_string());

        println!();
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║                 TutorChat - Your AI Study Buddy              ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();
        println!("Subject: {}   Level: {}", subject.cyan(), level.cyan());
        println!("Tutor:   {}", endpoint.dimmed());
        println!();
        println!("Type '/help' for commands, 'exit' to leave.");
        println!();
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::session::Message;

        #[test]
        fn test_format_prompt() {
            assert_eq!(format_prompt(None), "[new] >> ");
            let mut session = ChatSession::new(None, None);
            session.title = "Quadratic equations and their roots".into();
            assert_eq!(format_prompt(Some(&session)), "[Quadratic equations a...] >> ");
        }

        #[test]
        fn test_resolve_switch_target_by_number_and_prefix() {
            let state = LocalState::in_memory();
            let older = ChatSession::new(Some("math".into()), None);
            let newer = ChatSession::new(Some("art".into()), None);
            state
                .sessions
                .dispatch(SessionAction::Create(older.clone()))
                .unwrap();
            state
                .sessions
                .dispatch(SessionAction::Create(newer.clone()))
                .unwrap();

            assert_eq!(resolve_switch_target(&state, "1").unwrap().id, newer.id);
            assert_eq!(resolve_switch_target(&state, "2").unwrap().id, older.id);
            assert_eq!(resolve_switch_target(&state, &older.id).unwrap().id, older.id);
            assert!(resolve_switch_target(&state, "9").is_err());
        }

        #[tokio::test]
        async fn test_bookmark_toggle_from_repl() {
            let state = LocalState::in_memory();
            let mut session = ChatSession::new(None, None);
            session.messages.push(Message::user("What is a vector?"));
            state
                .sessions
                .dispatch(SessionAction::Create(session.clone()))
                .unwrap();

            let transport = Arc::new(HttpChatTransport::new("http://127.0.0.1:9").unwrap());
            let pipeline = MessagePipeline::new(
                Default::default(),
                state.sessions.clone(),
                state.progress.clone(),
                transport,
            );
            pipeline.select_session(&session.id).unwrap();
            let speech = SpeechCapabilities::resolve(&Default::default());
            let prefs = UserPreferences::default();

            handle_special(
                SpecialCommand::ToggleBookmark(1),
                &state,
                &pipeline,
                &speech,
                &prefs,
            )
            .await
            .unwrap();
            assert_eq!(state.sessions.bookmarks().len(), 1);

            let err = handle_special(
                SpecialCommand::ToggleBookmark(5),
                &state,
                &pipeline,
                &speech,
                &prefs,
            )
            .await;
            assert!(err.is_err());
        }
    }
}

// Serve command handler
pub mod serve {
    use crate::config::Config;
    use crate::error::Result;
    use crate::proxy;
    use tokio_util::sync::CancellationToken;

    /// Run the proxy until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the proxy cannot start
    pub async fn run_serve(config: Config) -> Result<()> {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown requested");
                    signal.cancel();
                }
                Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
            }
        });

        proxy::serve(&config.proxy, shutdown).await
    }
}
