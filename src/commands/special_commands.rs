//! Special commands parser for the tutoring REPL
//!
//! Lines starting with `/` are commands rather than questions for the tutor.
//! They let the learner:
//! - Start a fresh chat or switch to an earlier session
//! - Bookmark, rename and review messages and sessions
//! - Change the subject and difficulty used for new sessions
//! - Show progress, status and help
//!
//! Command names are case-insensitive; arguments keep their case.

use crate::session::Difficulty;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during a tutoring chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Leave the current session; the next question starts a new one
    NewChat,

    /// List stored sessions with their numbers
    ListSessions,

    /// Continue a stored session, by list number or id prefix
    SwitchSession(String),

    /// Print the current session transcript with message numbers
    ShowTranscript,

    /// Toggle the bookmark on a message of the current session (1-based)
    ToggleBookmark(usize),

    /// List bookmarked messages across sessions
    ListBookmarks,

    /// Retitle the current session
    Rename(String),

    /// Subject for new sessions; `None` clears it
    SetSubject(Option<String>),

    /// Difficulty for new sessions
    SetDifficulty(Difficulty),

    /// Read the last tutor reply aloud
    Speak,

    /// Show learning progress
    ShowStats,

    /// Show the current session and context
    ShowStatus,

    /// Display help information
    Help,

    /// Exit the chat
    Exit,

    /// Not a command; the input is a question for the tutor
    None,
}

fn missing(command: &str, usage: &str) -> CommandError {
    CommandError::MissingArgument {
        command: command.to_string(),
        usage: usage.to_string(),
    }
}

/// Parse user input into a special command
///
/// # Arguments
///
/// * `input` - The raw input line
///
/// # Returns
///
/// Returns the parsed command, `SpecialCommand::None` for ordinary questions,
/// or a `CommandError` for malformed commands
///
/// # Examples
///
/// ```
/// use tutorchat::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::NewChat);
/// assert_eq!(
///     parse_special_command("/rename Cell Biology").unwrap(),
///     SpecialCommand::Rename("Cell Biology".to_string())
/// );
/// assert_eq!(
///     parse_special_command("What is osmosis?").unwrap(),
///     SpecialCommand::None
/// );
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(SpecialCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match name.as_str() {
        "/new" => Ok(SpecialCommand::NewChat),
        "/sessions" => Ok(SpecialCommand::ListSessions),
        "/history" => Ok(SpecialCommand::ShowTranscript),
        "/bookmarks" => Ok(SpecialCommand::ListBookmarks),
        "/speak" => Ok(SpecialCommand::Speak),
        "/stats" => Ok(SpecialCommand::ShowStats),
        "/status" => Ok(SpecialCommand::ShowStatus),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" => Ok(SpecialCommand::Exit),

        "/switch" if arg.is_empty() => Err(missing("/switch", "/switch <number|id>")),
        "/switch" => Ok(SpecialCommand::SwitchSession(arg.to_string())),

        "/bookmark" if arg.is_empty() => Err(missing("/bookmark", "/bookmark <message number>")),
        "/bookmark" => match arg.parse::<usize>() {
            Ok(n) if n > 0 => Ok(SpecialCommand::ToggleBookmark(n)),
            _ => Err(CommandError::UnsupportedArgument {
                command: "/bookmark".to_string(),
                arg: arg.to_string(),
            }),
        },

        "/rename" if arg.is_empty() => Err(missing("/rename", "/rename <title>")),
        "/rename" => Ok(SpecialCommand::Rename(arg.to_string())),

        "/subject" if arg.is_empty() => Err(missing("/subject", "/subject <name|none>")),
        "/subject" if arg.eq_ignore_ascii_case("none") => Ok(SpecialCommand::SetSubject(None)),
        "/subject" => Ok(SpecialCommand::SetSubject(Some(arg.to_string()))),

        "/level" if arg.is_empty() => Err(missing(
            "/level",
            "/level <beginner|intermediate|advanced>",
        )),
        "/level" => arg
            .parse::<Difficulty>()
            .map(SpecialCommand::SetDifficulty)
            .map_err(|_| CommandError::UnsupportedArgument {
                command: "/level".to_string(),
                arg: arg.to_string(),
            }),

        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Display help information for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Tutoring Chat
==================================

SESSIONS:
  /new                - Start a new chat with your next question
  /sessions           - List stored sessions
  /switch <n|id>      - Continue session number n (from /sessions) or by id prefix
  /rename <title>     - Rename the current session
  /history            - Show the current conversation with message numbers

BOOKMARKS:
  /bookmark <n>       - Bookmark (or un-bookmark) message n of this session
  /bookmarks          - List bookmarked messages from all sessions

TUTORING CONTEXT:
  /subject <name>     - Subject for new sessions
  /subject none       - Clear the subject
  /level <level>      - Difficulty for new sessions (beginner, intermediate, advanced)

OTHER:
  /speak              - Read the last tutor reply aloud
  /stats              - Show your learning progress
  /status             - Show current session and context
  /help               - Show this help message
  /?                  - Same as /help
  exit                - Leave the chat
  quit                - Same as exit

NOTES:
  - Command names are case-insensitive
  - Anything not starting with / is sent to your tutor
  - Subject and level apply when a session is created
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(
            parse_special_command("Explain photosynthesis").unwrap(),
            SpecialCommand::None
        );
        assert_eq!(
            parse_special_command("  what about exit strategies?").unwrap(),
            SpecialCommand::None
        );
    }

    #[test]
    fn test_exit_variants() {
        for input in ["exit", "QUIT", "/exit", "/Quit", "  exit  "] {
            assert_eq!(parse_special_command(input).unwrap(), SpecialCommand::Exit);
        }
    }

    #[test]
    fn test_simple_commands_case_insensitive() {
        assert_eq!(parse_special_command("/NEW").unwrap(), SpecialCommand::NewChat);
        assert_eq!(
            parse_special_command("/Sessions").unwrap(),
            SpecialCommand::ListSessions
        );
        assert_eq!(parse_special_command("/?").unwrap(), SpecialCommand::Help);
        assert_eq!(parse_special_command("/stats").unwrap(), SpecialCommand::ShowStats);
    }

    #[test]
    fn test_rename_keeps_case() {
        assert_eq!(
            parse_special_command("/RENAME  Organic Chemistry ").unwrap(),
            SpecialCommand::Rename("Organic Chemistry".to_string())
        );
    }

    #[test]
    fn test_missing_arguments() {
        for command in ["/rename", "/switch", "/bookmark", "/subject", "/level"] {
            assert!(matches!(
                parse_special_command(command),
                Err(CommandError::MissingArgument { .. })
            ));
        }
    }

    #[test]
    fn test_bookmark_requires_positive_number() {
        assert_eq!(
            parse_special_command("/bookmark 3").unwrap(),
            SpecialCommand::ToggleBookmark(3)
        );
        assert_eq!(
            parse_special_command("/bookmark 0"),
            Err(CommandError::UnsupportedArgument {
                command: "/bookmark".to_string(),
                arg: "0".to_string()
            })
        );
        assert!(parse_special_command("/bookmark last").is_err());
    }

    #[test]
    fn test_level_parses_difficulty() {
        assert_eq!(
            parse_special_command("/level Advanced").unwrap(),
            SpecialCommand::SetDifficulty(Difficulty::Advanced)
        );
        assert!(matches!(
            parse_special_command("/level expert"),
            Err(CommandError::UnsupportedArgument { .. })
        ));
    }

    #[test]
    fn test_subject_none_clears() {
        assert_eq!(
            parse_special_command("/subject None").unwrap(),
            SpecialCommand::SetSubject(None)
        );
        assert_eq!(
            parse_special_command("/subject Linear Algebra").unwrap(),
            SpecialCommand::SetSubject(Some("Linear Algebra".to_string()))
        );
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_special_command("/teleport").unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("/teleport".to_string()));
        assert!(err.to_string().contains("/help"));
    }
}
