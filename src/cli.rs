//! Command-line interface definition for TutorChat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for the proxy server, the chat REPL, and local
//! session, bookmark, stats and preference management.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// TutorChat - AI tutoring chat client and proxy
///
/// Chat with an AI tutor from the terminal, or serve the proxy endpoint
/// that relays conversations to the model provider.
#[derive(Parser, Debug, Clone)]
#[command(name = "tutorchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Override the local store location
    #[arg(long)]
    pub storage_path: Option<PathBuf>,

    /// Override the proxy endpoint the chat client talks to
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for TutorChat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the proxy endpoint
    Serve {
        /// Listen address, overriding the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Start an interactive tutoring chat
    Chat {
        /// Subject for new sessions
        #[arg(short, long)]
        subject: Option<String>,

        /// Difficulty for new sessions (beginner, intermediate, advanced)
        #[arg(short, long)]
        difficulty: Option<String>,

        /// Resume a session by id or id prefix
        #[arg(long)]
        session: Option<String>,
    },

    /// Manage stored sessions
    Sessions {
        /// Session subcommand
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// List bookmarked messages
    Bookmarks,

    /// Show learning progress
    Stats {
        /// Reset all counters
        #[arg(long)]
        reset: bool,
    },

    /// Manage preferences
    Prefs {
        /// Preference subcommand
        #[command(subcommand)]
        command: PrefsCommand,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List sessions, most recent first
    List,

    /// Print a session transcript
    Show {
        /// Session id or id prefix
        id: String,
    },

    /// Rename a session
    Rename {
        /// Session id or id prefix
        id: String,

        /// New title
        title: String,
    },

    /// Delete a session
    Delete {
        /// Session id or id prefix
        id: String,
    },

    /// Delete every session
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Export a session
    Export {
        /// Session id or id prefix
        id: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: ExportFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Session export formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Readable transcript
    Markdown,
    /// The stored session as JSON
    Json,
}

/// Preference subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum PrefsCommand {
    /// Print current preferences
    Show,

    /// Set one preference
    Set {
        /// Preference name (for example `theme` or `speechRate`)
        key: String,

        /// New value; empty clears optional preferences
        value: String,
    },

    /// Restore defaults
    Reset,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            storage_path: None,
            endpoint: None,
            command: Commands::Chat {
                subject: None,
                difficulty: None,
                session: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(cli.storage_path.is_none());
        assert!(matches!(cli.command, Commands::Chat { .. }));
    }

    #[test]
    fn test_cli_parse_serve_with_bind() {
        let cli = Cli::try_parse_from(["tutorchat", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        if let Commands::Serve { bind } = cli.command {
            assert_eq!(bind, Some("0.0.0.0:8080".to_string()));
        } else {
            panic!("Expected Serve command");
        }
    }

    #[test]
    fn test_cli_parse_chat_options() {
        let cli = Cli::try_parse_from([
            "tutorchat",
            "chat",
            "--subject",
            "biology",
            "--difficulty",
            "advanced",
        ])
        .unwrap();
        if let Commands::Chat {
            subject,
            difficulty,
            session,
        } = cli.command
        {
            assert_eq!(subject, Some("biology".to_string()));
            assert_eq!(difficulty, Some("advanced".to_string()));
            assert!(session.is_none());
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_cli_parse_global_options() {
        let cli = Cli::try_parse_from([
            "tutorchat",
            "--verbose",
            "--json-logs",
            "--storage-path",
            "/tmp/tutor",
            "bookmarks",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.json_logs);
        assert_eq!(cli.storage_path, Some(PathBuf::from("/tmp/tutor")));
        assert!(matches!(cli.command, Commands::Bookmarks));
    }

    #[test]
    fn test_cli_parse_sessions_export() {
        let cli =
            Cli::try_parse_from(["tutorchat", "sessions", "export", "01HZ", "--format", "json"])
                .unwrap();
        if let Commands::Sessions {
            command: SessionCommand::Export { id, format, output },
        } = cli.command
        {
            assert_eq!(id, "01HZ");
            assert_eq!(format, ExportFormat::Json);
            assert!(output.is_none());
        } else {
            panic!("Expected sessions export");
        }
    }

    #[test]
    fn test_cli_parse_sessions_rename() {
        let cli =
            Cli::try_parse_from(["tutorchat", "sessions", "rename", "01HZ", "Cell biology"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sessions {
                command: SessionCommand::Rename { .. }
            }
        ));
    }

    #[test]
    fn test_cli_parse_prefs_set() {
        let cli = Cli::try_parse_from(["tutorchat", "prefs", "set", "theme", "dark"]).unwrap();
        if let Commands::Prefs {
            command: PrefsCommand::Set { key, value },
        } = cli.command
        {
            assert_eq!(key, "theme");
            assert_eq!(value, "dark");
        } else {
            panic!("Expected prefs set");
        }
    }

    #[test]
    fn test_cli_parse_stats_reset() {
        let cli = Cli::try_parse_from(["tutorchat", "stats", "--reset"]).unwrap();
        assert!(matches!(cli.command, Commands::Stats { reset: true }));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["tutorchat"]).is_err());
    }
}
