use super::LocalState;
use crate::cli::{ExportFormat, SessionCommand};
use crate::error::{Result, TutorError};
use crate::session::{BookmarkEntry, ChatSession, Message, Role, SessionAction};
use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use prettytable::{format, Table};
use std::io::{self, BufRead, Write};

/// Handle session commands
pub fn handle_sessions(state: &LocalState, command: SessionCommand) -> Result<()> {
    match command {
        SessionCommand::List => {
            let sessions = state.sessions.snapshot();

            if sessions.is_empty() {
                println!("{}", "No tutoring sessions found.".yellow());
                return Ok(());
            }

            println!("\nTutoring Sessions:");
            print_session_table(&sessions);
            println!();
            println!(
                "Use {} to continue a session.",
                "tutorchat chat --session <ID>".cyan()
            );
            println!();
        }
        SessionCommand::Show { id } => {
            let session = resolve(state, &id)?;
            print_transcript(&session);
        }
        SessionCommand::Rename { id, title } => {
            let session = resolve(state, &id)?;
            state.sessions.dispatch(SessionAction::Rename {
                session_id: session.id.clone(),
                title: title.clone(),
            })?;
            println!(
                "Renamed session {} to \"{}\"",
                session.short_id().cyan(),
                title.trim()
            );
        }
        SessionCommand::Delete { id } => {
            let session = resolve(state, &id)?;
            state.sessions.dispatch(SessionAction::Delete {
                session_id: session.id.clone(),
            })?;
            println!(
                "Deleted session {} ({})",
                session.short_id().cyan(),
                session.title
            );
        }
        SessionCommand::Clear { yes } => {
            let count = state.sessions.len();
            if count == 0 {
                println!("{}", "No tutoring sessions to delete.".yellow());
                return Ok(());
            }

            if !yes && !confirm(&format!("Delete all {} sessions?", count))? {
                println!("Cancelled.");
                return Ok(());
            }

            state.sessions.dispatch(SessionAction::ClearAll)?;
            println!("Deleted {} sessions.", count);
        }
        SessionCommand::Export { id, format, output } => {
            let session = resolve(state, &id)?;
            let rendered = render_export(&session, format)?;

            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    println!(
                        "Exported session {} to {}",
                        session.short_id().cyan(),
                        path.display()
                    );
                }
                None => print!("{}", rendered),
            }
        }
    }

    Ok(())
}

/// Resolve a session by id or id prefix
pub fn resolve(state: &LocalState, id: &str) -> Result<ChatSession> {
    state
        .sessions
        .find(id)
        .ok_or_else(|| TutorError::SessionNotFound(id.to_string()).into())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Print sessions as a numbered table
pub fn print_session_table(sessions: &[ChatSession]) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "#".bold(),
        "ID".bold(),
        "Title".bold(),
        "Subject".bold(),
        "Messages".bold(),
        "Bookmarks".bold(),
        "Last Updated".bold()
    ]);

    for (index, session) in sessions.iter().enumerate() {
        table.add_row(prettytable::row![
            index + 1,
            session.short_id().cyan(),
            truncate(&session.title, 40),
            session.subject.as_deref().unwrap_or("-"),
            session.messages.len(),
            session.bookmark_count(),
            format_timestamp(session.updated_at)
        ]);
    }

    table.printstd();
}

/// Print a session with numbered messages
pub fn print_transcript(session: &ChatSession) {
    println!();
    println!("{}", session.title.bold());
    let mut details = vec![format!("id {}", session.short_id())];
    if let Some(subject) = &session.subject {
        details.push(format!("subject {}", subject));
    }
    if let Some(difficulty) = session.difficulty {
        details.push(format!("level {}", difficulty));
    }
    details.push(format!("started {}", format_timestamp(session.created_at)));
    println!("{}", details.join(" | ").dimmed());
    println!();

    if session.messages.is_empty() {
        println!("{}", "No messages yet.".yellow());
        println!();
        return;
    }

    for (index, message) in session.messages.iter().enumerate() {
        print_message(index + 1, message);
    }
}

fn print_message(number: usize, message: &Message) {
    let speaker = match message.role {
        Role::User => "You".green().bold(),
        Role::Assistant if message.is_error => "Tutor".red().bold(),
        Role::Assistant => "Tutor".cyan().bold(),
    };
    let marker = if message.is_bookmarked { " *" } else { "" };

    println!(
        "{} {}{} {}",
        format!("[{}]", number).dimmed(),
        speaker,
        marker.yellow(),
        format_timestamp(message.timestamp).dimmed()
    );
    println!("{}\n", message.content);
}

/// Print bookmarked messages as a table
pub fn print_bookmarks(bookmarks: &[BookmarkEntry]) {
    if bookmarks.is_empty() {
        println!("{}", "No bookmarked messages.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Session".bold(),
        "From".bold(),
        "Message".bold(),
        "Time".bold()
    ]);

    for entry in bookmarks {
        let from = match entry.message.role {
            Role::User => "You",
            Role::Assistant => "Tutor",
        };
        table.add_row(prettytable::row![
            truncate(&entry.session_title, 30),
            from,
            truncate(&entry.message.content.replace('\n', " "), 60),
            format_timestamp(entry.message.timestamp)
        ]);
    }

    println!("\nBookmarked Messages:");
    table.printstd();
    println!();
}

/// Render a session in an export format
pub fn render_export(session: &ChatSession, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Markdown => Ok(render_markdown(session)),
        ExportFormat::Json => {
            let mut json = serde_json::to_string_pretty(session)?;
            json.push('\n');
            Ok(json)
        }
    }
}

/// Render a session as a Markdown transcript
pub fn render_markdown(session: &ChatSession) -> String {
    let mut out = format!("# {}\n\n", session.title);

    if let Some(subject) = &session.subject {
        out.push_str(&format!("- Subject: {}\n", subject));
    }
    if let Some(difficulty) = session.difficulty {
        out.push_str(&format!("- Difficulty: {}\n", difficulty));
    }
    out.push_str(&format!("- Started: {}\n", format_timestamp(session.created_at)));
    out.push_str(&format!("- Messages: {}\n", session.messages.len()));

    for message in &session.messages {
        let speaker = match message.role {
            Role::User => "You",
            Role::Assistant => "Tutor",
        };
        let mut flags = Vec::new();
        if message.is_bookmarked {
            flags.push("bookmarked");
        }
        if message.is_error {
            flags.push("error");
        }

        out.push_str(&format!(
            "\n## {} ({})",
            speaker,
            format_timestamp(message.timestamp)
        ));
        if !flags.is_empty() {
            out.push_str(&format!(" _{}_", flags.join(", ")));
        }
        out.push_str(&format!("\n\n{}\n", message.content.trim_end()));
    }

    out
}

/// Local time for an epoch-millisecond timestamp
pub fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Shorten `text` to at most `max` characters
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Difficulty;

    fn session() -> ChatSession {
        let mut session = ChatSession::new(Some("biology".into()), Some(Difficulty::Beginner));
        session.title = "Photosynthesis".into();
        session.messages.push(Message::user("How do plants eat?"));
        let mut reply = Message::assistant("They make sugar from light.");
        reply.is_bookmarked = true;
        session.messages.push(reply);
        session.messages.push(Message::error("Something went wrong."));
        session
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 10), "abcdefg...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_format_timestamp_out_of_range() {
        assert_eq!(format_timestamp(i64::MAX), "-");
        assert_eq!(format_timestamp(0).len(), "1970-01-01 00:00".len());
    }

    #[test]
    fn test_render_markdown() {
        let md = render_markdown(&session());
        assert!(md.starts_with("# Photosynthesis\n\n"));
        assert!(md.contains("- Subject: biology\n"));
        assert!(md.contains("- Difficulty: beginner\n"));
        assert!(md.contains("- Messages: 3\n"));
        assert!(md.contains("How do plants eat?"));
        assert!(md.contains("_bookmarked_"));
        assert!(md.contains("_error_"));
    }

    #[test]
    fn test_render_json_export() {
        let session = session();
        let json = render_export(&session, ExportFormat::Json).unwrap();
        let parsed: ChatSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
        assert!(json.contains("\"isBookmarked\": true"));
    }
}
