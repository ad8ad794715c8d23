//! Progress and preference views

use super::LocalState;
use crate::cli::PrefsCommand;
use crate::error::Result;
use crate::preferences::UserPreferences;
use crate::progress::ProgressStats;
use colored::Colorize;
use prettytable::{format, Table};

/// Topics listed before the rest are summarized as a count
const TOPICS_SHOWN: usize = 20;

/// Show progress, optionally resetting it first
pub fn handle_stats(state: &LocalState, reset: bool) -> Result<()> {
    if reset {
        state.progress.reset();
        println!("{}", "Progress reset.".green());
        return Ok(());
    }

    print_stats(&state.progress.stats());
    Ok(())
}

/// Print a progress summary
pub fn print_stats(stats: &ProgressStats) {
    println!("\n{}", "Learning Progress".bold());
    println!("  Sessions started: {}", stats.total_sessions.to_string().cyan());
    println!("  Messages:         {}", stats.total_messages.to_string().cyan());
    println!(
        "  Time spent:       {}",
        format_minutes(stats.time_spent).cyan()
    );

    let streak = match stats.streak_days {
        1 => "1 day".to_string(),
        n => format!("{} days", n),
    };
    println!("  Streak:           {}", streak.cyan());
    if !stats.last_active_date.is_empty() {
        println!("  Last active:      {}", stats.last_active_date);
    }

    if !stats.favorite_subjects.is_empty() {
        println!("\n{}", "Subjects".bold());
        println!("  {}", stats.favorite_subjects.join(", "));
    }

    if !stats.topics_explored.is_empty() {
        println!(
            "\n{} ({})",
            "Topics explored".bold(),
            stats.topics_explored.len()
        );
        let shown: Vec<&str> = stats
            .topics_explored
            .iter()
            .take(TOPICS_SHOWN)
            .map(String::as_str)
            .collect();
        print!("  {}", shown.join(", "));
        let hidden = stats.topics_explored.len().saturating_sub(TOPICS_SHOWN);
        if hidden > 0 {
            print!(" {}", format!("and {} more", hidden).dimmed());
        }
        println!();
    }
    println!();
}

/// `90` -> `1h 30m`
pub fn format_minutes(minutes: u64) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

/// Handle preference commands
pub fn handle_prefs(state: &LocalState, command: PrefsCommand) -> Result<()> {
    match command {
        PrefsCommand::Show => print_preferences(&state.preferences.get()),
        PrefsCommand::Set { key, value } => {
            let prefs = state
                .preferences
                .update(|prefs| prefs.set_field(&key, &value))?;
            println!("{} {} updated", "✓".green(), key.cyan());
            print_preferences(&prefs);
        }
        PrefsCommand::Reset => {
            let prefs = state.preferences.reset();
            println!("{}", "Preferences restored to defaults.".green());
            print_preferences(&prefs);
        }
    }
    Ok(())
}

fn print_preferences(prefs: &UserPreferences) {
    let unset = || "-".to_string();

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row!["Preference".bold(), "Value".bold()]);
    table.add_row(prettytable::row!["theme", prefs.theme]);
    table.add_row(prettytable::row!["speechEnabled", prefs.speech_enabled]);
    table.add_row(prettytable::row!["autoSpeak", prefs.auto_speak]);
    table.add_row(prettytable::row![
        "voice",
        prefs.voice.clone().unwrap_or_else(unset)
    ]);
    table.add_row(prettytable::row!["speechRate", format!("{:.2}", prefs.speech_rate)]);
    table.add_row(prettytable::row![
        "defaultSubject",
        prefs.default_subject.clone().unwrap_or_else(unset)
    ]);
    table.add_row(prettytable::row![
        "defaultDifficulty",
        prefs
            .default_difficulty
            .map(|d| d.to_string())
            .unwrap_or_else(unset)
    ]);
    table.add_row(prettytable::row!["fontSize", prefs.font_size]);
    table.printstd();
}
