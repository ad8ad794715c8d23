//! Learning progress statistics
//!
//! Stats are updated incrementally from completed exchanges and persisted
//! after every update. Nothing here may fail the caller: a defect in stats
//! bookkeeping is logged and otherwise ignored so message delivery never
//! depends on it.

use crate::error::{Result, TutorError};
use crate::storage::{PersistentStore, PROGRESS_KEY};
use chrono::{Days, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, OnceLock};

/// Keywords kept per message
pub const MAX_KEYWORDS: usize = 10;

/// Words shorter than or equal to this are never keywords
pub const MIN_KEYWORD_LEN: usize = 3;

/// Common words that carry no topic information
pub const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "also", "another", "because", "been", "before", "being", "below",
    "between", "both", "could", "does", "doing", "down", "during", "each", "explain", "from",
    "further", "give", "have", "having", "help", "here", "into", "just", "know", "like", "make",
    "many", "more", "most", "much", "only", "other", "over", "please", "really", "same",
    "should", "show", "some", "such", "tell", "than", "that", "their", "them", "then", "there",
    "these", "they", "thing", "things", "this", "those", "through", "under", "understand",
    "until", "very", "want", "were", "what", "when", "where", "which", "while", "will", "with",
    "would", "your",
];

/// Aggregate usage counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressStats {
    /// Sessions started
    pub total_sessions: u64,
    /// Messages exchanged (user and assistant)
    pub total_messages: u64,
    /// Minutes spent chatting
    pub time_spent: u64,
    /// Topic keywords seen, in first-appearance order
    pub topics_explored: Vec<String>,
    /// Subjects studied, in first-appearance order
    pub favorite_subjects: Vec<String>,
    /// Consecutive active days
    pub streak_days: u32,
    /// Last active day as `YYYY-MM-DD`, empty before the first exchange
    pub last_active_date: String,
}

fn punctuation() -> &'static Regex {
    static PUNCTUATION: OnceLock<Regex> = OnceLock::new();
    PUNCTUATION.get_or_init(|| Regex::new(r"[^\w\s]").expect("punctuation pattern is valid"))
}

/// Extract topic keywords from free text
///
/// # Examples
///
/// ```
/// use tutorchat::progress::extract_keywords;
///
/// let keywords = extract_keywords("Explain photosynthesis in plants, please!");
/// assert_eq!(keywords, vec!["photosynthesis", "plants"]);
/// ```
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = punctuation().replace_all(&lowered, "");

    cleaned
        .split_whitespace()
        .filter(|word| word.chars().count() > MIN_KEYWORD_LEN)
        .filter(|word| !STOP_WORDS.contains(word))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

fn merge_unique(target: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

fn next_streak(stats: &ProgressStats, today: NaiveDate) -> Result<u32> {
    if stats.last_active_date.is_empty() {
        return Ok(1);
    }

    let last = NaiveDate::parse_from_str(&stats.last_active_date, "%Y-%m-%d").map_err(|e| {
        TutorError::InvalidInput(format!(
            "lastActiveDate {:?} is not a date: {}",
            stats.last_active_date, e
        ))
    })?;

    let yesterday = today.checked_sub_days(Days::new(1));
    Ok(if last == today {
        stats.streak_days.max(1)
    } else if Some(last) == yesterday {
        stats.streak_days.saturating_add(1)
    } else {
        1
    })
}

/// Persisted, incrementally updated progress stats
pub struct ProgressTracker {
    store: PersistentStore,
    stats: Mutex<ProgressStats>,
}

impl ProgressTracker {
    /// Load stats from the store, defaulting when absent or malformed
    pub fn load(store: PersistentStore) -> Self {
        let stats = store.read(PROGRESS_KEY, ProgressStats::default());
        Self {
            store,
            stats: Mutex::new(stats),
        }
    }

    /// Current stats
    pub fn stats(&self) -> ProgressStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Record a completed exchange dated today
    pub fn record_exchange(&self, user_text: &str, subject: Option<&str>) -> ProgressStats {
        self.record_exchange_on(user_text, subject, Utc::now().date_naive())
    }

    /// Record a completed exchange on a given day
    pub fn record_exchange_on(
        &self,
        user_text: &str,
        subject: Option<&str>,
        today: NaiveDate,
    ) -> ProgressStats {
        let keywords = extract_keywords(user_text);
        self.apply("record_exchange", |stats| {
            merge_unique(&mut stats.topics_explored, keywords);
            if let Some(subject) = subject.map(str::trim).filter(|s| !s.is_empty()) {
                merge_unique(&mut stats.favorite_subjects, [subject.to_string()]);
            }
            stats.total_messages = stats.total_messages.saturating_add(2);
            stats.streak_days = next_streak(stats, today).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "Resetting streak");
                1
            });
            stats.last_active_date = today.format("%Y-%m-%d").to_string();
            Ok(())
        })
    }

    /// Count a newly created session
    pub fn record_session_created(&self) -> ProgressStats {
        self.apply("record_session_created", |stats| {
            stats.total_sessions = stats.total_sessions.saturating_add(1);
            Ok(())
        })
    }

    /// Add chat time in minutes
    pub fn record_time_spent(&self, minutes: u64) -> ProgressStats {
        self.apply("record_time_spent", |stats| {
            stats.time_spent = stats
                .time_spent
                .checked_add(minutes)
                .ok_or_else(|| TutorError::InvalidInput("timeSpent overflow".to_string()))?;
            Ok(())
        })
    }

    /// Reset every counter
    pub fn reset(&self) -> ProgressStats {
        self.apply("reset", |stats| {
            *stats = ProgressStats::default();
            Ok(())
        })
    }

    /// Apply an update to a copy and commit it only on success
    fn apply<F>(&self, operation: &str, update: F) -> ProgressStats
    where
        F: FnOnce(&mut ProgressStats) -> Result<()>,
    {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = stats.clone();

        match update(&mut next) {
            Ok(()) => {
                *stats = next;
                if !self.store.write(PROGRESS_KEY, &*stats).is_success() {
                    tracing::debug!(operation, "Progress stats not persisted");
                }
            }
            Err(e) => {
                tracing::warn!(operation, error = %e, "Progress update failed, ignoring");
            }
        }

        stats.clone()
    }
}
