//! Persisted user preferences

use crate::error::{Result, TutorError};
use crate::session::Difficulty;
use crate::storage::{PersistentStore, PREFERENCES_KEY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

/// Slowest allowed speech rate
pub const MIN_SPEECH_RATE: f32 = 0.5;

/// Fastest allowed speech rate
pub const MAX_SPEECH_RATE: f32 = 2.0;

/// Colour theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light background
    Light,
    /// Dark background
    Dark,
    /// Follow the terminal
    #[default]
    System,
}

/// Text size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    /// Compact
    Small,
    /// Normal
    #[default]
    Medium,
    /// Enlarged
    Large,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
            Theme::System => write!(f, "system"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            other => Err(format!(
                "Invalid theme: {}. Must be one of: light, dark, system",
                other
            )),
        }
    }
}

impl fmt::Display for FontSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontSize::Small => write!(f, "small"),
            FontSize::Medium => write!(f, "medium"),
            FontSize::Large => write!(f, "large"),
        }
    }
}

impl FromStr for FontSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(FontSize::Small),
            "medium" => Ok(FontSize::Medium),
            "large" => Ok(FontSize::Large),
            other => Err(format!(
                "Invalid font size: {}. Must be one of: small, medium, large",
                other
            )),
        }
    }
}

/// Learner preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    /// Colour theme
    pub theme: Theme,
    /// Whether speech features are on at all
    pub speech_enabled: bool,
    /// Speak replies as they arrive
    pub auto_speak: bool,
    /// Synthesizer voice name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Speech rate multiplier
    pub speech_rate: f32,
    /// Subject for new sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_subject: Option<String>,
    /// Difficulty for new sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_difficulty: Option<Difficulty>,
    /// Text size
    pub font_size: FontSize,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            speech_enabled: true,
            auto_speak: false,
            voice: None,
            speech_rate: 1.0,
            default_subject: None,
            default_difficulty: None,
            font_size: FontSize::Medium,
        }
    }
}

impl UserPreferences {
    /// Set one field from its camelCase or snake_case name
    ///
    /// An empty value clears optional fields.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidInput` for an unknown key or a value that
    /// does not parse or is out of range
    ///
    /// # Examples
    ///
    /// ```
    /// use tutorchat::preferences::UserPreferences;
    ///
    /// let mut prefs = UserPreferences::default();
    /// prefs.set_field("speechRate", "1.5").unwrap();
    /// assert_eq!(prefs.speech_rate, 1.5);
    /// assert!(prefs.set_field("speechRate", "9").is_err());
    /// ```
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let optional = || (!value.is_empty()).then(|| value.to_string());

        match key {
            "theme" => self.theme = value.parse().map_err(TutorError::InvalidInput)?,
            "speechEnabled" | "speech_enabled" => self.speech_enabled = parse_bool(key, value)?,
            "autoSpeak" | "auto_speak" => self.auto_speak = parse_bool(key, value)?,
            "voice" => self.voice = optional(),
            "speechRate" | "speech_rate" => {
                let rate: f32 = value.parse().map_err(|_| {
                    TutorError::InvalidInput(format!("{} must be a number, got {}", key, value))
                })?;
                if !(MIN_SPEECH_RATE..=MAX_SPEECH_RATE).contains(&rate) {
                    return Err(TutorError::InvalidInput(format!(
                        "{} must be between {} and {}",
                        key, MIN_SPEECH_RATE, MAX_SPEECH_RATE
                    ))
                    .into());
                }
                self.speech_rate = rate;
            }
            "defaultSubject" | "default_subject" => self.default_subject = optional(),
            "defaultDifficulty" | "default_difficulty" => {
                self.default_difficulty = match optional() {
                    Some(v) => Some(v.parse().map_err(TutorError::InvalidInput)?),
                    None => None,
                }
            }
            "fontSize" | "font_size" => {
                self.font_size = value.parse().map_err(TutorError::InvalidInput)?
            }
            other => {
                return Err(TutorError::InvalidInput(format!(
                    "Unknown preference: {}",
                    other
                ))
                .into())
            }
        }
        Ok(())
    }

    /// Clamp out-of-range values read from storage
    fn normalized(mut self) -> Self {
        if !self.speech_rate.is_finite() {
            self.speech_rate = 1.0;
        }
        self.speech_rate = self.speech_rate.clamp(MIN_SPEECH_RATE, MAX_SPEECH_RATE);
        self
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(TutorError::InvalidInput(format!(
            "{} must be true or false, got {}",
            key, value
        ))
        .into()),
    }
}

/// Persisted preferences with in-memory copy
pub struct PreferenceStore {
    store: PersistentStore,
    current: Mutex<UserPreferences>,
}

impl PreferenceStore {
    /// Load preferences, defaulting when absent or malformed
    pub fn load(store: PersistentStore) -> Self {
        let prefs = store
            .read(PREFERENCES_KEY, UserPreferences::default())
            .normalized();
        Self {
            store,
            current: Mutex::new(prefs),
        }
    }

    /// Current preferences
    pub fn get(&self) -> UserPreferences {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Apply `change` to a copy and persist it if it succeeds
    ///
    /// # Errors
    ///
    /// Returns whatever `change` returns; nothing is stored in that case
    pub fn update<F>(&self, change: F) -> Result<UserPreferences>
    where
        F: FnOnce(&mut UserPreferences) -> Result<()>,
    {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = current.clone();
        change(&mut next)?;

        *current = next;
        self.store.write(PREFERENCES_KEY, &*current);
        tracing::debug!("Preferences updated");
        Ok(current.clone())
    }

    /// Restore defaults
    pub fn reset(&self) -> UserPreferences {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = UserPreferences::default();
        self.store.write(PREFERENCES_KEY, &*current);
        current.clone()
    }
}
