//! Configuration management for TutorChat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, TutorError};
use crate::storage::{DEFAULT_CAPACITY_BYTES, DEFAULT_MAX_SESSIONS_ON_QUOTA};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for TutorChat
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chat client (message pipeline) settings
    #[serde(default)]
    pub client: ClientConfig,
    /// Local persistence settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Proxy endpoint settings
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Speech capability settings
    #[serde(default)]
    pub speech: SpeechConfig,
}

/// Message pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the proxy endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-attempt request timeout (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Additional attempts after the first transport failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry; doubles per attempt (milliseconds)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Pause after creating a session before it is referenced (milliseconds)
    #[serde(default = "default_session_settle_ms")]
    pub session_settle_ms: u64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    2_000
}

fn default_session_settle_ms() -> u64 {
    50
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            session_settle_ms: default_session_settle_ms(),
        }
    }
}

impl ClientConfig {
    /// Per-attempt request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Backoff before the first retry
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Session settle delay
    pub fn session_settle(&self) -> Duration {
        Duration::from_millis(self.session_settle_ms)
    }
}

/// Local persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database directory; the platform data directory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Capacity across all keys (bytes)
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: usize,

    /// Sessions kept when the collection exceeds capacity
    #[serde(default = "default_max_sessions_on_quota")]
    pub max_sessions_on_quota: usize,
}

fn default_capacity_bytes() -> usize {
    DEFAULT_CAPACITY_BYTES
}

fn default_max_sessions_on_quota() -> usize {
    DEFAULT_MAX_SESSIONS_ON_QUOTA
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity_bytes: default_capacity_bytes(),
            max_sessions_on_quota: default_max_sessions_on_quota(),
        }
    }
}

/// Proxy endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Per-client rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Upstream model provider
    #[serde(default)]
    pub provider: ProviderConfig,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            rate_limit: RateLimitConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

/// Per-client rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length (seconds)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often stale entries are swept (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Entries older than this many windows are swept
    #[serde(default = "default_stale_windows")]
    pub stale_windows: u32,
}

fn default_max_requests() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_stale_windows() -> u32 {
    5
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            stale_windows: default_stale_windows(),
        }
    }
}

/// Upstream model provider configuration
///
/// Any OpenAI-compatible chat completions API works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API base URL (the `/chat/completions` path is appended)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// API key; with none configured the proxy answers with fallback replies
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upstream request timeout (seconds)
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    /// Conversation turns forwarded upstream
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    800
}

fn default_provider_timeout_secs() -> u64 {
    15
}

fn default_context_messages() -> usize {
    15
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_provider_timeout_secs(),
            context_messages: default_context_messages(),
        }
    }
}

/// Speech capability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpeechConfig {
    /// External command that reads text on stdin and speaks it
    /// (for example `espeak` or `say`)
    #[serde(default)]
    pub synthesis_command: Option<String>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TutorError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| TutorError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(endpoint) = std::env::var("TUTORCHAT_ENDPOINT") {
            self.client.endpoint = endpoint;
        }

        if let Ok(timeout) = std::env::var("TUTORCHAT_REQUEST_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse() {
                self.client.request_timeout_ms = value;
            } else {
                tracing::warn!("Invalid TUTORCHAT_REQUEST_TIMEOUT_MS: {}", timeout);
            }
        }

        if let Ok(retries) = std::env::var("TUTORCHAT_MAX_RETRIES") {
            if let Ok(value) = retries.parse() {
                self.client.max_retries = value;
            } else {
                tracing::warn!("Invalid TUTORCHAT_MAX_RETRIES: {}", retries);
            }
        }

        if let Ok(path) = std::env::var("TUTORCHAT_STORE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }

        if let Ok(bind) = std::env::var("TUTORCHAT_BIND") {
            self.proxy.bind = bind;
        }

        if let Ok(api_base) = std::env::var("TUTORCHAT_API_BASE") {
            self.proxy.provider.api_base = api_base;
        }

        if let Ok(model) = std::env::var("TUTORCHAT_MODEL") {
            self.proxy.provider.model = model;
        }

        if let Ok(api_key) = std::env::var("TUTORCHAT_API_KEY") {
            if api_key.trim().is_empty() {
                tracing::debug!("Ignoring empty TUTORCHAT_API_KEY");
            } else {
                self.proxy.provider.api_key = Some(api_key);
            }
        }

        if let Ok(max_requests) = std::env::var("TUTORCHAT_RATE_LIMIT") {
            match max_requests.parse::<u32>() {
                Ok(v) => {
                    self.proxy.rate_limit.max_requests = v;
                    tracing::debug!(max_requests = v, "Env override: TUTORCHAT_RATE_LIMIT");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for TUTORCHAT_RATE_LIMIT: {}", max_requests);
                }
            }
        }

        if let Ok(command) = std::env::var("TUTORCHAT_SPEECH_COMMAND") {
            self.speech.synthesis_command = Some(command);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(path) = &cli.storage_path {
            tracing::info!("Using storage path override from CLI: {}", path.display());
            self.storage.path = Some(path.clone());
        }

        if let Some(endpoint) = &cli.endpoint {
            self.client.endpoint = endpoint.clone();
        }

        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of range
    pub fn validate(&self) -> Result<()> {
        if self.client.endpoint.trim().is_empty() {
            return Err(TutorError::Config("client.endpoint cannot be empty".to_string()).into());
        }

        if self.client.request_timeout_ms == 0 {
            return Err(TutorError::Config(
                "client.request_timeout_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.client.max_retries > 10 {
            return Err(TutorError::Config(
                "client.max_retries must be less than or equal to 10".to_string(),
            )
            .into());
        }

        if self.storage.capacity_bytes == 0 {
            return Err(TutorError::Config(
                "storage.capacity_bytes must be greater than 0".to_string(),
            )
            .into());
        }

        if self.storage.max_sessions_on_quota == 0 {
            return Err(TutorError::Config(
                "storage.max_sessions_on_quota must be greater than 0".to_string(),
            )
            .into());
        }

        if self.proxy.rate_limit.max_requests == 0 {
            return Err(TutorError::Config(
                "proxy.rate_limit.max_requests must be greater than 0".to_string(),
            )
            .into());
        }

        if self.proxy.rate_limit.window_secs == 0 {
            return Err(TutorError::Config(
                "proxy.rate_limit.window_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.proxy.rate_limit.sweep_interval_secs == 0 {
            return Err(TutorError::Config(
                "proxy.rate_limit.sweep_interval_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=2.0).contains(&self.proxy.provider.temperature) {
            return Err(TutorError::Config(
                "proxy.provider.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.proxy.provider.max_tokens == 0 {
            return Err(TutorError::Config(
                "proxy.provider.max_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if self.proxy.provider.context_messages == 0 {
            return Err(TutorError::Config(
                "proxy.provider.context_messages must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
