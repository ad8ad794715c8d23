//! Upstream model provider

use crate::config::ProviderConfig;
use crate::error::{Result, TutorError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How an upstream completion failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider throttled us
    #[error("Provider rate limit: {0}")]
    RateLimited(String),

    /// The provider could not be reached or answered with an error
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered, but not with a usable completion
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// One message in the upstream prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
}

impl PromptMessage {
    /// Create a message with the given role
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Produces tutor replies from a prompt
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Complete the conversation in `messages`
    async fn complete(&self, messages: &[PromptMessage]) -> std::result::Result<String, ProviderError>;

    /// Model identifier for logs
    fn model(&self) -> &str;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions provider
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    url: String,
    api_key: String,
    config: ProviderConfig,
}

impl OpenAiProvider {
    /// Create a provider authenticating with `api_key`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: ProviderConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("tutorchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TutorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let url = format!("{}/chat/completions", config.api_base.trim_end_matches('/'));
        tracing::info!(
            "Initialized model provider: url={}, model={}",
            url,
            config.model
        );

        Ok(Self {
            client,
            url,
            api_key,
            config,
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn complete(&self, messages: &[PromptMessage]) -> std::result::Result<String, ProviderError> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to reach model provider: {}", e);
                ProviderError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::RateLimited(text));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!("Model provider returned error {}: {}", status, text);
            return Err(ProviderError::Unavailable(format!("{}: {}", status, text)));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse model provider response: {}", e);
            ProviderError::InvalidResponse(e.to_string())
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("no completion content".to_string()))
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
