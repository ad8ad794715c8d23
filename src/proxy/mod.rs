//! Proxy endpoint
//!
//! `POST /api/chat` relays a conversation to the upstream model provider,
//! holding the provider credentials server-side. Requests are rate limited per
//! client, and upstream failures are translated into status codes plus
//! fallback text the client can show.

use crate::api::{ChatRequest, ChatResponse, ErrorBody, HealthResponse};
use crate::config::ProxyConfig;
use crate::error::{Result, TutorError};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use metrics::increment_counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub mod prompt;
pub mod provider;
pub mod rate_limit;

pub use provider::{ModelProvider, OpenAiProvider, PromptMessage, ProviderError};
pub use rate_limit::{ClientRateLimiter, RateDecision};

/// Shared state of the proxy router
#[derive(Clone)]
pub struct ProxyState {
    provider: Option<Arc<dyn ModelProvider>>,
    limiter: Arc<ClientRateLimiter>,
    context_messages: usize,
}

impl ProxyState {
    /// Build state from configuration; without an API key the proxy answers
    /// with offline replies
    ///
    /// # Errors
    ///
    /// Returns error if the provider client cannot be built
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let provider: Option<Arc<dyn ModelProvider>> = match &config.provider.api_key {
            Some(key) if !key.trim().is_empty() => Some(Arc::new(OpenAiProvider::new(
                config.provider.clone(),
                key.clone(),
            )?) as Arc<dyn ModelProvider>),
            _ => {
                tracing::warn!("No provider API key configured, serving offline replies");
                None
            }
        };

        Ok(Self::new(
            provider,
            Arc::new(ClientRateLimiter::from_config(&config.rate_limit)),
            config.provider.context_messages,
        ))
    }

    /// Assemble state from parts
    pub fn new(
        provider: Option<Arc<dyn ModelProvider>>,
        limiter: Arc<ClientRateLimiter>,
        context_messages: usize,
    ) -> Self {
        Self {
            provider,
            limiter,
            context_messages,
        }
    }

    /// The rate limiter shared by all requests
    pub fn limiter(&self) -> Arc<ClientRateLimiter> {
        self.limiter.clone()
    }
}

/// Everything `/api/chat` can answer besides a reply
#[derive(Debug)]
enum ProxyError {
    BadRequest(String),
    RateLimited(Duration),
    UpstreamRateLimited,
    UpstreamUnavailable,
    InvalidUpstream,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, body, retry_after) = match self {
            ProxyError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorBody::new(msg), None),
            ProxyError::RateLimited(wait) => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody::new(prompt::RATE_LIMIT_REPLY),
                Some(wait.as_secs().max(1)),
            ),
            ProxyError::UpstreamRateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody::new(prompt::RATE_LIMIT_REPLY),
                None,
            ),
            ProxyError::UpstreamUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody::with_message("AI service temporarily unavailable", prompt::FALLBACK_REPLY),
                None,
            ),
            ProxyError::InvalidUpstream => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::with_message("Invalid response from AI service", prompt::FALLBACK_REPLY),
                None,
            ),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Build the router
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/api/chat", post(chat).options(preflight))
        .route_layer(middleware::map_response(with_cors))
        .route("/health", get(health))
        .with_state(state)
}

async fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn chat(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let client = rate_limit::client_id(
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok()),
    );

    let response = match handle_chat(&state, &client, body).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(e) => e.into_response(),
    };

    increment_counter!(
        "proxy_requests_total",
        "status" => response.status().as_u16().to_string()
    );
    response
}

async fn handle_chat(
    state: &ProxyState,
    client: &str,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<ChatResponse, ProxyError> {
    if let RateDecision::Limited { retry_after } = state.limiter.check(client) {
        tracing::warn!(client, "Rate limited chat request");
        increment_counter!("proxy_rate_limited_total");
        return Err(ProxyError::RateLimited(retry_after));
    }

    let Json(request) = body.map_err(|e| {
        tracing::debug!(client, error = %e, "Rejected malformed chat request");
        ProxyError::BadRequest("Invalid request body".to_string())
    })?;

    if request.messages.is_empty() {
        return Err(ProxyError::BadRequest("Messages are required".to_string()));
    }

    let Some(provider) = &state.provider else {
        increment_counter!("proxy_fallback_total", "reason" => "no_provider");
        return Ok(ChatResponse {
            message: prompt::OFFLINE_REPLY.to_string(),
        });
    };

    let messages = prompt::build_messages(&request, state.context_messages);
    tracing::debug!(
        client,
        model = provider.model(),
        turns = messages.len() - 1,
        "Forwarding chat request"
    );

    match provider.complete(&messages).await {
        Ok(message) => Ok(ChatResponse { message }),
        Err(ProviderError::RateLimited(detail)) => {
            tracing::warn!("Provider rate limited: {}", detail);
            increment_counter!("proxy_fallback_total", "reason" => "provider_rate_limited");
            Err(ProxyError::UpstreamRateLimited)
        }
        Err(ProviderError::Unavailable(detail)) => {
            tracing::error!("Provider unavailable: {}", detail);
            increment_counter!("proxy_fallback_total", "reason" => "provider_unavailable");
            Err(ProxyError::UpstreamUnavailable)
        }
        Err(ProviderError::InvalidResponse(detail)) => {
            tracing::error!("Provider response unusable: {}", detail);
            increment_counter!("proxy_fallback_total", "reason" => "invalid_response");
            Err(ProxyError::InvalidUpstream)
        }
    }
}

/// Serve the proxy until `shutdown` is cancelled
///
/// # Errors
///
/// Returns `TutorError::Server` if the address cannot be bound or the server
/// stops with an error
pub async fn serve(config: &ProxyConfig, shutdown: CancellationToken) -> Result<()> {
    let state = ProxyState::from_config(config)?;
    let sweeper = state.limiter().spawn_sweeper(
        Duration::from_secs(config.rate_limit.sweep_interval_secs),
        shutdown.child_token(),
    );

    let listener = TcpListener::bind(&config.bind).await.map_err(|e| {
        tracing::error!("Failed to bind proxy listener to {}: {}", config.bind, e);
        TutorError::Server(format!("Failed to bind {}: {}", config.bind, e))
    })?;
    let addr = listener.local_addr()?;
    tracing::info!("Proxy listening on http://{}", addr);

    let signal = shutdown.clone();
    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await;

    shutdown.cancel();
    let _ = sweeper.await;
    tracing::info!("Proxy stopped");

    result.map_err(|e| TutorError::Server(format!("Proxy server error: {}", e)).into())
}
