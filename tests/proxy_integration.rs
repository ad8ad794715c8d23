//! Integration tests for the `/api/chat` proxy endpoint
//!
//! Requests are driven through the router with `tower::ServiceExt::oneshot`;
//! upstream behavior comes from a recording provider or a wiremock server
//! standing in for the model API.

mod common;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use tutorchat::config::ProviderConfig;
use tutorchat::proxy::prompt::{FALLBACK_REPLY, OFFLINE_REPLY, RATE_LIMIT_REPLY};
use tutorchat::proxy::{
    router, ClientRateLimiter, ModelProvider, OpenAiProvider, PromptMessage, ProviderError,
    ProxyState,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingProvider {
    prompts: Mutex<Vec<Vec<PromptMessage>>>,
}

#[async_trait]
impl ModelProvider for RecordingProvider {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        Ok("2 + 2 = 4".to_string())
    }

    fn model(&self) -> &str {
        "recording"
    }
}

fn limiter() -> Arc<ClientRateLimiter> {
    Arc::new(ClientRateLimiter::new(5, Duration::from_secs(60), 5))
}

fn app(provider: Option<Arc<dyn ModelProvider>>) -> Router {
    router(ProxyState::new(provider, limiter(), 15))
}

async fn upstream_app(server: &MockServer) -> Router {
    let config = ProviderConfig {
        api_base: server.uri(),
        ..ProviderConfig::default()
    };
    let provider = OpenAiProvider::new(config, "sk-test".to_string()).unwrap();
    app(Some(Arc::new(provider) as Arc<dyn ModelProvider>))
}

fn chat(client: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client)
        .body(body.into())
        .unwrap()
}

fn question_body() -> String {
    serde_json::to_string(&common::chat_request("What is 2+2?")).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_reply_uses_system_prompt_and_history() {
    let provider = Arc::new(RecordingProvider::default());
    let app = app(Some(provider.clone() as Arc<dyn ModelProvider>));

    let response = app.oneshot(chat("10.0.0.1", question_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["message"], "2 + 2 = 4");

    let prompts = provider.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0][0].role, "system");
    assert!(prompts[0][0].content.contains("math"));
    assert_eq!(prompts[0][1], PromptMessage::new("user", "What is 2+2?"));
}

#[tokio::test]
async fn test_sixth_request_in_window_is_rate_limited() {
    let app = app(None);

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(chat("203.0.113.7", question_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(chat("203.0.113.7, 10.0.0.1", question_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(json_body(response).await["error"], RATE_LIMIT_REPLY);

    let other = app
        .oneshot(chat("198.51.100.2", question_body()))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_provider_serves_offline_reply() {
    let response = app(None)
        .oneshot(chat("10.0.0.2", question_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["message"], OFFLINE_REPLY);
}

#[tokio::test]
async fn test_invalid_bodies_are_rejected() {
    let app = app(None);

    let response = app
        .clone()
        .oneshot(chat("10.0.0.3", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid request body");

    let response = app
        .oneshot(chat("10.0.0.3", r#"{"messages": []}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Messages are required");
}

#[tokio::test]
async fn test_upstream_rate_limit_maps_to_429() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
        .expect(1)
        .mount(&server)
        .await;

    let response = upstream_app(&server)
        .await
        .oneshot(chat("10.0.0.4", question_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(response).await["error"], RATE_LIMIT_REPLY);
}

#[tokio::test]
async fn test_upstream_failure_maps_to_503_with_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let response = upstream_app(&server)
        .await
        .oneshot(chat("10.0.0.5", question_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"], "AI service temporarily unavailable");
    assert_eq!(body["message"], FALLBACK_REPLY);
}

#[tokio::test]
async fn test_unusable_upstream_reply_maps_to_500() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "   "}}]
        })))
        .mount(&server)
        .await;

    let response = upstream_app(&server)
        .await
        .oneshot(chat("10.0.0.6", question_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await["error"],
        "Invalid response from AI service"
    );
}

#[tokio::test]
async fn test_cors_headers_and_preflight() {
    let app = app(None);

    let preflight = app
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/chat")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(preflight.status(), StatusCode::OK);
    assert_eq!(
        preflight.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    assert_eq!(
        preflight.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
        "POST, OPTIONS"
    );

    let response = app
        .oneshot(chat("10.0.0.7", question_body()))
        .await
        .unwrap();
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_health() {
    let response = app(None)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
