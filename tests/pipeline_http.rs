//! Message pipeline over real HTTP
//!
//! The tutor endpoint is either a wiremock server or the proxy router itself
//! served on an ephemeral port.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tutorchat::commands::LocalState;
use tutorchat::config::ClientConfig;
use tutorchat::pipeline::{HttpChatTransport, MessagePipeline, SendOutcome, SendPhase};
use tutorchat::proxy::prompt::OFFLINE_REPLY;
use tutorchat::proxy::{router, ClientRateLimiter, ProxyState};
use tutorchat::session::Role;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_config(endpoint: &str) -> ClientConfig {
    ClientConfig {
        endpoint: endpoint.to_string(),
        request_timeout_ms: 2_000,
        max_retries: 2,
        retry_base_delay_ms: 10,
        session_settle_ms: 0,
    }
}

fn pipeline(state: &LocalState, config: ClientConfig) -> MessagePipeline {
    let transport = Arc::new(HttpChatTransport::new(&config.endpoint).unwrap());
    MessagePipeline::new(
        config,
        state.sessions.clone(),
        state.progress.clone(),
        transport,
    )
}

#[tokio::test]
async fn test_successful_exchange_is_committed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({
            "messages": [{"role": "user", "content": "What is 2+2?"}],
            "subject": "math"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "4"})))
        .expect(1)
        .mount(&server)
        .await;

    let state = LocalState::in_memory();
    let pipeline = pipeline(&state, client_config(&server.uri()));
    pipeline.set_context(Some("math".to_string()), None);

    let outcome = pipeline.send_message("What is 2+2?").await;
    let SendOutcome::Succeeded { session_id, reply } = outcome else {
        panic!("expected success");
    };
    assert_eq!(reply.content, "4");
    assert_eq!(pipeline.phase(), SendPhase::Succeeded);

    let session = state.sessions.session(&session_id).unwrap();
    assert_eq!(session.title, "What is 2+2?");
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].role, Role::User);
    assert_eq!(session.messages[1].content, "4");

    let stats = state.progress.stats();
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.total_messages, 2);
    assert_eq!(stats.favorite_subjects, vec!["math".to_string()]);
}

#[tokio::test]
async fn test_service_unavailable_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "error": "AI service temporarily unavailable",
            "message": "I'm having trouble thinking right now."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = LocalState::in_memory();
    let pipeline = pipeline(&state, client_config(&server.uri()));

    let SendOutcome::Failed { error, fallback } = pipeline.send_message("Explain entropy").await
    else {
        panic!("expected failure");
    };
    assert!(error.contains("temporarily unavailable"));
    assert_eq!(
        fallback.as_deref(),
        Some("I'm having trouble thinking right now.")
    );
    assert_eq!(pipeline.last_error(), Some(error));

    let session = pipeline.current_session().unwrap();
    assert_eq!(session.messages.len(), 2);
    assert!(session.messages[1].is_error);
    assert_eq!(state.progress.stats().total_messages, 0);
}

#[tokio::test]
async fn test_timeouts_are_retried_then_fail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"message": "too late"}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let state = LocalState::in_memory();
    let config = ClientConfig {
        request_timeout_ms: 100,
        max_retries: 1,
        ..client_config(&server.uri())
    };
    let pipeline = pipeline(&state, config);

    let SendOutcome::Failed { error, .. } = pipeline.send_message("Define a limit").await else {
        panic!("expected failure");
    };
    assert!(error.contains("timed out"));
}

#[tokio::test]
async fn test_pipeline_through_offline_proxy() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let limiter = Arc::new(ClientRateLimiter::new(5, Duration::from_secs(60), 5));
    let app = router(ProxyState::new(None, limiter, 15));
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let state = LocalState::in_memory();
    let pipeline = pipeline(&state, client_config(&format!("http://{}", addr)));

    let SendOutcome::Succeeded { reply, .. } = pipeline.send_message("How do magnets work?").await
    else {
        panic!("expected success");
    };
    assert_eq!(reply.content, OFFLINE_REPLY);

    server.abort();
}
