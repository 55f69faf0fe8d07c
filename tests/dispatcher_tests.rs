//! Request dispatcher tests over the HTTP transport

use chatgpt_client::config::ApiConfig;
use chatgpt_client::services::{
    Endpoint, HttpTransport, RateLimiter, RequestDispatcher, RetryPolicy,
};
use chatgpt_client::ChatGptError;
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn api_config(base_url: String) -> ApiConfig {
    ApiConfig {
        api_key: "sk-dispatch-test".to_string(),
        base_url,
        timeout: 5,
        user_agent: "dispatcher-tests/1.0".to_string(),
    }
}

fn create_dispatcher(base_url: String, max_retries: u32) -> RequestDispatcher {
    let transport = HttpTransport::new(&api_config(base_url)).unwrap();
    RequestDispatcher::new(
        Arc::new(transport),
        Arc::new(RateLimiter::new(0)),
        RetryPolicy {
            max_retries,
            delay: Duration::ZERO,
            ..RetryPolicy::default()
        },
    )
}

#[tokio::test]
async fn test_sends_headers_and_returns_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("Authorization", "Bearer sk-dispatch-test")
                .header("Content-Type", "application/json")
                .header("User-Agent", "dispatcher-tests/1.0")
                .json_body(json!({"model": "gpt-4", "messages": []}));
            then.status(200).json_body(json!({"id": "chatcmpl-9", "object": "chat.completion"}));
        })
        .await;

    let dispatcher = create_dispatcher(server.url("/v1"), 2);
    let value = dispatcher
        .send(Endpoint::ChatCompletions, &json!({"model": "gpt-4", "messages": []}))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(value["id"], "chatcmpl-9");
}

#[tokio::test]
async fn test_remote_429_retried_then_rate_limit_error() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(429)
                .header("Retry-After", "7")
                .json_body(json!({"error": {"message": "Rate limit reached for requests"}}));
        })
        .await;

    let dispatcher = create_dispatcher(server.url("/v1"), 2);
    let err = dispatcher
        .send(Endpoint::ChatCompletions, &json!({}))
        .await
        .unwrap_err();

    mock.assert_hits_async(3).await;
    assert!(matches!(err, ChatGptError::RateLimitExceeded { .. }));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    assert_eq!(err.context().get("attempts"), Some(&json!(3)));
    assert_eq!(err.context().get("status"), Some(&json!(429)));
}

#[tokio::test]
async fn test_remote_429_without_header_uses_default_retry_after() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/completions");
            then.status(429);
        })
        .await;

    let err = create_dispatcher(server.url("/v1"), 0)
        .send(Endpoint::Completions, &json!({}))
        .await
        .unwrap_err();

    assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
}

#[tokio::test]
async fn test_404_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(404)
                .json_body(json!({"error": {"message": "The model `gpt-5` does not exist"}}));
        })
        .await;

    // A real delay would show up in the elapsed time if a retry happened
    let transport = HttpTransport::new(&api_config(server.url("/v1"))).unwrap();
    let dispatcher = RequestDispatcher::new(
        Arc::new(transport),
        Arc::new(RateLimiter::new(0)),
        RetryPolicy {
            max_retries: 3,
            delay: Duration::from_secs(2),
            ..RetryPolicy::default()
        },
    );

    let start = Instant::now();
    let err = dispatcher
        .send(Endpoint::ChatCompletions, &json!({}))
        .await
        .unwrap_err();

    mock.assert_hits_async(1).await;
    assert!(start.elapsed() < Duration::from_secs(2));
    match err {
        ChatGptError::Client { status, message, .. } => {
            assert_eq!(status, 404);
            assert_eq!(message, "The model `gpt-5` does not exist");
        }
        other => panic!("Expected client error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(503)
                .json_body(json!({"error": {"message": "The server is overloaded"}}));
        })
        .await;

    let err = create_dispatcher(server.url("/v1"), 2)
        .send(Endpoint::ChatCompletions, &json!({}))
        .await
        .unwrap_err();

    mock.assert_hits_async(3).await;
    match err {
        ChatGptError::Transport { attempts, status, message, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(status, Some(503));
            assert_eq!(message, "HTTP 503: The server is overloaded");
        }
        other => panic!("Expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_failure_is_transport_error() {
    // Nothing listens on the discard port
    let err = create_dispatcher("http://127.0.0.1:9/v1".to_string(), 1)
        .send(Endpoint::ChatCompletions, &json!({}))
        .await
        .unwrap_err();

    match err {
        ChatGptError::Transport { attempts, status, .. } => {
            assert_eq!(attempts, 2);
            assert_eq!(status, None);
        }
        other => panic!("Expected transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_undecodable_success_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).body("<html>gateway</html>");
        })
        .await;

    let err = create_dispatcher(server.url("/v1"), 1)
        .send(Endpoint::ChatCompletions, &json!({}))
        .await
        .unwrap_err();

    mock.assert_hits_async(2).await;
    assert!(matches!(err, ChatGptError::Transport { .. }));
    assert!(err.message().starts_with("Failed to decode response"));
}
