//! Request dispatcher
//!
//! Gates each logical request through the rate limiter, then runs the
//! retry loop around the transport and classifies the terminal failure.

use super::rate_limiter::RateLimiter;
use super::transport::{HttpReply, Transport};
use crate::config::RetryConfig;
use crate::models::openai::ApiErrorResponse;
use crate::utils::error::{helpers, ChatGptError, ChatGptResult, ResultExt, DEFAULT_RETRY_AFTER};
use crate::utils::logging::create_payload_log_summary;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// API endpoints the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ChatCompletions,
    Completions,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::ChatCompletions => "chat/completions",
            Endpoint::Completions => "completions",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
    /// Retry-after reported when a 429 reply carries no header
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(1),
            default_retry_after: DEFAULT_RETRY_AFTER,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.retry_attempts,
            delay: config.delay(),
            default_retry_after: DEFAULT_RETRY_AFTER,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// What to do after one attempt
enum Outcome {
    Done(Value),
    Retry(ChatGptError),
    Fail(ChatGptError),
}

/// Sends payloads with admission control and retries
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    transport: Arc<dyn Transport>,
    rate_limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RequestDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        rate_limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            rate_limiter,
            policy,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send a payload and return the decoded JSON object
    ///
    /// Admission is checked once per call, before the first attempt. The
    /// delay between attempts is a tokio timer, so dropping the returned
    /// future aborts a pending retry.
    pub async fn send(&self, endpoint: Endpoint, payload: &Value) -> ChatGptResult<Value> {
        self.rate_limiter
            .admit()
            .add_context("endpoint", endpoint.path())?;

        debug!(
            endpoint = %endpoint,
            payload = %create_payload_log_summary(payload),
            "Dispatching request"
        );

        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let has_more = attempt < max_attempts;

            let outcome = match self.transport.post_json(endpoint.path(), payload).await {
                Ok(reply) => self.classify(reply, attempt, has_more),
                Err(failure) => {
                    let err = helpers::transport_error(attempt, None, failure.message);
                    Outcome::Retry(if failure.timed_out {
                        err.with_context("timed_out", true)
                    } else {
                        err
                    })
                }
            };

            let err = match outcome {
                Outcome::Done(value) => {
                    debug!(endpoint = %endpoint, attempt, "Request completed successfully");
                    return Ok(value);
                }
                Outcome::Fail(err) => err,
                Outcome::Retry(err) if has_more => {
                    warn!(
                        endpoint = %endpoint,
                        attempt,
                        max_attempts,
                        delay_ms = self.policy.delay.as_millis() as u64,
                        "Request failed, retrying: {}",
                        err.message()
                    );
                    tokio::time::sleep(self.policy.delay).await;
                    continue;
                }
                Outcome::Retry(err) => err,
            };

            error!(endpoint = %endpoint, attempt, "Request failed: {}", err);
            let err = err
                .with_context("endpoint", endpoint.path())
                .with_context("attempts", attempt);
            return Err(match err.status_code() {
                Some(status) => err.with_context("status", status),
                None => err,
            });
        }
    }

    fn classify(&self, reply: HttpReply, attempt: u32, has_more: bool) -> Outcome {
        if reply.is_success() {
            return match serde_json::from_str::<Value>(&reply.body) {
                Ok(value) if value.is_object() => Outcome::Done(value),
                Ok(_) => Outcome::Retry(helpers::transport_error(
                    attempt,
                    Some(reply.status),
                    "Response body is not a JSON object",
                )),
                Err(e) => Outcome::Retry(helpers::transport_error(
                    attempt,
                    Some(reply.status),
                    format!("Failed to decode response: {}", e),
                )),
            };
        }

        match reply.status {
            429 if has_more => Outcome::Retry(helpers::rate_limit_error(
                "Remote rate limit hit",
                self.policy.default_retry_after,
            )),
            429 => Outcome::Fail(helpers::rate_limit_error(
                "Rate limit exceeded. Please try again later.",
                reply.retry_after.unwrap_or(self.policy.default_retry_after),
            )),
            400..=499 => {
                let message = serde_json::from_str::<ApiErrorResponse>(&reply.body)
                    .map(|body| body.error.message)
                    .unwrap_or_else(|_| "Client error occurred".to_string());
                Outcome::Fail(helpers::client_error(reply.status, message))
            }
            status => Outcome::Retry(helpers::transport_error(
                attempt,
                Some(status),
                format!("HTTP {}: {}", status, error_message(&reply.body)),
            )),
        }
    }
}

/// Nested `error.message` of a body, else the body itself
fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transport::TransportFailure;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed list of replies and counts attempts
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<HttpReply, TransportFailure>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<HttpReply, TransportFailure>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(&self, _path: &str, _payload: &Value) -> Result<HttpReply, TransportFailure> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportFailure::new("script exhausted")))
        }
    }

    fn dispatcher(transport: Arc<ScriptedTransport>, max_retries: u32, limit: u32) -> RequestDispatcher {
        RequestDispatcher::new(
            transport,
            Arc::new(RateLimiter::new(limit)),
            RetryPolicy {
                max_retries,
                delay: Duration::from_secs(1),
                default_retry_after: DEFAULT_RETRY_AFTER,
            },
        )
    }

    fn ok_reply() -> Result<HttpReply, TransportFailure> {
        Ok(HttpReply::new(200, json!({"id": "chatcmpl-1", "choices": []}).to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_exhausts_retries() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(429, "")),
            Ok(HttpReply::new(429, "")),
            Ok(HttpReply::new(429, "")),
        ]);
        let dispatcher = dispatcher(transport.clone(), 2, 0);

        let start = tokio::time::Instant::now();
        let err = dispatcher.send(Endpoint::ChatCompletions, &json!({})).await.unwrap_err();

        assert_eq!(transport.calls(), 3);
        assert!(matches!(err, ChatGptError::RateLimitExceeded { .. }));
        assert_eq!(err.retry_after(), Some(DEFAULT_RETRY_AFTER));
        assert_eq!(err.context().get("attempts"), Some(&json!(3)));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_fails_immediately() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(
            404,
            r#"{"error": {"message": "The model does not exist"}}"#,
        ))]);
        let dispatcher = dispatcher(transport.clone(), 2, 0);

        let start = tokio::time::Instant::now();
        let err = dispatcher.send(Endpoint::ChatCompletions, &json!({})).await.unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        match err {
            ChatGptError::Client { status, message, .. } => {
                assert_eq!(status, 404);
                assert_eq!(message, "The model does not exist");
            }
            other => panic!("Expected client error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_without_body_message() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(401, "unauthorized"))]);
        let err = dispatcher(transport, 2, 0)
            .send(Endpoint::Completions, &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Client error occurred");
        assert_eq!(err.status_code(), Some(401));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_then_success() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(503, "")),
            Err(TransportFailure::new("connection reset")),
            ok_reply(),
        ]);
        let value = dispatcher(transport.clone(), 2, 0)
            .send(Endpoint::ChatCompletions, &json!({}))
            .await
            .unwrap();

        assert_eq!(transport.calls(), 3);
        assert_eq!(value["id"], "chatcmpl-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_exhausts_retries() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(500, r#"{"error": {"message": "boom"}}"#)),
            Ok(HttpReply::new(502, "bad gateway")),
        ]);
        let err = dispatcher(transport.clone(), 1, 0)
            .send(Endpoint::ChatCompletions, &json!({}))
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 2);
        match err {
            ChatGptError::Transport { attempts, status, ref message, .. } => {
                assert_eq!(attempts, 2);
                assert_eq!(status, Some(502));
                assert_eq!(message, "HTTP 502: bad gateway");
            }
            ref other => panic!("Expected transport error, got {:?}", other),
        }
        assert_eq!(err.context().get("endpoint"), Some(&json!("chat/completions")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_recorded_in_context() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportFailure::new("connection reset")),
            Err(TransportFailure {
                message: "operation timed out".to_string(),
                timed_out: true,
            }),
        ]);
        let err = dispatcher(transport, 1, 0)
            .send(Endpoint::ChatCompletions, &json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.message(), "operation timed out");
        assert_eq!(err.context().get("timed_out"), Some(&json!(true)));
        assert_eq!(err.context().get("attempts"), Some(&json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_not_marked_timed_out() {
        let transport = ScriptedTransport::new(vec![Err(TransportFailure::new("connection refused"))]);
        let err = dispatcher(transport, 0, 0)
            .send(Endpoint::ChatCompletions, &json!({}))
            .await
            .unwrap_err();

        assert!(err.context().get("timed_out").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_json_is_transport_error() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(200, "not json"))]);
        let err = dispatcher(transport.clone(), 0, 0)
            .send(Endpoint::ChatCompletions, &json!({}))
            .await
            .unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert!(matches!(err, ChatGptError::Transport { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_checked_once_per_call() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(500, "")),
            Ok(HttpReply::new(500, "")),
            ok_reply(),
        ]);
        // One admission slot, three physical attempts
        let dispatcher = dispatcher(transport.clone(), 2, 1);

        assert!(dispatcher.send(Endpoint::ChatCompletions, &json!({})).await.is_ok());
        assert_eq!(transport.calls(), 3);

        let err = dispatcher.send(Endpoint::ChatCompletions, &json!({})).await.unwrap_err();
        assert!(matches!(err, ChatGptError::RateLimitExceeded { .. }));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_future_cancels_pending_retry() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(503, "")), ok_reply()]);
        let dispatcher = dispatcher(transport.clone(), 1, 0);

        let payload = json!({});
        let result = tokio::time::timeout(
            Duration::from_millis(500),
            dispatcher.send(Endpoint::ChatCompletions, &payload),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(transport.calls(), 1);
    }
}
