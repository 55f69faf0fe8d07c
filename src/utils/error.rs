//! Error handling module
//!
//! Defines the error kinds surfaced by the request pipeline and the
//! diagnostic context attached to them

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default wait suggested to callers after a rate limit denial
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Diagnostic key/value pairs attached to a failure
///
/// Entries accumulate as the error crosses call boundaries; a later insert
/// with the same key overwrites the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorContext(BTreeMap<String, Value>);

impl ErrorContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up an entry
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Errors produced by client operations
#[derive(Error, Debug)]
pub enum ChatGptError {
    /// Local admission denied, or the remote API kept answering 429
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        message: String,
        retry_after: Duration,
        context: ErrorContext,
    },

    /// Remote API rejected the request (4xx other than 429)
    #[error("Client error ({status}): {message}")]
    Client {
        status: u16,
        message: String,
        context: ErrorContext,
    },

    /// Server error, network failure or undecodable response
    #[error("Request failed after {attempts} attempt(s): {message}")]
    Transport {
        attempts: u32,
        status: Option<u16>,
        message: String,
        context: ErrorContext,
    },
}

impl ChatGptError {
    /// HTTP status code associated with the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ChatGptError::RateLimitExceeded { .. } => Some(429),
            ChatGptError::Client { status, .. } => Some(*status),
            ChatGptError::Transport { status, .. } => *status,
        }
    }

    /// Get error type string
    pub fn error_type(&self) -> &'static str {
        match self {
            ChatGptError::RateLimitExceeded { .. } => "rate_limit_error",
            ChatGptError::Client { .. } => "invalid_request_error",
            ChatGptError::Transport { .. } => "transport_error",
        }
    }

    /// Suggested wait before retrying, only set for rate limit errors
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ChatGptError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Bare message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            ChatGptError::RateLimitExceeded { message, .. }
            | ChatGptError::Client { message, .. }
            | ChatGptError::Transport { message, .. } => message,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            ChatGptError::RateLimitExceeded { context, .. }
            | ChatGptError::Client { context, .. }
            | ChatGptError::Transport { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            ChatGptError::RateLimitExceeded { context, .. }
            | ChatGptError::Client { context, .. }
            | ChatGptError::Transport { context, .. } => context,
        }
    }

    /// Attach a context entry and return the error
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_mut().insert(key, value);
        self
    }

    /// Structured form of the error for logs and API responses
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "type": self.error_type(),
            "message": self.message(),
            "code": self.status_code().unwrap_or(0),
            "context": self.context(),
        });

        match self {
            ChatGptError::RateLimitExceeded { retry_after, .. } => {
                value["retry_after"] = json!(retry_after.as_secs());
            }
            ChatGptError::Transport { attempts, .. } => {
                value["attempts"] = json!(attempts);
            }
            ChatGptError::Client { .. } => {}
        }

        value
    }
}

/// Result type alias
pub type ChatGptResult<T> = Result<T, ChatGptError>;

/// Error construction helpers
pub mod helpers {
    use super::*;

    /// Create rate limit error
    pub fn rate_limit_error(message: impl Into<String>, retry_after: Duration) -> ChatGptError {
        ChatGptError::RateLimitExceeded {
            message: message.into(),
            retry_after,
            context: ErrorContext::new(),
        }
    }

    /// Create client error
    pub fn client_error(status: u16, message: impl Into<String>) -> ChatGptError {
        ChatGptError::Client {
            status,
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create transport error
    pub fn transport_error(
        attempts: u32,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> ChatGptError {
        ChatGptError::Transport {
            attempts,
            status,
            message: message.into(),
            context: ErrorContext::new(),
        }
    }
}

/// Error context extension trait
pub trait ResultExt<T> {
    /// Attach a context entry to the error, if any
    fn add_context(self, key: &str, value: impl Into<Value>) -> ChatGptResult<T>;
}

impl<T> ResultExt<T> for ChatGptResult<T> {
    fn add_context(self, key: &str, value: impl Into<Value>) -> ChatGptResult<T> {
        self.map_err(|e| e.with_context(key, value))
    }
}
