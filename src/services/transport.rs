//! HTTP transport
//!
//! Sends a JSON payload to an API path and reports the raw reply. Status
//! classification happens in the dispatcher, not here.

use crate::config::ApiConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Raw reply from the remote API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
    /// Parsed `Retry-After` header, when the server sent one in seconds
    pub retry_after: Option<Duration>,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced an HTTP reply
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportFailure {
    pub message: String,
    pub timed_out: bool,
}

impl TransportFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        Self {
            timed_out: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

/// One POST of a JSON body to an API path
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn post_json(&self, path: &str, payload: &Value) -> Result<HttpReply, TransportFailure>;
}

/// reqwest-backed transport with bearer authentication
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a new transport instance
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api.api_key))
            .context("API key is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout))
            .user_agent(api.user_agent.as_str())
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the request URL
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, path: &str, payload: &Value) -> Result<HttpReply, TransportFailure> {
        let url = self.url(path);
        debug!(url = %url, "POST");

        let response = self.client.post(&url).json(payload).send().await?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await?;

        Ok(HttpReply {
            status,
            body,
            retry_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        let mut api = ApiConfig::default();
        api.api_key = "sk-test".to_string();
        api.base_url = "https://api.openai.com/v1/".to_string();

        let transport = HttpTransport::new(&api).unwrap();
        assert_eq!(transport.url("chat/completions"), "https://api.openai.com/v1/chat/completions");
        assert_eq!(transport.url("/completions"), "https://api.openai.com/v1/completions");
    }

    #[test]
    fn test_invalid_api_key_header() {
        let mut api = ApiConfig::default();
        api.api_key = "bad\nkey".to_string();
        assert!(HttpTransport::new(&api).is_err());
    }

    #[test]
    fn test_reply_success_range() {
        assert!(HttpReply::new(200, "{}").is_success());
        assert!(!HttpReply::new(429, "").is_success());
        assert!(!HttpReply::new(500, "").is_success());
    }
}
