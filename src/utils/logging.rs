//! Logging utilities
//!
//! Subscriber initialisation and payload summaries for debug logs

use crate::config::LoggingConfig;
use serde_json::{json, Value};
use tracing::info;

/// Set to true to log request payloads verbatim
/// Default is false to keep message text and image data out of the logs
pub const VERBOSE_REQUEST_LOGGING: bool = false;

/// Truncate a string with a note about original length
fn truncate_content(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_len {
        let head: String = s.chars().take(max_len).collect();
        format!("{}... ({} chars truncated)", head, char_count - max_len)
    } else {
        s.to_string()
    }
}

fn summarize_part(part: &Value) -> Value {
    match part.get("type").and_then(Value::as_str) {
        Some("text") => {
            let text = part.get("text").and_then(Value::as_str).unwrap_or_default();
            json!({"type": "text", "text": truncate_content(text, 100)})
        }
        Some("image_url") => {
            let url = part
                .pointer("/image_url/url")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let url = if url.starts_with("data:") {
                format!("[embedded image, {} bytes]", url.len())
            } else {
                truncate_content(url, 100)
            };
            json!({"type": "image_url", "url": url, "detail": part.pointer("/image_url/detail")})
        }
        _ => json!("[unknown part]"),
    }
}

fn summarize_message(message: &Value) -> Value {
    let role = message.get("role").cloned().unwrap_or(Value::Null);
    let content = match message.get("content") {
        Some(Value::String(text)) => {
            // System prompts are truncated more aggressively
            let max_len = if role == "system" { 100 } else { 200 };
            Value::String(truncate_content(text, max_len))
        }
        Some(Value::Array(parts)) => Value::Array(parts.iter().map(summarize_part).collect()),
        _ => Value::Null,
    };

    json!({"role": role, "content": content})
}

/// Create a filtered summary of a request payload for logging
/// Keeps the parameters but truncates message text and image data
pub fn create_payload_log_summary(payload: &Value) -> Value {
    if VERBOSE_REQUEST_LOGGING {
        return payload.clone();
    }

    let mut summary = payload.clone();
    if let Some(messages) = payload.get("messages").and_then(Value::as_array) {
        summary["messages"] = Value::Array(messages.iter().map(summarize_message).collect());
    }
    if let Some(prompt) = payload.get("prompt").and_then(Value::as_str) {
        summary["prompt"] = Value::String(truncate_content(prompt, 200));
    }
    summary
}

/// Initialize the global tracing subscriber
///
/// Returns false if a subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let installed = if config.format == "json" {
        // JSON format logs (production environment)
        tracing_subscriber::fmt()
            .with_env_filter(config.level.as_str())
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .try_init()
            .is_ok()
    } else {
        // Human readable format (development environment)
        tracing_subscriber::fmt()
            .with_env_filter(config.level.as_str())
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .try_init()
            .is_ok()
    };

    if installed {
        info!(level = %config.level, format = %config.format, "Logging system initialized");
    }
    installed
}
