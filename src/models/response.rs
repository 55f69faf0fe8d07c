//! Response models
//!
//! Wraps raw API payloads in typed, queryable responses. Parsing is lenient:
//! missing or mistyped fields fall back to empty or zero values.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    /// Read each count on its own so one bad field does not zero the others
    pub fn from_value(usage: &Value) -> Self {
        let count = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);

        Self {
            prompt_tokens: count("prompt_tokens"),
            completion_tokens: count("completion_tokens"),
            total_tokens: count("total_tokens"),
        }
    }
}

/// Fields shared by every response kind
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMeta {
    id: String,
    object: String,
    created: i64,
    model: String,
    usage: Usage,
    raw: Value,
}

impl ResponseMeta {
    /// Extract the shared fields from a raw payload, keeping the payload
    pub fn from_raw(raw: Value) -> Self {
        let usage = raw.get("usage").map(Usage::from_value).unwrap_or_default();

        Self {
            id: str_field(&raw, "id"),
            object: str_field(&raw, "object"),
            created: raw.get("created").and_then(Value::as_i64).unwrap_or(0),
            model: str_field(&raw, "model"),
            usage,
            raw,
        }
    }

    /// Choices list, empty when absent
    pub fn choices(&self) -> &[Value] {
        self.raw
            .get("choices")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First choice, which is the one every accessor reads
    pub fn first_choice(&self) -> Option<&Value> {
        self.choices().first()
    }

    fn base_map(&self, content: String) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".to_string(), json!(self.id));
        map.insert("object".to_string(), json!(self.object));
        map.insert("created".to_string(), json!(self.created));
        map.insert("model".to_string(), json!(self.model));
        map.insert("usage".to_string(), json!(self.usage));
        map.insert("content".to_string(), json!(content));
        map
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Access to the shared response fields
pub trait HasUsage {
    fn meta(&self) -> &ResponseMeta;

    fn id(&self) -> &str {
        &self.meta().id
    }

    /// Object type tag, e.g. `chat.completion`
    fn object(&self) -> &str {
        &self.meta().object
    }

    /// Creation timestamp (seconds since epoch)
    fn created(&self) -> i64 {
        self.meta().created
    }

    fn model(&self) -> &str {
        &self.meta().model
    }

    fn usage(&self) -> Usage {
        self.meta().usage
    }

    fn prompt_tokens(&self) -> u64 {
        self.meta().usage.prompt_tokens
    }

    fn completion_tokens(&self) -> u64 {
        self.meta().usage.completion_tokens
    }

    fn total_tokens(&self) -> u64 {
        self.meta().usage.total_tokens
    }

    /// The unmodified payload
    fn raw(&self) -> &Value {
        &self.meta().raw
    }
}

/// Main generated text of a response
pub trait HasContent {
    fn content(&self) -> &str;
}

/// Finish reason predicates
pub trait HasFinishReason {
    fn finish_reason(&self) -> &str;

    /// Generation stopped naturally
    fn is_complete(&self) -> bool {
        self.finish_reason() == "stop"
    }

    /// Generation hit the token limit
    fn is_truncated(&self) -> bool {
        self.finish_reason() == "length"
    }

    /// Generation was stopped by the content filter
    fn is_filtered(&self) -> bool {
        self.finish_reason() == "content_filter"
    }
}

/// Structural serialization shared by all response kinds
pub trait ResponseModel: HasUsage + HasContent {
    /// Variant-specific fields layered over the base fields
    fn extra_fields(&self) -> Map<String, Value> {
        Map::new()
    }

    fn to_value(&self) -> Value {
        let mut map = self.meta().base_map(self.content().to_string());
        map.extend(self.extra_fields());
        Value::Object(map)
    }

    fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_value())
    }
}

/// Chat completion response
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    meta: ResponseMeta,
    content: String,
    finish_reason: String,
}

impl ChatResponse {
    pub fn from_value(raw: Value) -> Self {
        let meta = ResponseMeta::from_raw(raw);
        let first = meta.first_choice();
        let content = first
            .and_then(|choice| choice.pointer("/message/content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let finish_reason = first
            .and_then(|choice| choice.get("finish_reason"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self {
            meta,
            content,
            finish_reason,
        }
    }

    pub fn choices(&self) -> &[Value] {
        self.meta.choices()
    }

    /// Role of the first choice's message
    pub fn role(&self) -> &str {
        self.message()
            .and_then(|message| message.get("role"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Full message object of the first choice
    pub fn message(&self) -> Option<&Value> {
        self.meta.first_choice().and_then(|choice| choice.get("message"))
    }
}

impl HasUsage for ChatResponse {
    fn meta(&self) -> &ResponseMeta {
        &self.meta
    }
}

impl HasContent for ChatResponse {
    fn content(&self) -> &str {
        &self.content
    }
}

impl HasFinishReason for ChatResponse {
    fn finish_reason(&self) -> &str {
        &self.finish_reason
    }
}

impl ResponseModel for ChatResponse {
    fn extra_fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("choices".to_string(), Value::Array(self.choices().to_vec()));
        map.insert("finish_reason".to_string(), json!(self.finish_reason));
        map.insert("role".to_string(), json!(self.role()));
        map.insert("is_complete".to_string(), json!(self.is_complete()));
        map.insert("is_truncated".to_string(), json!(self.is_truncated()));
        map.insert("is_filtered".to_string(), json!(self.is_filtered()));
        map
    }
}

impl fmt::Display for ChatResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// Legacy text completion response
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    meta: ResponseMeta,
    content: String,
    finish_reason: String,
}

impl CompletionResponse {
    pub fn from_value(raw: Value) -> Self {
        let meta = ResponseMeta::from_raw(raw);
        let first = meta.first_choice();
        let content = first
            .and_then(|choice| choice.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let finish_reason = first
            .and_then(|choice| choice.get("finish_reason"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self {
            meta,
            content,
            finish_reason,
        }
    }

    pub fn choices(&self) -> &[Value] {
        self.meta.choices()
    }

    /// Log probability data of the first choice, if the API sent any
    pub fn logprobs(&self) -> Option<&Value> {
        self.meta
            .first_choice()
            .and_then(|choice| choice.get("logprobs"))
            .filter(|logprobs| !logprobs.is_null())
    }

    /// Completion text without leading/trailing whitespace
    pub fn clean_content(&self) -> &str {
        self.content.trim()
    }
}

impl HasUsage for CompletionResponse {
    fn meta(&self) -> &ResponseMeta {
        &self.meta
    }
}

impl HasContent for CompletionResponse {
    fn content(&self) -> &str {
        &self.content
    }
}

impl HasFinishReason for CompletionResponse {
    fn finish_reason(&self) -> &str {
        &self.finish_reason
    }
}

impl ResponseModel for CompletionResponse {
    fn extra_fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("choices".to_string(), Value::Array(self.choices().to_vec()));
        map.insert("finish_reason".to_string(), json!(self.finish_reason));
        map.insert("is_complete".to_string(), json!(self.is_complete()));
        map.insert("is_truncated".to_string(), json!(self.is_truncated()));
        map.insert("clean_content".to_string(), json!(self.clean_content()));
        map
    }
}

impl fmt::Display for CompletionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}
