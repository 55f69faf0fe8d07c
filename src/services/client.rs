//! ChatGPT client
//!
//! Typed operations that build request payloads from session defaults and
//! per-call options, then hand them to the dispatcher

use super::dispatcher::{Endpoint, RequestDispatcher, RetryPolicy};
use super::rate_limiter::{Clock, RateLimitStatus, RateLimiter, SystemClock};
use super::transport::{HttpTransport, Transport};
use crate::config::{GenerationDefaults, Settings};
use crate::models::openai::*;
use crate::models::response::{ChatResponse, CompletionResponse};
use crate::models::vision::{ContentAnalyzer, KeywordAnalyzer, VisionResponse};
use crate::utils::error::{helpers, ChatGptResult, ResultExt};
use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Model used for vision requests unless the caller picks one
pub const DEFAULT_VISION_MODEL: &str = "gpt-4-vision-preview";

/// Prefix added to bare base64 image data
pub const BASE64_JPEG_PREFIX: &str = "data:image/jpeg;base64,";

/// Models this client knows about
pub const AVAILABLE_MODELS: [&str; 6] = [
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
    "gpt-4",
    "gpt-4-turbo",
    "gpt-4-vision-preview",
    "gpt-4-32k",
];

/// Clamp to [0.0, 2.0]; NaN maps to 0.0
pub fn clamp_temperature(temperature: f64) -> f64 {
    if temperature.is_nan() {
        0.0
    } else {
        temperature.clamp(0.0, 2.0)
    }
}

pub fn clamp_max_tokens(max_tokens: u32) -> u32 {
    max_tokens.max(1)
}

/// Mutable per-client defaults
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl Session {
    pub fn from_defaults(defaults: &GenerationDefaults) -> Self {
        Self {
            model: defaults.default_model.clone(),
            temperature: clamp_temperature(defaults.temperature),
            max_tokens: clamp_max_tokens(defaults.max_tokens),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Per-call overrides
///
/// Unset fields fall back to the session, then to the configuration.
/// `extra` holds raw API parameters copied into the payload as-is; a key
/// there replaces the field of the same name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    /// Image detail level for vision requests
    pub detail: Option<ImageDetail>,
    pub extra: Map<String, Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn frequency_penalty(mut self, penalty: f64) -> Self {
        self.frequency_penalty = Some(penalty);
        self
    }

    pub fn presence_penalty(mut self, penalty: f64) -> Self {
        self.presence_penalty = Some(penalty);
        self
    }

    pub fn detail(mut self, detail: ImageDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Add a raw API parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Client for chat, completion and vision requests
#[derive(Debug, Clone)]
pub struct ChatGptClient {
    dispatcher: RequestDispatcher,
    defaults: GenerationDefaults,
    session: Session,
    analyzer: Arc<dyn ContentAnalyzer>,
}

impl ChatGptClient {
    /// Create a client over HTTP from settings
    pub fn new(settings: &Settings) -> Result<Self> {
        let transport = HttpTransport::new(&settings.api)?;
        Ok(Self::with_transport(settings, Arc::new(transport)))
    }

    /// Create a client over a custom transport
    pub fn with_transport(settings: &Settings, transport: Arc<dyn Transport>) -> Self {
        Self::with_transport_and_clock(settings, transport, Arc::new(SystemClock))
    }

    pub fn with_transport_and_clock(
        settings: &Settings,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::with_clock(
            settings.rate_limit.requests_per_minute,
            clock,
        ));
        let dispatcher =
            RequestDispatcher::new(transport, rate_limiter, RetryPolicy::from(&settings.retry));

        info!(
            model = %settings.defaults.default_model,
            rate_limit = settings.rate_limit.requests_per_minute,
            retry_attempts = settings.retry.retry_attempts,
            "ChatGPT client created"
        );

        Self {
            dispatcher,
            defaults: settings.defaults.clone(),
            session: Session::from_defaults(&settings.defaults),
            analyzer: Arc::new(KeywordAnalyzer),
        }
    }

    /// Replace the analyzer used by vision responses
    pub fn with_analyzer(mut self, analyzer: Arc<dyn ContentAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Send a single user message
    pub async fn chat(&self, message: &str, options: RequestOptions) -> ChatGptResult<ChatResponse> {
        self.chat_with_history(&[ChatMessage::user(message)], options)
            .await
            .add_context("operation", "chat")
    }

    /// Send a full message history
    pub async fn chat_with_history(
        &self,
        messages: &[ChatMessage],
        options: RequestOptions,
    ) -> ChatGptResult<ChatResponse> {
        let request = ChatCompletionRequest {
            model: self.resolve_model(&options),
            messages: messages.to_vec(),
            temperature: self.resolve_temperature(&options),
            max_tokens: self.resolve_max_tokens(&options),
            top_p: Some(options.top_p.unwrap_or(self.defaults.top_p)),
            frequency_penalty: Some(
                options
                    .frequency_penalty
                    .unwrap_or(self.defaults.frequency_penalty),
            ),
            presence_penalty: Some(
                options
                    .presence_penalty
                    .unwrap_or(self.defaults.presence_penalty),
            ),
            extra: options.extra,
        };
        debug!(model = %request.model, messages = messages.len(), "Sending chat request");

        let raw = self
            .dispatch(Endpoint::ChatCompletions, &request)
            .await
            .add_context("operation", "chat_with_history")?;
        Ok(ChatResponse::from_value(raw))
    }

    /// Legacy text completion
    pub async fn completion(
        &self,
        prompt: &str,
        options: RequestOptions,
    ) -> ChatGptResult<CompletionResponse> {
        let request = CompletionRequest {
            model: self.resolve_model(&options),
            prompt: prompt.to_string(),
            temperature: self.resolve_temperature(&options),
            max_tokens: self.resolve_max_tokens(&options),
            top_p: options.top_p.unwrap_or(self.defaults.top_p),
            frequency_penalty: options
                .frequency_penalty
                .unwrap_or(self.defaults.frequency_penalty),
            presence_penalty: options
                .presence_penalty
                .unwrap_or(self.defaults.presence_penalty),
            extra: options.extra,
        };
        debug!(model = %request.model, "Sending completion request");

        let raw = self
            .dispatch(Endpoint::Completions, &request)
            .await
            .add_context("operation", "completion")?;
        Ok(CompletionResponse::from_value(raw))
    }

    /// Analyse an image by URL (remote or `data:` URL)
    pub async fn vision(
        &self,
        image_url: &str,
        prompt: &str,
        options: RequestOptions,
    ) -> ChatGptResult<VisionResponse> {
        let message = ChatMessage::user_parts(vec![
            ContentPart::text(prompt),
            ContentPart::image(image_url, options.detail.unwrap_or_default()),
        ]);

        let request = ChatCompletionRequest {
            model: options
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            messages: vec![message],
            temperature: self.resolve_temperature(&options),
            max_tokens: self.resolve_max_tokens(&options),
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            extra: options.extra,
        };
        debug!(model = %request.model, "Sending vision request");

        let raw = self
            .dispatch(Endpoint::ChatCompletions, &request)
            .await
            .add_context("operation", "vision")?;
        Ok(VisionResponse::with_analyzer(raw, self.analyzer.clone()))
    }

    /// Analyse base64 image data, with or without a `data:image/` prefix
    pub async fn vision_from_base64(
        &self,
        base64_image: &str,
        prompt: &str,
        options: RequestOptions,
    ) -> ChatGptResult<VisionResponse> {
        let url = to_data_url(base64_image);
        self.vision(&url, prompt, options).await
    }

    pub fn set_model(&mut self, model: impl Into<String>) -> &mut Self {
        self.session.model = model.into();
        self
    }

    /// Set the temperature, clamped to [0.0, 2.0]
    pub fn set_temperature(&mut self, temperature: f64) -> &mut Self {
        self.session.temperature = clamp_temperature(temperature);
        self
    }

    /// Set max tokens, clamped to at least 1
    pub fn set_max_tokens(&mut self, max_tokens: u32) -> &mut Self {
        self.session.max_tokens = clamp_max_tokens(max_tokens);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn available_models(&self) -> &'static [&'static str] {
        &AVAILABLE_MODELS
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.dispatcher.rate_limiter().status()
    }

    pub fn reset_rate_limit(&self) {
        self.dispatcher.rate_limiter().reset()
    }

    fn resolve_model(&self, options: &RequestOptions) -> String {
        options
            .model
            .clone()
            .unwrap_or_else(|| self.session.model.clone())
    }

    fn resolve_temperature(&self, options: &RequestOptions) -> f64 {
        options
            .temperature
            .map(clamp_temperature)
            .unwrap_or(self.session.temperature)
    }

    fn resolve_max_tokens(&self, options: &RequestOptions) -> u32 {
        options
            .max_tokens
            .map(clamp_max_tokens)
            .unwrap_or(self.session.max_tokens)
    }

    async fn dispatch<T: Serialize>(&self, endpoint: Endpoint, request: &T) -> ChatGptResult<Value> {
        let payload = serde_json::to_value(request).map_err(|e| {
            helpers::transport_error(0, None, format!("Failed to encode payload: {}", e))
        })?;
        self.dispatcher.send(endpoint, &payload).await
    }
}

/// Normalize base64 image data into a data URL
pub fn to_data_url(base64_image: &str) -> String {
    if base64_image.starts_with("data:image/") {
        base64_image.to_string()
    } else {
        format!("{}{}", BASE64_JPEG_PREFIX, base64_image)
    }
}
