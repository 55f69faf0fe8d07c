//! Client configuration settings
//!
//! Defines all configuration structures and environment loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// API connection configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Generation defaults applied to every request
    #[serde(default)]
    pub defaults: GenerationDefaults,
    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,
    /// Local rate limit configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API key
    #[serde(default)]
    pub api_key: String,
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// User-Agent header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Generation parameters used when a call does not override them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationDefaults {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Range: 0.0 to 2.0
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Range: 0.0 to 1.0
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Range: -2.0 to 2.0
    #[serde(default)]
    pub frequency_penalty: f64,
    /// Range: -2.0 to 2.0
    #[serde(default)]
    pub presence_penalty: f64,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay between attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

/// Local rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per minute; 0 means unlimited
    #[serde(default = "default_rate_limit")]
    pub requests_per_minute: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text/json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("chatgpt-client-rs/{}", env!("CARGO_PKG_VERSION"))
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    1.0
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    1
}

fn default_rate_limit() -> u32 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
        }
    }
}

impl RetryConfig {
    /// Delay between attempts
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_rate_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Create a configuration instance from environment variables
    pub fn new() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let settings = Self {
            api: ApiConfig {
                api_key: std::env::var("OPENAI_API_KEY")
                    .context("OPENAI_API_KEY environment variable not set")?,
                base_url: get_env_or_default("OPENAI_BASE_URL", &default_base_url()),
                timeout: get_env_or_default("OPENAI_TIMEOUT", "60")
                    .parse()
                    .context("Invalid timeout value")?,
                user_agent: get_env_or_default("OPENAI_USER_AGENT", &default_user_agent()),
            },
            defaults: GenerationDefaults {
                default_model: get_env_or_default("OPENAI_DEFAULT_MODEL", &default_model()),
                max_tokens: get_env_or_default("OPENAI_MAX_TOKENS", "1000")
                    .parse()
                    .context("Invalid max tokens value")?,
                temperature: get_env_or_default("OPENAI_TEMPERATURE", "0.7")
                    .parse()
                    .context("Invalid temperature value")?,
                top_p: get_env_or_default("OPENAI_TOP_P", "1.0")
                    .parse()
                    .context("Invalid top_p value")?,
                frequency_penalty: get_env_or_default("OPENAI_FREQUENCY_PENALTY", "0.0")
                    .parse()
                    .context("Invalid frequency penalty value")?,
                presence_penalty: get_env_or_default("OPENAI_PRESENCE_PENALTY", "0.0")
                    .parse()
                    .context("Invalid presence penalty value")?,
            },
            retry: RetryConfig {
                retry_attempts: get_env_or_default("OPENAI_RETRY_ATTEMPTS", "2")
                    .parse()
                    .context("Invalid retry attempts value")?,
                retry_delay: get_env_or_default("OPENAI_RETRY_DELAY", "1")
                    .parse()
                    .context("Invalid retry delay value")?,
            },
            rate_limit: RateLimitConfig {
                requests_per_minute: get_env_or_default("OPENAI_RATE_LIMIT", "60")
                    .parse()
                    .context("Invalid rate limit value")?,
            },
            logging: LoggingConfig {
                level: get_env_or_default("RUST_LOG", "info"),
                format: get_env_or_default("LOG_FORMAT", "text"),
            },
        };

        // Validate configuration
        settings.validate()?;

        Ok(settings)
    }

    /// Create default settings carrying the given API key
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        let mut settings = Self::default();
        settings.api.api_key = api_key.into();
        settings
    }

    /// Validate configuration validity
    pub fn validate(&self) -> Result<()> {
        if self.api.api_key.is_empty() {
            anyhow::bail!("OpenAI API key cannot be empty");
        }

        if self.api.api_key.contains(char::is_whitespace) {
            anyhow::bail!("OpenAI API key cannot contain whitespace characters");
        }

        if !self.api.base_url.starts_with("http") {
            anyhow::bail!("Invalid OpenAI base URL format, should start with 'http'");
        }

        if self.api.timeout == 0 {
            anyhow::bail!("Timeout value cannot be 0");
        }

        if self.defaults.default_model.is_empty() {
            anyhow::bail!("Default model cannot be empty");
        }

        if self.defaults.max_tokens == 0 {
            anyhow::bail!("Max tokens must be at least 1");
        }

        if !(0.0..=2.0).contains(&self.defaults.temperature) {
            anyhow::bail!("Temperature must be between 0.0 and 2.0: {}", self.defaults.temperature);
        }

        if !(0.0..=1.0).contains(&self.defaults.top_p) {
            anyhow::bail!("top_p must be between 0.0 and 1.0: {}", self.defaults.top_p);
        }

        for (name, value) in [
            ("Frequency penalty", self.defaults.frequency_penalty),
            ("Presence penalty", self.defaults.presence_penalty),
        ] {
            if !(-2.0..=2.0).contains(&value) {
                anyhow::bail!("{} must be between -2.0 and 2.0: {}", name, value);
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        Ok(())
    }

    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout)
    }
}

/// Get environment variable or default value
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
