//! Configuration management module
//!
//! Responsible for loading client configuration from environment variables
//! and configuration files

pub mod file;
pub mod settings;

pub use settings::{
    ApiConfig, GenerationDefaults, LoggingConfig, RateLimitConfig, RetryConfig, Settings,
};
