//! ChatGPT Client Library
//!
//! Sends chat, legacy completion and vision requests to an OpenAI-compatible
//! API with local rate limiting and retries, and wraps the replies in typed
//! response models

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

// Re-export common types
pub use config::Settings;
pub use models::{
    ChatMessage, ChatResponse, CompletionResponse, HasContent, HasFinishReason, HasUsage,
    ResponseModel, VisionResponse,
};
pub use services::{ChatGptClient, RateLimitStatus, RequestOptions};
pub use utils::error::{ChatGptError, ChatGptResult};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get version information
pub fn version_info() -> String {
    format!("{} v{} - {}", NAME, VERSION, DESCRIPTION)
}
