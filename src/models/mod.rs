//! Data models module
//!
//! Request payload structures and the typed response hierarchy

pub mod openai;
pub mod response;
pub mod vision;

pub use openai::{
    ApiErrorResponse, ChatCompletionRequest, ChatMessage, CompletionRequest, ContentPart,
    ImageDetail, ImageUrl, MessageContent, Role,
};
pub use response::{
    ChatResponse, CompletionResponse, HasContent, HasFinishReason, HasUsage, ResponseMeta,
    ResponseModel, Usage,
};
pub use vision::{
    ContentAnalyzer, DetectedEntities, EntityCategory, KeywordAnalyzer, VisionResponse,
};
