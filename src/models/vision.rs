//! Vision response and content analysis
//!
//! A vision response is a chat response whose content describes an image.
//! Entity extraction and safety screening are delegated to a
//! [`ContentAnalyzer`] so the keyword heuristics can be replaced.

use super::response::{
    ChatResponse, HasContent, HasFinishReason, HasUsage, ResponseMeta, ResponseModel,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Entity categories recognised in image descriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityCategory {
    People,
    Objects,
    Colors,
    Emotions,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 4] = [
        EntityCategory::People,
        EntityCategory::Objects,
        EntityCategory::Colors,
        EntityCategory::Emotions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::People => "people",
            EntityCategory::Objects => "objects",
            EntityCategory::Colors => "colors",
            EntityCategory::Emotions => "emotions",
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matched terms per category, each list in first-occurrence order
///
/// Categories without matches are absent.
pub type DetectedEntities = BTreeMap<EntityCategory, Vec<String>>;

/// Strategy for deriving entities and safety flags from response text
pub trait ContentAnalyzer: Send + Sync + fmt::Debug {
    fn detect_entities(&self, content: &str) -> DetectedEntities;

    fn has_safety_concerns(&self, content: &str) -> bool;
}

static KEYWORD_PATTERNS: Lazy<Vec<(EntityCategory, Regex)>> = Lazy::new(|| {
    let pattern = |words: &str| {
        Regex::new(&format!(r"(?i)\b(?:{})\b", words)).expect("keyword pattern is valid")
    };

    vec![
        (
            EntityCategory::People,
            pattern("person|people|man|woman|child|individual|human"),
        ),
        (
            EntityCategory::Objects,
            pattern("car|vehicle|building|tree|animal|dog|cat|bird"),
        ),
        (
            EntityCategory::Colors,
            pattern("red|blue|green|yellow|black|white|brown|gray|grey|purple|orange|pink"),
        ),
        (
            EntityCategory::Emotions,
            pattern("happy|sad|angry|surprised|excited|calm|peaceful|worried|confused"),
        ),
    ]
});

/// Phrases whose presence flags a description as a safety concern
pub const SAFETY_KEYWORDS: [&str; 6] = [
    "inappropriate",
    "unsafe",
    "dangerous",
    "harmful",
    "violence",
    "adult content",
];

/// Fixed keyword lists matched as whole words, case-insensitively
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnalyzer;

impl ContentAnalyzer for KeywordAnalyzer {
    fn detect_entities(&self, content: &str) -> DetectedEntities {
        let mut entities = DetectedEntities::new();

        for (category, regex) in KEYWORD_PATTERNS.iter() {
            let mut terms: Vec<String> = Vec::new();
            for found in regex.find_iter(content) {
                let term = found.as_str();
                if !terms.iter().any(|t| t == term) {
                    terms.push(term.to_string());
                }
            }
            if !terms.is_empty() {
                entities.insert(*category, terms);
            }
        }

        entities
    }

    fn has_safety_concerns(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        SAFETY_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
    }
}

/// First sentence of `content`, trimmed, with a single trailing period
pub fn first_sentence(content: &str) -> String {
    let head = content
        .split(['.', '!', '?'])
        .next()
        .unwrap_or_default()
        .trim();
    format!("{}.", head)
}

/// Image analysis response
#[derive(Debug, Clone)]
pub struct VisionResponse {
    chat: ChatResponse,
    analyzer: Arc<dyn ContentAnalyzer>,
}

impl VisionResponse {
    /// Parse with the default keyword analyzer
    pub fn from_value(raw: Value) -> Self {
        Self::with_analyzer(raw, Arc::new(KeywordAnalyzer))
    }

    pub fn with_analyzer(raw: Value, analyzer: Arc<dyn ContentAnalyzer>) -> Self {
        Self {
            chat: ChatResponse::from_value(raw),
            analyzer,
        }
    }

    /// The underlying chat response
    pub fn as_chat(&self) -> &ChatResponse {
        &self.chat
    }

    pub fn into_chat(self) -> ChatResponse {
        self.chat
    }

    /// Analysis text (same as the content)
    pub fn analysis(&self) -> &str {
        self.chat.content()
    }

    pub fn has_image_analysis(&self) -> bool {
        !self.analysis().is_empty()
    }

    /// The API does not report a confidence score for vision output
    pub fn confidence(&self) -> Option<f64> {
        None
    }

    pub fn role(&self) -> &str {
        self.chat.role()
    }

    pub fn detected_entities(&self) -> DetectedEntities {
        self.analyzer.detect_entities(self.analysis())
    }

    pub fn has_safety_concerns(&self) -> bool {
        self.analyzer.has_safety_concerns(self.analysis())
    }

    pub fn summary(&self) -> String {
        first_sentence(self.analysis())
    }
}

impl HasUsage for VisionResponse {
    fn meta(&self) -> &ResponseMeta {
        self.chat.meta()
    }
}

impl HasContent for VisionResponse {
    fn content(&self) -> &str {
        self.chat.content()
    }
}

impl HasFinishReason for VisionResponse {
    fn finish_reason(&self) -> &str {
        self.chat.finish_reason()
    }
}

impl ResponseModel for VisionResponse {
    fn extra_fields(&self) -> Map<String, Value> {
        let mut map = self.chat.extra_fields();
        map.insert("analysis".to_string(), json!(self.analysis()));
        map.insert("has_image_analysis".to_string(), json!(self.has_image_analysis()));
        map.insert("detected_entities".to_string(), json!(self.detected_entities()));
        map.insert("has_safety_concerns".to_string(), json!(self.has_safety_concerns()));
        map.insert("summary".to_string(), json!(self.summary()));
        map.insert("confidence".to_string(), json!(self.confidence()));
        map
    }
}

impl fmt::Display for VisionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.chat, f)
    }
}
