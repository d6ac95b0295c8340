//! Marketing copy generation from scraped product facts
//!
//! # Architecture
//! - `client` - chat-completion transport ([`CompletionClient`], [`OpenAiClient`])
//! - `generator` - prompt, retry with exponential backoff, response validation

mod client;
mod generator;

pub use client::{
    ChatMessage, ChatRequest, CompletionClient, ModelError, OpenAiClient, ResponseFormat, Role,
};
pub use generator::{CopyGenerator, CopySettings};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// Placeholder for a copy field the model did not supply
pub const NOT_AVAILABLE: &str = "Not available";

pub const PARSE_FAILED: &str = "Failed to parse GPT response";
pub const PROCESSING_FAILED: &str = "Processing failed";
pub const ALL_ATTEMPTS_FAILED: &str = "All attempts failed";

/// The seven marketing fields; every one is always present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCopy {
    pub headline: String,
    pub subheadline: String,
    pub usp: String,
    pub benefits: Vec<String>,
    pub cta: String,
    pub testimonial: String,
    pub urgency: String,
}

impl Default for GeneratedCopy {
    fn default() -> Self {
        Self {
            headline: NOT_AVAILABLE.to_string(),
            subheadline: NOT_AVAILABLE.to_string(),
            usp: NOT_AVAILABLE.to_string(),
            benefits: vec![NOT_AVAILABLE.to_string()],
            cta: NOT_AVAILABLE.to_string(),
            testimonial: NOT_AVAILABLE.to_string(),
            urgency: NOT_AVAILABLE.to_string(),
        }
    }
}

impl GeneratedCopy {
    /// Build from a model's JSON object, filling absent or blank keys with
    /// [`NOT_AVAILABLE`]
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        Self {
            headline: text_field(object, "headline"),
            subheadline: text_field(object, "subheadline"),
            usp: text_field(object, "usp"),
            benefits: list_field(object, "benefits"),
            cta: text_field(object, "cta"),
            testimonial: text_field(object, "testimonial"),
            urgency: text_field(object, "urgency"),
        }
    }

    /// Parse raw model output; anything but a JSON object is a parse failure
    pub fn parse(raw: &str) -> Result<Self, GenerationError> {
        let value: Value =
            serde_json::from_str(raw.trim()).map_err(|e| GenerationError::Parse(e.to_string()))?;
        match value {
            Value::Object(object) => Ok(Self::from_json_object(&object)),
            other => Err(GenerationError::Parse(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn text_field(object: &Map<String, Value>, key: &str) -> String {
    match object.get(key).and_then(scalar_text) {
        Some(text) => text,
        None => {
            warn!("Missing key in model response: {}", key);
            NOT_AVAILABLE.to_string()
        }
    }
}

fn list_field(object: &Map<String, Value>, key: &str) -> Vec<String> {
    let items: Vec<String> = match object.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(other) => scalar_text(other).into_iter().collect(),
        None => Vec::new(),
    };

    if items.is_empty() {
        warn!("Missing key in model response: {}", key);
        vec![NOT_AVAILABLE.to_string()]
    } else {
        items
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Generated copy plus the product fields it was written for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCopy {
    #[serde(flatten)]
    pub copy: GeneratedCopy,
    pub title: String,
    pub price: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Result of a generation run; failure is reported as data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CopyOutcome {
    Generated(ProductCopy),
    Failed { error: String },
}

impl CopyOutcome {
    pub fn error(&self) -> Option<&str> {
        match self {
            CopyOutcome::Failed { error } => Some(error),
            CopyOutcome::Generated(_) => None,
        }
    }

    pub fn copy(&self) -> Option<&ProductCopy> {
        match self {
            CopyOutcome::Generated(copy) => Some(copy),
            CopyOutcome::Failed { .. } => None,
        }
    }
}

/// Why one generation attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("unparseable model response: {0}")]
    Parse(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl GenerationError {
    /// Message reported once attempts are exhausted
    pub fn outcome_message(&self) -> &'static str {
        match self {
            GenerationError::Parse(_) => PARSE_FAILED,
            GenerationError::Model(_) => PROCESSING_FAILED,
        }
    }
}
