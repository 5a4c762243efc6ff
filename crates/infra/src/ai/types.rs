//! Anthropic Messages API request/response types

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(default)]
    pub text: String,
}

/// An email handed over for task extraction. Headers give the model context
/// the body alone lacks (sender, thread subject, when it arrived).
#[derive(Debug, Clone, Deserialize)]
pub struct EmailSource {
    pub from: String,
    pub subject: String,
    pub date: Option<String>,
    pub body: String,
}

/// One suggestion as the model emits it, before sanitization. Every field is
/// optional; sanitization decides what survives.
#[derive(Debug, Deserialize)]
pub struct RawSuggestion {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    #[serde(rename = "dueDate", alias = "due_date")]
    pub due_date: Option<String>,
}
