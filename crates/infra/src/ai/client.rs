//! Anthropic Messages API client for task suggestions

use chrono::Utc;
use dayplan_domain::{DayplanError, Result, SuggestedTask};
use reqwest::Method;
use tracing::{debug, info, warn};

use super::prompts::{email_source_text, user_prompt, SYSTEM_PROMPT};
use super::types::{EmailSource, Message, MessagesRequest, MessagesResponse, RawSuggestion};
use crate::errors::InfraError;
use crate::http::HttpClient;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// LLM client that turns free text into sanitized task suggestions.
///
/// A malformed model response is treated as "no suggestions", never as a
/// failure; only transport and API errors propagate.
pub struct SuggestionClient {
    http: HttpClient,
    api_key: String,
    model: String,
    api_url: String,
}

impl SuggestionClient {
    pub fn new(api_key: String, model: String, http: HttpClient) -> Self {
        Self { http, api_key, model, api_url: ANTHROPIC_API_URL.to_string() }
    }

    #[cfg(test)]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Extract actionable tasks from an email's headers and body.
    pub async fn suggest_tasks_from_email(&self, email: &EmailSource) -> Result<Vec<SuggestedTask>> {
        self.suggest_tasks(&email_source_text(email)).await
    }

    /// Extract actionable tasks from `input`.
    pub async fn suggest_tasks(&self, input: &str) -> Result<Vec<SuggestedTask>> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Vec::new());
        }

        info!(input_chars = input.len(), "requesting task suggestions");

        let payload = MessagesRequest {
            model: self.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user",
                content: user_prompt(input, Utc::now().date_naive()),
            }],
        };

        let response = self
            .http
            .send(
                self.http
                    .request(Method::POST, &self.api_url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&payload),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => DayplanError::Auth(format!("suggestion API rejected key ({status})")),
                429 => DayplanError::RateLimited(format!("suggestion API throttled: {body}")),
                _ => DayplanError::Network(format!("suggestion API error ({status}): {body}")),
            });
        }

        let parsed: MessagesResponse =
            response.json().await.map_err(|e| DayplanError::from(InfraError::from(e)))?;

        let text: String = parsed.content.into_iter().map(|block| block.text).collect();
        Ok(parse_suggestions(&text))
    }
}

/// Parse the model's reply into suggestions. The reply may wrap the array in
/// prose or code fences; only the first array is considered.
fn parse_suggestions(text: &str) -> Vec<SuggestedTask> {
    let Some(array) = extract_json_array(text) else {
        warn!("model reply contained no JSON array");
        return Vec::new();
    };

    let raw: Vec<RawSuggestion> = match serde_json::from_str(array) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "model reply was not a valid suggestion array");
            return Vec::new();
        }
    };

    let suggestions: Vec<SuggestedTask> = raw
        .into_iter()
        .filter_map(|s| {
            SuggestedTask::sanitized(
                s.title.as_deref().unwrap_or_default(),
                s.description.as_deref(),
                s.priority.unwrap_or(4),
                s.due_date.as_deref(),
            )
        })
        .collect();

    debug!(count = suggestions.len(), "parsed task suggestions");
    suggestions
}

/// Slice from the first `[` to the last `]`, the span the array must occupy.
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
