//! Task suggestion types

use serde::{Deserialize, Serialize};

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 1000;

/// One actionable task extracted from free text, an email, or a calendar
/// event.
///
/// Priority follows the 1..=4 scale of the task model: 1 = urgent,
/// 2 = high, 3 = normal, 4 = none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: u8,
    /// `YYYY-MM-DD`, only when the source names a clear deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

impl SuggestedTask {
    /// Clamp fields to the limits the task model enforces. Returns `None`
    /// when the title is empty, which drops the suggestion.
    pub fn sanitized(title: &str, description: Option<&str>, priority: i64, due_date: Option<&str>) -> Option<Self> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }

        Some(Self {
            title: truncate(title, MAX_TITLE_LEN),
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| truncate(d, MAX_DESCRIPTION_LEN)),
            priority: if (1..=4).contains(&priority) { priority as u8 } else { 4 },
            due_date: due_date.map(str::trim).filter(|d| !d.is_empty()).map(String::from),
        })
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_title_drops_suggestion() {
        assert!(SuggestedTask::sanitized("   ", None, 3, None).is_none());
    }

    #[test]
    fn out_of_range_priority_defaults_to_none() {
        let task = SuggestedTask::sanitized("Reply to Jan", None, 9, None).unwrap();
        assert_eq!(task.priority, 4);
    }

    #[test]
    fn long_title_is_truncated() {
        let long = "x".repeat(500);
        let task = SuggestedTask::sanitized(&long, None, 1, None).unwrap();
        assert_eq!(task.title.chars().count(), 200);
        assert_eq!(task.priority, 1);
    }
}
