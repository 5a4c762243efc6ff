//! Prompt construction for task suggestions

use chrono::NaiveDate;

use super::types::EmailSource;

pub const SYSTEM_PROMPT: &str = "You extract actionable tasks from the text a user provides. \
Respond with a JSON array only, no prose. Each element has the shape \
{\"title\": string, \"description\": string or null, \"priority\": 1-4, \
\"dueDate\": \"YYYY-MM-DD\" or null}. Priority 1 is urgent, 4 is none. \
Only set dueDate when the text names a clear deadline. \
Return an empty array when the text contains no actionable tasks.";

/// User message wrapping the source text. The current date anchors relative
/// deadlines like "by Friday".
pub fn user_prompt(input: &str, today: NaiveDate) -> String {
    format!("Today is {today}.\n\nExtract tasks from the following text:\n\n{input}")
}

/// Flatten an email into extraction input, headers first.
pub fn email_source_text(email: &EmailSource) -> String {
    let mut text = format!("From: {}\nSubject: {}\n", email.from, email.subject);
    if let Some(date) = &email.date {
        text.push_str(&format!("Date: {date}\n"));
    }
    text.push('\n');
    text.push_str(&email.body);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_carries_date_and_input() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let prompt = user_prompt("Reply to Jan by Friday", today);
        assert!(prompt.contains("2024-05-01"));
        assert!(prompt.contains("Reply to Jan by Friday"));
    }

    #[test]
    fn email_text_keeps_headers_ahead_of_the_body() {
        let email = EmailSource {
            from: "jan@example.com".to_string(),
            subject: "Q2 invoices".to_string(),
            date: Some("2024-05-01".to_string()),
            body: "Please send the outstanding invoices by Friday.".to_string(),
        };

        let text = email_source_text(&email);
        assert!(text.starts_with("From: jan@example.com\nSubject: Q2 invoices\nDate: 2024-05-01\n"));
        assert!(text.ends_with("Please send the outstanding invoices by Friday."));
    }
}
