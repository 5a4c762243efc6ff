//! Task suggestion endpoint

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use dayplan_domain::{DayplanError, SuggestedTask};
use dayplan_infra::EmailSource;
use serde::Deserialize;

use crate::routes::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/suggestions", post(suggest_tasks))
}

#[derive(Deserialize)]
struct SuggestionRequest {
    text: Option<String>,
    email: Option<EmailSource>,
}

/// POST /suggestions - extract actionable tasks from free text or an email
///
/// A reply the model mangles yields an empty array, not an error.
async fn suggest_tasks(
    State(state): State<AppState>,
    Json(req): Json<SuggestionRequest>,
) -> Result<Json<Vec<SuggestedTask>>, ApiError> {
    let client = state.suggestions.as_ref().ok_or_else(|| {
        ApiError(DayplanError::Config("no suggestion API key configured".to_string()))
    })?;

    let tasks = match (&req.text, &req.email) {
        (Some(text), _) => client.suggest_tasks(text).await?,
        (None, Some(email)) => client.suggest_tasks_from_email(email).await?,
        (None, None) => {
            return Err(ApiError(DayplanError::InvalidInput(
                "request needs a text or email field".to_string(),
            )))
        }
    };

    Ok(Json(tasks))
}
