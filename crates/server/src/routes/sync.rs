//! Integration registration and on-demand sync triggers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use dayplan_domain::{IntegrationRecord, Provider, SyncOutcome};
use serde::Deserialize;

use crate::routes::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/integrations", post(upsert_integration))
        .route("/integrations/{provider}/sync", post(trigger_sync))
}

/// POST /integrations - store (or replace) a user's provider credentials
async fn upsert_integration(
    State(state): State<AppState>,
    Json(record): Json<IntegrationRecord>,
) -> Result<StatusCode, ApiError> {
    state.service.integration_store().upsert(record).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncQuery {
    user_id: String,
}

/// POST /integrations/:provider/sync?userId= - run one sync cycle now
///
/// A concurrent trigger for the same user and provider waits for the
/// in-flight cycle instead of running a second one.
async fn trigger_sync(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncOutcome>, ApiError> {
    let provider: Provider = provider.parse()?;
    let outcome = state.service.sync(&query.user_id, provider).await?;
    Ok(Json(outcome))
}
