//! Local event read endpoints and write-through vendor mutations

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use dayplan_core::EventDraft;
use dayplan_domain::{CalendarEventRecord, Provider};
use serde::Deserialize;

use crate::routes::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route("/events/{external_id}", put(update_event).delete(delete_event))
        .route("/events/day/{date}", get(events_for_day))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeQuery {
    user_id: String,
    from: NaiveDate,
    to: NaiveDate,
}

/// GET /events?userId=&from=&to= - events overlapping the inclusive range
async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<CalendarEventRecord>>, ApiError> {
    let events =
        state.service.event_store().events_in_range(&query.user_id, query.from, query.to).await?;
    Ok(Json(events))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: String,
}

/// GET /events/day/:date?userId= - events visible on a single day
async fn events_for_day(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<CalendarEventRecord>>, ApiError> {
    let events = state.service.event_store().events_for_day(&query.user_id, date).await?;
    Ok(Json(events))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventMutationRequest {
    user_id: String,
    provider: Provider,
    event: EventDraft,
}

/// POST /events - create on the vendor calendar, then store the mapped copy
async fn create_event(
    State(state): State<AppState>,
    Json(req): Json<EventMutationRequest>,
) -> Result<(StatusCode, Json<CalendarEventRecord>), ApiError> {
    let record = state.service.create_event(&req.user_id, req.provider, &req.event).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /events/:external_id - update the vendor event
async fn update_event(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
    Json(req): Json<EventMutationRequest>,
) -> Result<Json<CalendarEventRecord>, ApiError> {
    let record =
        state.service.update_event(&req.user_id, req.provider, &external_id, &req.event).await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteQuery {
    user_id: String,
    provider: Provider,
}

/// DELETE /events/:external_id?userId=&provider=
async fn delete_event(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_event(&query.user_id, query.provider, &external_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
