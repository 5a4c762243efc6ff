pub mod events;
pub mod suggestions;
pub mod sync;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use dayplan_domain::DayplanError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(events::router())
        .merge(sync::router())
        .merge(suggestions::router())
}

/// Convert domain errors to HTTP responses.
///
/// The body is the serialized error (`{"type": ..., "message": ...}`), so
/// clients can branch on the taxonomy without parsing messages.
pub struct ApiError(pub DayplanError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DayplanError::Auth(_) => StatusCode::UNAUTHORIZED,
            DayplanError::NotFound(_) => StatusCode::NOT_FOUND,
            DayplanError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DayplanError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            DayplanError::Network(_) | DayplanError::SyncTokenInvalid(_) => StatusCode::BAD_GATEWAY,
            DayplanError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            DayplanError::Database(_) | DayplanError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(self.0)).into_response()
    }
}

impl From<DayplanError> for ApiError {
    fn from(err: DayplanError) -> Self {
        Self(err)
    }
}
