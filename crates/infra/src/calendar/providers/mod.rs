//! Vendor calendar gateways
//!
//! One gateway per provider API, both implementing the core
//! [`CalendarGateway`](dayplan_core::CalendarGateway) port.

mod google;
mod microsoft;

use dayplan_domain::{DayplanError, Provider};
pub use google::{GoogleCalendarGateway, GoogleConfig};
pub use microsoft::{MicrosoftCalendarGateway, MicrosoftConfig};
use reqwest::StatusCode;

use crate::http::HttpClient;

/// Create the gateway for `provider` with credentials from the environment.
pub fn create_gateway(
    provider: Provider,
    http: HttpClient,
) -> dayplan_domain::Result<std::sync::Arc<dyn dayplan_core::CalendarGateway>> {
    match provider {
        Provider::Google => {
            Ok(std::sync::Arc::new(GoogleCalendarGateway::new(GoogleConfig::from_env()?, http)))
        }
        Provider::Microsoft => Ok(std::sync::Arc::new(MicrosoftCalendarGateway::new(
            MicrosoftConfig::from_env()?,
            http,
        ))),
    }
}

/// Map a non-success vendor status to the domain error taxonomy.
pub(crate) fn status_error(provider: Provider, status: StatusCode, body: &str) -> DayplanError {
    let message = format!("{provider} API error ({status}): {body}");
    match status.as_u16() {
        401 | 403 => DayplanError::Auth(message),
        404 => DayplanError::NotFound(message),
        // The vendor expired our continuation token; the caller restarts
        // from a full window fetch.
        410 => DayplanError::SyncTokenInvalid(message),
        429 => DayplanError::RateLimited(message),
        400..=499 => DayplanError::InvalidInput(message),
        _ => DayplanError::Network(message),
    }
}
