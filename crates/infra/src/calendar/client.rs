//! Calendar client with token management
//!
//! Wraps a provider gateway and the integration store so callers always
//! operate with a live access token.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dayplan_core::{CalendarGateway, IntegrationStore};
use dayplan_domain::{DayplanError, Provider, Result};
use tracing::debug;

/// Provider gateway plus credential refresh.
#[derive(Clone)]
pub struct CalendarClient {
    gateway: Arc<dyn CalendarGateway>,
    integrations: Arc<dyn IntegrationStore>,
}

impl CalendarClient {
    pub fn new(gateway: Arc<dyn CalendarGateway>, integrations: Arc<dyn IntegrationStore>) -> Self {
        Self { gateway, integrations }
    }

    pub fn provider(&self) -> Provider {
        self.gateway.provider()
    }

    pub fn gateway(&self) -> &Arc<dyn CalendarGateway> {
        &self.gateway
    }

    /// Return a usable access token for `user_id`, refreshing and persisting
    /// it first when the stored one has expired.
    pub async fn ensure_access_token(&self, user_id: &str) -> Result<String> {
        let provider = self.gateway.provider();
        let integration = self.integrations.get(user_id, provider).await?;

        if !integration.is_expired(Utc::now()) {
            return Ok(integration.access_token);
        }

        let Some(refresh_token) = integration.refresh_token.as_deref() else {
            return Err(DayplanError::Auth(format!(
                "{provider} access token expired for user {user_id} and no refresh token is stored"
            )));
        };

        debug!(user_id, %provider, "access token expired, refreshing");

        let refreshed = self.gateway.refresh_token(refresh_token).await?;
        let expires_at = Utc::now() + Duration::seconds(refreshed.expires_in);

        self.integrations
            .update_tokens(user_id, provider, &refreshed.access_token, None, Some(expires_at))
            .await?;

        Ok(refreshed.access_token)
    }
}
