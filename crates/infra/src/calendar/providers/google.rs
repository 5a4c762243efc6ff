//! Google Calendar gateway

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use dayplan_core::{
    CalendarGateway, Cursor, EventDraft, EventPage, EventQuery, RawCalendarEvent, RawEventTime,
    TokenRefresh,
};
use dayplan_domain::{DayplanError, Provider, Result};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::status_error;
use crate::errors::InfraError;
use crate::http::HttpClient;

const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google gateway configuration. `api_base` and `token_url` are overridable
/// so tests can point at a mock server.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub token_url: String,
}

impl GoogleConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base: GOOGLE_CALENDAR_API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GOOGLE_CALENDAR_CLIENT_ID")
            .map_err(|_| DayplanError::Auth("GOOGLE_CALENDAR_CLIENT_ID not set".into()))?;
        let client_secret = std::env::var("GOOGLE_CALENDAR_CLIENT_SECRET")
            .map_err(|_| DayplanError::Auth("GOOGLE_CALENDAR_CLIENT_SECRET not set".into()))?;
        Ok(Self::new(client_id, client_secret))
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

#[derive(Debug, Clone)]
struct CalendarMeta {
    name: String,
    color: Option<String>,
}

/// Google Calendar gateway.
pub struct GoogleCalendarGateway {
    config: GoogleConfig,
    http: HttpClient,
    // Calendar names/colours change rarely; cache them per calendar id.
    calendar_meta: Mutex<HashMap<String, CalendarMeta>>,
}

impl GoogleCalendarGateway {
    pub fn new(config: GoogleConfig, http: HttpClient) -> Self {
        Self { config, http, calendar_meta: Mutex::new(HashMap::new()) }
    }

    /// Calendar display name and background colour from the calendarList
    /// entry. Falls back to the bare id when the lookup fails; event sync
    /// never depends on it.
    async fn calendar_meta(&self, access_token: &str, calendar_id: &str) -> CalendarMeta {
        if let Some(meta) = self.calendar_meta.lock().await.get(calendar_id) {
            return meta.clone();
        }

        let url = format!("{}/users/me/calendarList/{}", self.config.api_base, calendar_id);
        let meta = match self.fetch_calendar_entry(access_token, &url).await {
            Ok(entry) => CalendarMeta {
                name: entry.summary.unwrap_or_else(|| calendar_id.to_string()),
                color: entry.background_color,
            },
            Err(e) => {
                warn!(calendar_id, error = %e, "calendar metadata lookup failed");
                CalendarMeta { name: calendar_id.to_string(), color: None }
            }
        };

        self.calendar_meta.lock().await.insert(calendar_id.to_string(), meta.clone());
        meta
    }

    async fn fetch_calendar_entry(
        &self,
        access_token: &str,
        url: &str,
    ) -> Result<GoogleCalendarListEntry> {
        let response =
            self.http.send(self.http.request(Method::GET, url).bearer_auth(access_token)).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(Provider::Google, status, &body));
        }

        response.json().await.map_err(|e| DayplanError::from(InfraError::from(e)))
    }

    fn query_params(query: &EventQuery) -> Vec<(&'static str, String)> {
        let mut params = match &query.cursor {
            Cursor::SyncToken(token) => vec![("syncToken", token.clone())],
            Cursor::Window { time_min, time_max } => vec![
                // Recurring series are expanded into single instances.
                ("singleEvents", "true".to_string()),
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("timeZone", "UTC".to_string()),
            ],
        };

        if let Some(ref token) = query.page_token {
            params.push(("pageToken", token.clone()));
        }

        params
    }

    fn map_event(
        event: GoogleCalendarEvent,
        calendar_id: &str,
        meta: &CalendarMeta,
    ) -> RawCalendarEvent {
        let cancelled = event.status.as_deref() == Some("cancelled");

        RawCalendarEvent {
            id: event.id,
            title: event.summary,
            description: event.description,
            location: event.location,
            start: raw_time(event.start),
            end: raw_time(event.end),
            cancelled,
            color_id: event.color_id,
            calendar_id: calendar_id.to_string(),
            calendar_name: meta.name.clone(),
            calendar_color: meta.color.clone(),
            recurring_event_id: event.recurring_event_id,
            html_link: event.html_link,
        }
    }

    /// Event create/update payload. All-day spans go out with the vendor's
    /// exclusive end date (inclusive local end plus one day).
    fn event_payload(draft: &EventDraft) -> serde_json::Value {
        let (start, end) = if draft.is_all_day {
            let exclusive_end = draft.end_date + Duration::days(1);
            (
                json!({ "date": draft.start_date.to_string() }),
                json!({ "date": exclusive_end.to_string() }),
            )
        } else {
            let start_time = draft.start_time.unwrap_or(chrono::NaiveTime::MIN);
            let end_time = draft.end_time.unwrap_or(start_time);
            (
                json!({
                    "dateTime": draft.start_date.and_time(start_time).and_utc().to_rfc3339(),
                    "timeZone": "UTC",
                }),
                json!({
                    "dateTime": draft.end_date.and_time(end_time).and_utc().to_rfc3339(),
                    "timeZone": "UTC",
                }),
            )
        };

        json!({
            "summary": draft.title,
            "description": draft.description,
            "location": draft.location,
            "start": start,
            "end": end,
        })
    }

    async fn send_event_request(
        &self,
        access_token: &str,
        method: Method,
        url: String,
        draft: &EventDraft,
    ) -> Result<RawCalendarEvent> {
        let response = self
            .http
            .send(
                self.http
                    .request(method, &url)
                    .bearer_auth(access_token)
                    .json(&Self::event_payload(draft)),
            )
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(Provider::Google, status, &body));
        }

        let event: GoogleCalendarEvent =
            response.json().await.map_err(|e| DayplanError::from(InfraError::from(e)))?;
        let meta = self.calendar_meta(access_token, "primary").await;
        Ok(Self::map_event(event, "primary", &meta))
    }
}

#[async_trait]
impl CalendarGateway for GoogleCalendarGateway {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn fetch_page(&self, access_token: &str, query: &EventQuery) -> Result<EventPage> {
        let url = format!("{}/calendars/{}/events", self.config.api_base, query.calendar_id);
        let params = Self::query_params(query);

        debug!(calendar_id = %query.calendar_id, "fetching Google events page");

        let response = self
            .http
            .send(self.http.request(Method::GET, &url).bearer_auth(access_token).query(&params))
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(Provider::Google, status, &body));
        }

        let page: GoogleEventsResponse =
            response.json().await.map_err(|e| DayplanError::from(InfraError::from(e)))?;

        let meta = self.calendar_meta(access_token, &query.calendar_id).await;
        let events = page
            .items
            .into_iter()
            .map(|event| Self::map_event(event, &query.calendar_id, &meta))
            .collect();

        Ok(EventPage {
            events,
            next_page_token: page.next_page_token,
            next_sync_token: page.next_sync_token,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRefresh> {
        let response = self
            .http
            .send(self.http.request(Method::POST, &self.config.token_url).form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ]))
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DayplanError::Auth(format!("Google token refresh failed ({status}): {body}")));
        }

        let refreshed: GoogleTokenResponse =
            response.json().await.map_err(|e| DayplanError::from(InfraError::from(e)))?;

        Ok(TokenRefresh {
            access_token: refreshed.access_token,
            expires_in: refreshed.expires_in,
        })
    }

    async fn create_event(
        &self,
        access_token: &str,
        draft: &EventDraft,
    ) -> Result<RawCalendarEvent> {
        let url = format!("{}/calendars/primary/events", self.config.api_base);
        self.send_event_request(access_token, Method::POST, url, draft).await
    }

    async fn update_event(
        &self,
        access_token: &str,
        external_id: &str,
        draft: &EventDraft,
    ) -> Result<RawCalendarEvent> {
        let url = format!("{}/calendars/primary/events/{}", self.config.api_base, external_id);
        self.send_event_request(access_token, Method::PUT, url, draft).await
    }

    async fn delete_event(&self, access_token: &str, external_id: &str) -> Result<()> {
        let url = format!("{}/calendars/primary/events/{}", self.config.api_base, external_id);

        let response = self
            .http
            .send(self.http.request(Method::DELETE, &url).bearer_auth(access_token))
            .await?;

        let status = response.status();
        // Deleting an already-gone event is a no-op.
        if status.is_success() || status.as_u16() == 404 || status.as_u16() == 410 {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(Provider::Google, status, &body))
    }
}

fn raw_time(value: Option<GoogleEventTime>) -> RawEventTime {
    match value {
        Some(GoogleEventTime { date: Some(date), .. }) => RawEventTime::Date(date),
        Some(GoogleEventTime { date_time: Some(date_time), .. }) => {
            RawEventTime::DateTime(date_time)
        }
        _ => RawEventTime::Missing,
    }
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarEvent>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(rename = "nextSyncToken")]
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<GoogleEventTime>,
    end: Option<GoogleEventTime>,
    #[serde(rename = "colorId")]
    color_id: Option<String>,
    #[serde(rename = "recurringEventId")]
    recurring_event_id: Option<String>,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventTime {
    date: Option<String>,
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarListEntry {
    summary: Option<String>,
    #[serde(rename = "backgroundColor")]
    background_color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
}
