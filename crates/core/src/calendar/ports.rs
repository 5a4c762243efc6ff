//! Port interfaces for calendar synchronization
//!
//! These traits define the boundaries between core business logic
//! and infrastructure implementations.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use dayplan_domain::{
    CalendarEventRecord, IntegrationRecord, Provider, Result, StoreChange,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::window::SyncWindow;

/// Raw calendar event as reported by a provider API, before mapping.
///
/// Gateways normalise vendor payloads into this shape; the mapper turns it
/// into a [`CalendarEventRecord`] or a tombstone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCalendarEvent {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: RawEventTime,
    pub end: RawEventTime,
    /// Vendor reported the event as cancelled/removed.
    pub cancelled: bool,
    /// Vendor palette id ("1".."11" for Google).
    pub color_id: Option<String>,
    pub calendar_id: String,
    pub calendar_name: String,
    /// Calendar-level colour, used when the event carries no palette id.
    pub calendar_color: Option<String>,
    pub recurring_event_id: Option<String>,
    pub html_link: Option<String>,
}

/// Vendor event boundary: date-only for all-day spans, RFC 3339 otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawEventTime {
    Date(String),
    DateTime(String),
    Missing,
}

impl RawEventTime {
    pub fn is_date_only(&self) -> bool {
        matches!(self, Self::Date(_))
    }
}

/// One page of a provider event feed.
#[derive(Debug, Clone)]
pub struct EventPage {
    pub events: Vec<RawCalendarEvent>,
    pub next_page_token: Option<String>,
    /// Continuation token for the next incremental sync; only present on
    /// the final page of a feed.
    pub next_sync_token: Option<String>,
}

/// Where a fetch starts: an incremental token or a bounded time window.
#[derive(Debug, Clone)]
pub enum Cursor {
    SyncToken(String),
    Window { time_min: DateTime<Utc>, time_max: DateTime<Utc> },
}

/// Query for one page of the event feed.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub calendar_id: String,
    pub cursor: Cursor,
    pub page_token: Option<String>,
}

impl EventQuery {
    pub fn initial(cursor: Cursor) -> Self {
        Self { calendar_id: "primary".to_string(), cursor, page_token: None }
    }

    pub fn next_page(&self, page_token: String) -> Self {
        Self { page_token: Some(page_token), ..self.clone() }
    }
}

/// Refreshed access token returned by a provider token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRefresh {
    pub access_token: String,
    pub expires_in: i64,
}

/// Fields for creating or updating a vendor event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub is_all_day: bool,
    pub start_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_date: NaiveDate,
    pub end_time: Option<NaiveTime>,
}

/// Trait for provider calendar APIs (Google Calendar, Microsoft Graph).
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    fn provider(&self) -> Provider;

    /// Fetch one page of events for the given cursor.
    async fn fetch_page(&self, access_token: &str, query: &EventQuery) -> Result<EventPage>;

    /// Exchange a refresh token for a fresh access token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRefresh>;

    /// Create an event on the vendor calendar, returning the stored shape.
    async fn create_event(&self, access_token: &str, draft: &EventDraft)
        -> Result<RawCalendarEvent>;

    /// Update an existing vendor event.
    async fn update_event(
        &self,
        access_token: &str,
        external_id: &str,
        draft: &EventDraft,
    ) -> Result<RawCalendarEvent>;

    /// Delete a vendor event.
    async fn delete_event(&self, access_token: &str, external_id: &str) -> Result<()>;
}

/// Trait for persisting synced calendar events.
#[async_trait]
pub trait CalendarEventStore: Send + Sync {
    /// Insert-or-update keyed by `(external_id, provider, user_id)`.
    async fn upsert_event(&self, record: CalendarEventRecord) -> Result<()>;

    /// Remove a previously-synced event. Returns whether a row existed.
    async fn delete_event(
        &self,
        user_id: &str,
        provider: Provider,
        external_id: &str,
    ) -> Result<bool>;

    /// Replace every event of `(user_id, provider)` inside the window with
    /// `records`, atomically.
    async fn replace_window(
        &self,
        user_id: &str,
        provider: Provider,
        window: &SyncWindow,
        records: Vec<CalendarEventRecord>,
    ) -> Result<usize>;

    /// Events overlapping the inclusive date range, ordered by start.
    async fn events_in_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CalendarEventRecord>>;

    /// Events visible on a single day.
    async fn events_for_day(&self, user_id: &str, day: NaiveDate)
        -> Result<Vec<CalendarEventRecord>>;

    /// Subscribe to committed-write notifications (reactive read path).
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Trait for persisting integration credentials and sync cursors.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn get(&self, user_id: &str, provider: Provider) -> Result<IntegrationRecord>;

    async fn upsert(&self, record: IntegrationRecord) -> Result<()>;

    /// Store a refreshed access token (and rotated refresh token, if any).
    async fn update_tokens(
        &self,
        user_id: &str,
        provider: Provider,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Persist the continuation token after a successful sync.
    async fn set_sync_token(&self, user_id: &str, provider: Provider, token: &str) -> Result<()>;

    /// Drop the continuation token (vendor reported it expired).
    async fn clear_sync_token(&self, user_id: &str, provider: Provider) -> Result<()>;
}
