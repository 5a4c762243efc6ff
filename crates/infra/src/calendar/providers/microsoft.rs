//! Microsoft Graph calendar gateway

use async_trait::async_trait;
use chrono::Duration;
use dayplan_core::{
    CalendarGateway, Cursor, EventDraft, EventPage, EventQuery, RawCalendarEvent, RawEventTime,
    TokenRefresh,
};
use dayplan_domain::{DayplanError, Provider, Result};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::{form_urlencoded, Url};

use super::status_error;
use crate::errors::InfraError;
use crate::http::HttpClient;

const MICROSOFT_GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const OUTLOOK_TIMEZONE_HEADER: &str = r#"outlook.timezone="UTC""#;
const OUTLOOK_MAX_PAGE_SIZE_HEADER: &str = "odata.maxpagesize=50";

/// Microsoft gateway configuration, overridable for tests.
#[derive(Debug, Clone)]
pub struct MicrosoftConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub token_url: String,
}

impl MicrosoftConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base: MICROSOFT_GRAPH_API_BASE.to_string(),
            token_url: MICROSOFT_TOKEN_URL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("MICROSOFT_CALENDAR_CLIENT_ID")
            .map_err(|_| DayplanError::Auth("MICROSOFT_CALENDAR_CLIENT_ID not set".into()))?;
        let client_secret = std::env::var("MICROSOFT_CALENDAR_CLIENT_SECRET")
            .map_err(|_| DayplanError::Auth("MICROSOFT_CALENDAR_CLIENT_SECRET not set".into()))?;
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

/// Microsoft Graph gateway. Incremental state is a delta link; pagination is
/// a next link. Both are full URLs handed back by Graph.
pub struct MicrosoftCalendarGateway {
    config: MicrosoftConfig,
    http: HttpClient,
}

impl MicrosoftCalendarGateway {
    pub fn new(config: MicrosoftConfig, http: HttpClient) -> Self {
        Self { config, http }
    }

    fn delta_url(&self, calendar_id: &str) -> String {
        if calendar_id.eq_ignore_ascii_case("primary") {
            format!("{}/me/calendarView/delta", self.config.api_base)
        } else {
            format!("{}/me/calendars/{}/calendarView/delta", self.config.api_base, calendar_id)
        }
    }

    /// Graph hands out nextLink/deltaLink as absolute URLs pointing at its
    /// own host. Keep only the query and reissue against the configured base
    /// so overridden bases (tests) keep working.
    fn continuation_params(token: &str) -> Result<Vec<(String, String)>> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(DayplanError::InvalidInput("empty Microsoft continuation token".into()));
        }

        let query = if let Ok(url) = Url::parse(trimmed) {
            url.query().map(str::to_string)
        } else {
            trimmed.find('?').map(|idx| trimmed[idx + 1..].to_string())
        };

        let Some(query) = query else {
            // Bare token value, not a link.
            return Ok(vec![("$deltatoken".to_string(), trimmed.to_string())]);
        };

        let params: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .filter(|(key, _)| {
                matches!(
                    key.as_ref(),
                    "$deltatoken" | "$skiptoken" | "startDateTime" | "endDateTime" | "$top"
                )
            })
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if params.is_empty() {
            return Err(DayplanError::InvalidInput(
                "Microsoft continuation token contained no supported parameters".into(),
            ));
        }

        Ok(params)
    }

    fn page_request(&self, access_token: &str, query: &EventQuery) -> Result<RequestBuilder> {
        let url = self.delta_url(&query.calendar_id);

        let params: Vec<(String, String)> = if let Some(ref page_token) = query.page_token {
            Self::continuation_params(page_token)?
        } else {
            match &query.cursor {
                Cursor::SyncToken(token) => Self::continuation_params(token)?,
                Cursor::Window { time_min, time_max } => vec![
                    ("startDateTime".to_string(), time_min.to_rfc3339()),
                    ("endDateTime".to_string(), time_max.to_rfc3339()),
                ],
            }
        };

        Ok(self
            .http
            .request(Method::GET, &url)
            .bearer_auth(access_token)
            .header("Prefer", OUTLOOK_TIMEZONE_HEADER)
            .header("Prefer", OUTLOOK_MAX_PAGE_SIZE_HEADER)
            .query(&params))
    }

    fn map_event(event: MicrosoftCalendarEvent, calendar_id: &str) -> RawCalendarEvent {
        let cancelled = event.removed.is_some();
        let (start, end) = if event.is_all_day {
            (all_day_time(event.start), all_day_time(event.end))
        } else {
            (timed_time(event.start), timed_time(event.end))
        };

        RawCalendarEvent {
            id: event.id,
            title: event.subject,
            description: event.body_preview,
            location: event.location.and_then(|l| l.display_name),
            start,
            end,
            cancelled,
            // Graph has no per-event palette id.
            color_id: None,
            calendar_id: calendar_id.to_string(),
            calendar_name: calendar_id.to_string(),
            calendar_color: None,
            recurring_event_id: event.series_master_id,
            html_link: event.web_link,
        }
    }

    /// Event create/update payload. All-day events need midnight boundaries
    /// and the exclusive end date Graph expects.
    fn event_payload(draft: &EventDraft) -> serde_json::Value {
        let (start, end) = if draft.is_all_day {
            let exclusive_end = draft.end_date + Duration::days(1);
            (
                json!({ "dateTime": format!("{}T00:00:00", draft.start_date), "timeZone": "UTC" }),
                json!({ "dateTime": format!("{exclusive_end}T00:00:00"), "timeZone": "UTC" }),
            )
        } else {
            let start_time = draft.start_time.unwrap_or(chrono::NaiveTime::MIN);
            let end_time = draft.end_time.unwrap_or(start_time);
            (
                json!({
                    "dateTime": format!("{}T{}", draft.start_date, start_time),
                    "timeZone": "UTC",
                }),
                json!({
                    "dateTime": format!("{}T{}", draft.end_date, end_time),
                    "timeZone": "UTC",
                }),
            )
        };

        json!({
            "subject": draft.title,
            "body": {
                "contentType": "text",
                "content": draft.description.clone().unwrap_or_default(),
            },
            "location": { "displayName": draft.location.clone().unwrap_or_default() },
            "isAllDay": draft.is_all_day,
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
                    .header("Prefer", OUTLOOK_TIMEZONE_HEADER)
                    .json(&Self::event_payload(draft)),
            )
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(Provider::Microsoft, status, &body));
        }

        let event: MicrosoftCalendarEvent =
            response.json().await.map_err(|e| DayplanError::from(InfraError::from(e)))?;
        Ok(Self::map_event(event, "primary"))
    }
}

#[async_trait]
impl CalendarGateway for MicrosoftCalendarGateway {
    fn provider(&self) -> Provider {
        Provider::Microsoft
    }

    async fn fetch_page(&self, access_token: &str, query: &EventQuery) -> Result<EventPage> {
        debug!(calendar_id = %query.calendar_id, "fetching Microsoft events page");

        let response = self.http.send(self.page_request(access_token, query)?).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(Provider::Microsoft, status, &body));
        }

        let page: MicrosoftEventsResponse =
            response.json().await.map_err(|e| DayplanError::from(InfraError::from(e)))?;

        let events = page
            .value
            .into_iter()
            .map(|event| Self::map_event(event, &query.calendar_id))
            .collect();

        Ok(EventPage {
            events,
            next_page_token: page.next_link,
            next_sync_token: page.delta_link,
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
                ("scope", "Calendars.ReadWrite offline_access"),
            ]))
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DayplanError::Auth(format!(
                "Microsoft token refresh failed ({status}): {body}"
            )));
        }

        let refreshed: MicrosoftTokenResponse =
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
        let url = format!("{}/me/events", self.config.api_base);
        self.send_event_request(access_token, Method::POST, url, draft).await
    }

    async fn update_event(
        &self,
        access_token: &str,
        external_id: &str,
        draft: &EventDraft,
    ) -> Result<RawCalendarEvent> {
        let url = format!("{}/me/events/{}", self.config.api_base, external_id);
        self.send_event_request(access_token, Method::PATCH, url, draft).await
    }

    async fn delete_event(&self, access_token: &str, external_id: &str) -> Result<()> {
        let url = format!("{}/me/events/{}", self.config.api_base, external_id);

        let response = self
            .http
            .send(self.http.request(Method::DELETE, &url).bearer_auth(access_token))
            .await?;

        let status = response.status();
        if status.is_success() || status.as_u16() == 404 {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(Provider::Microsoft, status, &body))
    }
}

fn all_day_time(value: Option<MicrosoftEventTime>) -> RawEventTime {
    // Graph reports all-day boundaries as midnight datetimes; keep the date.
    match value {
        Some(t) if t.date_time.len() >= 10 => RawEventTime::Date(t.date_time[..10].to_string()),
        Some(t) => {
            warn!(value = %t.date_time, "unexpected all-day boundary format");
            RawEventTime::Missing
        }
        None => RawEventTime::Missing,
    }
}

fn timed_time(value: Option<MicrosoftEventTime>) -> RawEventTime {
    match value {
        Some(t) => RawEventTime::DateTime(normalise_event_time(&t)),
        None => RawEventTime::Missing,
    }
}

fn normalise_event_time(event: &MicrosoftEventTime) -> String {
    let value = event.date_time.trim();
    if value.ends_with('Z') {
        value.to_owned()
    } else if event.time_zone.as_deref().map(|tz| tz.eq_ignore_ascii_case("utc")).unwrap_or(false) {
        format!("{value}Z")
    } else {
        value.to_owned()
    }
}

#[derive(Debug, Deserialize)]
struct MicrosoftEventsResponse {
    #[serde(default)]
    value: Vec<MicrosoftCalendarEvent>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink")]
    delta_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MicrosoftCalendarEvent {
    id: String,
    subject: Option<String>,
    #[serde(rename = "bodyPreview")]
    body_preview: Option<String>,
    location: Option<MicrosoftLocation>,
    start: Option<MicrosoftEventTime>,
    end: Option<MicrosoftEventTime>,
    #[serde(rename = "isAllDay", default)]
    is_all_day: bool,
    #[serde(rename = "seriesMasterId")]
    series_master_id: Option<String>,
    #[serde(rename = "webLink")]
    web_link: Option<String>,
    #[serde(rename = "@removed")]
    removed: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MicrosoftLocation {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MicrosoftEventTime {
    #[serde(rename = "dateTime")]
    date_time: String,
    #[serde(rename = "timeZone")]
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MicrosoftTokenResponse {
    access_token: String,
    expires_in: i64,
}
