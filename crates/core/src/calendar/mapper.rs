//! Vendor event to local record mapping
//!
//! Pure translation of one [`RawCalendarEvent`] into one [`EventChange`].
//! Malformed events map to `None` and are dropped from the batch; mapping
//! never fails the cycle.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dayplan_domain::{CalendarEventRecord, EventChange, Provider};
use tracing::warn;
use uuid::Uuid;

use super::ports::{RawCalendarEvent, RawEventTime};

const UNTITLED_EVENT: &str = "Untitled event";

/// Fixed vendor palette (Google Calendar event colour ids).
pub fn palette_color(color_id: &str) -> Option<&'static str> {
    match color_id {
        "1" => Some("#7986CB"),  // Lavender
        "2" => Some("#33B679"),  // Sage
        "3" => Some("#8E24AA"),  // Grape
        "4" => Some("#E67C73"),  // Flamingo
        "5" => Some("#F6BF26"),  // Banana
        "6" => Some("#F4511E"),  // Tangerine
        "7" => Some("#039BE5"),  // Peacock
        "8" => Some("#616161"),  // Graphite
        "9" => Some("#3F51B5"),  // Blueberry
        "10" => Some("#0B8043"), // Basil
        "11" => Some("#D50000"), // Tomato
        _ => None,
    }
}

/// Map one vendor event. Returns `None` for events that cannot be stored
/// (missing id, unparseable dates); cancellations become tombstones.
pub fn map_raw_event(
    raw: RawCalendarEvent,
    provider: Provider,
    user_id: &str,
) -> Option<EventChange> {
    let external_id = raw.id.trim();
    if external_id.is_empty() {
        warn!(provider = %provider, "skipping vendor event without id");
        return None;
    }
    let external_id = external_id.to_string();

    if raw.cancelled {
        return Some(EventChange::Delete { external_id });
    }

    let is_all_day = raw.start.is_date_only();

    let (start_date, start_time, end_date, end_time) = if is_all_day {
        let start_date = parse_date(&raw.start)?;
        // Vendors report an exclusive end date for all-day spans; store the
        // inclusive one, clamped so a same-day event stays on its day.
        let end_date = match parse_date(&raw.end) {
            Some(exclusive) => (exclusive - Duration::days(1)).max(start_date),
            None => start_date,
        };
        (start_date, None, end_date, None)
    } else {
        let start = parse_date_time(&raw.start)?;
        let end = parse_date_time(&raw.end).unwrap_or(start);
        (
            start.date_naive(),
            Some(start.time()),
            end.date_naive(),
            Some(end.time()),
        )
    };

    let color_hex = raw
        .color_id
        .as_deref()
        .and_then(palette_color)
        .map(String::from)
        .or(raw.calendar_color);

    let title = raw
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED_EVENT.to_string());

    Some(EventChange::Upsert(CalendarEventRecord {
        id: Uuid::now_v7().to_string(),
        external_id,
        provider,
        user_id: user_id.to_string(),
        title,
        description: raw.description.filter(|d| !d.is_empty()),
        location: raw.location.filter(|l| !l.is_empty()),
        start_date,
        start_time,
        end_date,
        end_time,
        is_all_day,
        color_hex,
        calendar_id: raw.calendar_id,
        calendar_name: raw.calendar_name,
        is_recurring: raw.recurring_event_id.is_some(),
        html_link: raw.html_link,
    }))
}

/// Map a batch, dropping skips. A malformed event never aborts the batch.
pub fn map_batch(
    raw_events: Vec<RawCalendarEvent>,
    provider: Provider,
    user_id: &str,
) -> Vec<EventChange> {
    raw_events
        .into_iter()
        .filter_map(|raw| map_raw_event(raw, provider, user_id))
        .collect()
}

fn parse_date(value: &RawEventTime) -> Option<NaiveDate> {
    match value {
        RawEventTime::Date(date) => NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok(),
        _ => None,
    }
}

fn parse_date_time(value: &RawEventTime) -> Option<DateTime<Utc>> {
    let RawEventTime::DateTime(raw) = value else {
        return None;
    };

    let trimmed = raw.trim();
    // Graph omits the offset for UTC-preferenced responses; treat a bare
    // timestamp as UTC.
    let has_explicit_offset = trimmed.ends_with('Z')
        || trimmed
            .rfind('T')
            .is_some_and(|idx| trimmed[idx + 1..].chars().any(|c| matches!(c, '+' | '-')));

    let candidate = if has_explicit_offset { trimmed.to_string() } else { format!("{trimmed}Z") };

    DateTime::parse_from_rfc3339(&candidate)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
