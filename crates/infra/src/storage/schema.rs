//! Database schema.
//!
//! Dates are stored as ISO-8601 TEXT (`YYYY-MM-DD`, `HH:MM:SS`) so range
//! queries can compare lexicographically. Synced rows are a disposable copy
//! of vendor data and carry no foreign keys.

use dayplan_domain::Result;
use rusqlite::Connection;

use crate::errors::InfraError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS calendar_events (
    id            TEXT PRIMARY KEY,
    external_id   TEXT NOT NULL,
    provider      TEXT NOT NULL,
    user_id       TEXT NOT NULL,
    title         TEXT NOT NULL,
    description   TEXT,
    location      TEXT,
    start_date    TEXT NOT NULL,
    start_time    TEXT,
    end_date      TEXT NOT NULL,
    end_time      TEXT,
    is_all_day    INTEGER NOT NULL DEFAULT 0,
    color_hex     TEXT,
    calendar_id   TEXT NOT NULL,
    calendar_name TEXT NOT NULL,
    is_recurring  INTEGER NOT NULL DEFAULT 0,
    html_link     TEXT,
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL,
    UNIQUE(external_id, provider, user_id)
);

CREATE INDEX IF NOT EXISTS idx_calendar_events_user_range
    ON calendar_events(user_id, start_date, end_date);

CREATE TABLE IF NOT EXISTS integrations (
    user_id        TEXT NOT NULL,
    provider       TEXT NOT NULL,
    access_token   TEXT NOT NULL,
    refresh_token  TEXT,
    expires_at     TEXT,
    sync_token     TEXT,
    last_synced_at TEXT,
    updated_at     INTEGER NOT NULL,
    PRIMARY KEY(user_id, provider)
);
";

/// Apply the schema. Safe to call on every startup.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA).map_err(InfraError::from)?;
    Ok(())
}
