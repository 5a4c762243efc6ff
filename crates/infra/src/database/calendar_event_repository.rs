//! SQLite implementation of the CalendarEventStore port.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use dayplan_core::{CalendarEventStore, SyncWindow};
use dayplan_domain::{CalendarEventRecord, Provider, Result, StoreChange};
use rusqlite::types::Type;
use rusqlite::{Row, ToSql};
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use crate::errors::InfraError;
use crate::storage::DbPool;

const EVENT_COLUMNS: &str = "id, external_id, provider, user_id, title, description, location,
     start_date, start_time, end_date, end_time, is_all_day, color_hex,
     calendar_id, calendar_name, is_recurring, html_link";

/// SQLite implementation of CalendarEventStore.
///
/// Emits a [`StoreChange`] on the broadcast channel after every committed
/// write so read-side subscribers can refresh.
pub struct SqliteCalendarEventStore {
    pool: Arc<DbPool>,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteCalendarEventStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self { pool, changes }
    }

    fn notify(&self, user_id: &str, provider: Provider) {
        // No receivers is fine; the send result only reports that.
        let _ = self
            .changes
            .send(StoreChange { user_id: user_id.to_string(), provider });
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<CalendarEventRecord> {
    let provider: String = row.get(2)?;
    let start_date: String = row.get(7)?;
    let start_time: Option<String> = row.get(8)?;
    let end_date: String = row.get(9)?;
    let end_time: Option<String> = row.get(10)?;

    Ok(CalendarEventRecord {
        id: row.get(0)?,
        external_id: row.get(1)?,
        provider: Provider::from_str(&provider)
            .map_err(|e| conversion_error(2, e))?,
        user_id: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        location: row.get(6)?,
        start_date: parse_date(&start_date, 7)?,
        start_time: start_time.as_deref().map(|t| parse_time(t, 8)).transpose()?,
        end_date: parse_date(&end_date, 9)?,
        end_time: end_time.as_deref().map(|t| parse_time(t, 10)).transpose()?,
        is_all_day: row.get(11)?,
        color_hex: row.get(12)?,
        calendar_id: row.get(13)?,
        calendar_name: row.get(14)?,
        is_recurring: row.get(15)?,
        html_link: row.get(16)?,
    })
}

fn parse_date(value: &str, column: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| conversion_error(column, e))
}

fn parse_time(value: &str, column: usize) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S").map_err(|e| conversion_error(column, e))
}

fn conversion_error(
    column: usize,
    cause: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(cause))
}

#[async_trait]
impl CalendarEventStore for SqliteCalendarEventStore {
    #[instrument(skip(self, record), fields(external_id = %record.external_id))]
    async fn upsert_event(&self, record: CalendarEventRecord) -> Result<()> {
        let conn = self.pool.get()?;
        let now = Utc::now().timestamp();

        conn.execute(
            "INSERT INTO calendar_events (
                id, external_id, provider, user_id, title, description, location,
                start_date, start_time, end_date, end_time, is_all_day, color_hex,
                calendar_id, calendar_name, is_recurring, html_link,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)
            ON CONFLICT(external_id, provider, user_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                location = excluded.location,
                start_date = excluded.start_date,
                start_time = excluded.start_time,
                end_date = excluded.end_date,
                end_time = excluded.end_time,
                is_all_day = excluded.is_all_day,
                color_hex = excluded.color_hex,
                calendar_id = excluded.calendar_id,
                calendar_name = excluded.calendar_name,
                is_recurring = excluded.is_recurring,
                html_link = excluded.html_link,
                updated_at = excluded.updated_at",
            [
                &record.id as &dyn ToSql,
                &record.external_id,
                &record.provider.as_str(),
                &record.user_id,
                &record.title,
                &record.description,
                &record.location,
                &record.start_date.to_string(),
                &record.start_time.map(|t| t.to_string()),
                &record.end_date.to_string(),
                &record.end_time.map(|t| t.to_string()),
                &record.is_all_day,
                &record.color_hex,
                &record.calendar_id,
                &record.calendar_name,
                &record.is_recurring,
                &record.html_link,
                &now,
            ]
            .as_ref(),
        )
        .map_err(InfraError::from)?;

        self.notify(&record.user_id, record.provider);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_event(
        &self,
        user_id: &str,
        provider: Provider,
        external_id: &str,
    ) -> Result<bool> {
        let conn = self.pool.get()?;

        let deleted = conn
            .execute(
                "DELETE FROM calendar_events
                 WHERE user_id = ?1 AND provider = ?2 AND external_id = ?3",
                [&user_id as &dyn ToSql, &provider.as_str(), &external_id].as_ref(),
            )
            .map_err(InfraError::from)?;

        if deleted > 0 {
            self.notify(user_id, provider);
        }

        Ok(deleted > 0)
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn replace_window(
        &self,
        user_id: &str,
        provider: Provider,
        window: &SyncWindow,
        records: Vec<CalendarEventRecord>,
    ) -> Result<usize> {
        let (from, to) = window.date_bounds(Utc::now());
        let mut conn = self.pool.get()?;
        let now = Utc::now().timestamp();

        let tx = conn.transaction().map_err(InfraError::from)?;

        tx.execute(
            "DELETE FROM calendar_events
             WHERE user_id = ?1 AND provider = ?2
               AND end_date >= ?3 AND start_date <= ?4",
            [&user_id as &dyn ToSql, &provider.as_str(), &from.to_string(), &to.to_string()]
                .as_ref(),
        )
        .map_err(InfraError::from)?;

        let count = records.len();
        for record in records {
            tx.execute(
                "INSERT INTO calendar_events (
                    id, external_id, provider, user_id, title, description, location,
                    start_date, start_time, end_date, end_time, is_all_day, color_hex,
                    calendar_id, calendar_name, is_recurring, html_link,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)",
                [
                    &record.id as &dyn ToSql,
                    &record.external_id,
                    &record.provider.as_str(),
                    &record.user_id,
                    &record.title,
                    &record.description,
                    &record.location,
                    &record.start_date.to_string(),
                    &record.start_time.map(|t| t.to_string()),
                    &record.end_date.to_string(),
                    &record.end_time.map(|t| t.to_string()),
                    &record.is_all_day,
                    &record.color_hex,
                    &record.calendar_id,
                    &record.calendar_name,
                    &record.is_recurring,
                    &record.html_link,
                    &now,
                ]
                .as_ref(),
            )
            .map_err(InfraError::from)?;
        }

        tx.commit().map_err(InfraError::from)?;

        debug!(user_id, provider = %provider, count, "replaced window contents");
        self.notify(user_id, provider);

        Ok(count)
    }

    #[instrument(skip(self))]
    async fn events_in_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CalendarEventRecord>> {
        let conn = self.pool.get()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EVENT_COLUMNS}
                 FROM calendar_events
                 WHERE user_id = ?1 AND end_date >= ?2 AND start_date <= ?3
                 ORDER BY start_date ASC, start_time ASC"
            ))
            .map_err(InfraError::from)?;

        let rows = stmt
            .query_map(
                [&user_id as &dyn ToSql, &from.to_string(), &to.to_string()].as_ref(),
                row_to_record,
            )
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(InfraError::from)?;

        debug!(user_id, %from, %to, count = rows.len(), "retrieved calendar events");

        Ok(rows)
    }

    async fn events_for_day(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<CalendarEventRecord>> {
        self.events_in_range(user_id, day, day).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
