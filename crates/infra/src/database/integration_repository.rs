//! SQLite implementation of the IntegrationStore port.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dayplan_core::IntegrationStore;
use dayplan_domain::{DayplanError, IntegrationRecord, Provider, Result};
use rusqlite::ToSql;
use tracing::{debug, instrument};

use crate::errors::InfraError;
use crate::storage::DbPool;

/// SQLite implementation of IntegrationStore.
pub struct SqliteIntegrationStore {
    pool: Arc<DbPool>,
}

impl SqliteIntegrationStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(value: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| DayplanError::Database(format!("corrupt {field} timestamp: {e}")))
        })
        .transpose()
}

#[async_trait]
impl IntegrationStore for SqliteIntegrationStore {
    #[instrument(skip(self))]
    async fn get(&self, user_id: &str, provider: Provider) -> Result<IntegrationRecord> {
        let conn = self.pool.get()?;

        let row = conn
            .query_row(
                "SELECT access_token, refresh_token, expires_at, sync_token, last_synced_at
                 FROM integrations
                 WHERE user_id = ?1 AND provider = ?2",
                [&user_id as &dyn ToSql, &provider.as_str()].as_ref(),
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DayplanError::NotFound(format!(
                    "no {provider} integration for user {user_id}"
                )),
                other => InfraError::from(other).into(),
            })?;

        Ok(IntegrationRecord {
            user_id: user_id.to_string(),
            provider,
            access_token: row.0,
            refresh_token: row.1,
            expires_at: parse_timestamp(row.2, "expires_at")?,
            sync_token: row.3,
            last_synced_at: parse_timestamp(row.4, "last_synced_at")?,
        })
    }

    #[instrument(skip(self, record), fields(user_id = %record.user_id, provider = %record.provider))]
    async fn upsert(&self, record: IntegrationRecord) -> Result<()> {
        let conn = self.pool.get()?;
        let now = Utc::now().timestamp();

        conn.execute(
            "INSERT INTO integrations (
                user_id, provider, access_token, refresh_token, expires_at,
                sync_token, last_synced_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id, provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                sync_token = excluded.sync_token,
                last_synced_at = excluded.last_synced_at,
                updated_at = excluded.updated_at",
            [
                &record.user_id as &dyn ToSql,
                &record.provider.as_str(),
                &record.access_token,
                &record.refresh_token,
                &record.expires_at.map(|t| t.to_rfc3339()),
                &record.sync_token,
                &record.last_synced_at.map(|t| t.to_rfc3339()),
                &now,
            ]
            .as_ref(),
        )
        .map_err(InfraError::from)?;

        Ok(())
    }

    #[instrument(skip(self, access_token, refresh_token))]
    async fn update_tokens(
        &self,
        user_id: &str,
        provider: Provider,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        let now = Utc::now().timestamp();

        conn.execute(
            "UPDATE integrations
             SET access_token = ?1,
                 refresh_token = COALESCE(?2, refresh_token),
                 expires_at = ?3,
                 updated_at = ?4
             WHERE user_id = ?5 AND provider = ?6",
            [
                &access_token as &dyn ToSql,
                &refresh_token,
                &expires_at.map(|t| t.to_rfc3339()),
                &now,
                &user_id,
                &provider.as_str(),
            ]
            .as_ref(),
        )
        .map_err(InfraError::from)?;

        debug!(user_id, provider = %provider, "stored refreshed tokens");
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn set_sync_token(&self, user_id: &str, provider: Provider, token: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let now = Utc::now();

        conn.execute(
            "UPDATE integrations
             SET sync_token = ?1, last_synced_at = ?2, updated_at = ?3
             WHERE user_id = ?4 AND provider = ?5",
            [
                &token as &dyn ToSql,
                &now.to_rfc3339(),
                &now.timestamp(),
                &user_id,
                &provider.as_str(),
            ]
            .as_ref(),
        )
        .map_err(InfraError::from)?;

        debug!(user_id, provider = %provider, "updated sync token");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_sync_token(&self, user_id: &str, provider: Provider) -> Result<()> {
        let conn = self.pool.get()?;
        let now = Utc::now().timestamp();

        conn.execute(
            "UPDATE integrations
             SET sync_token = NULL, updated_at = ?1
             WHERE user_id = ?2 AND provider = ?3",
            [&now as &dyn ToSql, &user_id, &provider.as_str()].as_ref(),
        )
        .map_err(InfraError::from)?;

        debug!(user_id, provider = %provider, "cleared sync token");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn store() -> SqliteIntegrationStore {
        SqliteIntegrationStore::new(Arc::new(DbPool::in_memory().unwrap()))
    }

    fn integration() -> IntegrationRecord {
        IntegrationRecord {
            user_id: "u1".to_string(),
            provider: Provider::Google,
            access_token: "at-1".to_string(),
            refresh_token: Some("rt-1".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            sync_token: None,
            last_synced_at: None,
        }
    }

    #[tokio::test]
    async fn missing_integration_is_not_found() {
        let err = store().get("nobody", Provider::Google).await.unwrap_err();
        assert!(matches!(err, DayplanError::NotFound(_)));
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = store();
        store.upsert(integration()).await.unwrap();

        let loaded = store.get("u1", Provider::Google).await.unwrap();
        assert_eq!(loaded.access_token, "at-1");
        assert_eq!(loaded.refresh_token.as_deref(), Some("rt-1"));
        assert!(loaded.sync_token.is_none());
        assert!(!loaded.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn sync_token_set_and_clear() {
        let store = store();
        store.upsert(integration()).await.unwrap();

        store.set_sync_token("u1", Provider::Google, "delta-token-1").await.unwrap();
        let loaded = store.get("u1", Provider::Google).await.unwrap();
        assert_eq!(loaded.sync_token.as_deref(), Some("delta-token-1"));
        assert!(loaded.last_synced_at.is_some());

        store.clear_sync_token("u1", Provider::Google).await.unwrap();
        let loaded = store.get("u1", Provider::Google).await.unwrap();
        assert!(loaded.sync_token.is_none());
    }

    #[tokio::test]
    async fn token_refresh_keeps_old_refresh_token_when_not_rotated() {
        let store = store();
        store.upsert(integration()).await.unwrap();

        store
            .update_tokens("u1", Provider::Google, "at-2", None, Some(Utc::now()))
            .await
            .unwrap();

        let loaded = store.get("u1", Provider::Google).await.unwrap();
        assert_eq!(loaded.access_token, "at-2");
        // COALESCE keeps the stored refresh token.
        assert_eq!(loaded.refresh_token.as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn providers_are_isolated_per_user() {
        let store = store();
        store.upsert(integration()).await.unwrap();

        let mut ms = integration();
        ms.provider = Provider::Microsoft;
        ms.access_token = "ms-at".to_string();
        store.upsert(ms).await.unwrap();

        assert_eq!(store.get("u1", Provider::Google).await.unwrap().access_token, "at-1");
        assert_eq!(store.get("u1", Provider::Microsoft).await.unwrap().access_token, "ms-at");
    }
}
