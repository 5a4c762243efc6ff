//! Calendar sync worker
//!
//! Runs one sync cycle for a `(user, provider)` pair: pick the cursor,
//! buffer every page of the vendor feed, map the batch, then write the
//! result either incrementally or as a full window replace.

use std::sync::Arc;

use chrono::Utc;
use dayplan_core::calendar::mapper::map_batch;
use dayplan_core::{
    apply_changes, CalendarEventStore, Cursor, EventQuery, IntegrationStore, RawCalendarEvent,
    SyncWindow,
};
use dayplan_domain::{DayplanError, EventChange, Result, SyncOutcome};
use tracing::{debug, info, instrument, warn};

use super::client::CalendarClient;

pub struct CalendarSyncWorker {
    client: CalendarClient,
    events: Arc<dyn CalendarEventStore>,
    integrations: Arc<dyn IntegrationStore>,
    window: SyncWindow,
}

impl CalendarSyncWorker {
    pub fn new(
        client: CalendarClient,
        events: Arc<dyn CalendarEventStore>,
        integrations: Arc<dyn IntegrationStore>,
        window: SyncWindow,
    ) -> Self {
        Self { client, events, integrations, window }
    }

    /// Run one sync cycle for `user_id`.
    ///
    /// A stored continuation token selects an incremental fetch; without one
    /// the configured window is fetched in full and the stored copy of that
    /// window is replaced atomically. Every page is buffered before any
    /// write, so a mid-feed failure leaves the store untouched.
    #[instrument(skip(self), fields(provider = %self.client.provider()))]
    pub async fn perform_sync(&self, user_id: &str) -> Result<SyncOutcome> {
        let provider = self.client.provider();
        info!(user_id, %provider, "starting calendar sync");

        let integration = self.integrations.get(user_id, provider).await?;
        let access_token = self.client.ensure_access_token(user_id).await?;

        let (raw_events, next_sync_token, incremental) = match integration.sync_token {
            Some(token) => {
                match self.fetch_all_pages(&access_token, Cursor::SyncToken(token)).await {
                    Ok((events, next)) => (events, next, true),
                    Err(DayplanError::SyncTokenInvalid(message)) => {
                        warn!(
                            user_id,
                            %provider,
                            message,
                            "continuation token expired, restarting from a full window"
                        );
                        self.integrations.clear_sync_token(user_id, provider).await?;
                        let (events, next) =
                            self.fetch_all_pages(&access_token, self.window_cursor()).await?;
                        (events, next, false)
                    }
                    Err(err) => return Err(err),
                }
            }
            None => {
                let (events, next) =
                    self.fetch_all_pages(&access_token, self.window_cursor()).await?;
                (events, next, false)
            }
        };

        let fetched = raw_events.len();
        let changes = map_batch(raw_events, provider, user_id);
        let skipped_malformed = fetched - changes.len();

        let (events_synced, events_deleted, events_skipped) = if incremental {
            let summary = apply_changes(self.events.as_ref(), user_id, provider, changes).await?;
            (summary.upserted, summary.deleted, summary.skipped + skipped_malformed)
        } else {
            let mut records = Vec::new();
            let mut tombstones = 0usize;
            for change in changes {
                match change {
                    EventChange::Upsert(record) => records.push(record),
                    // A full fetch replaces the window outright, so a
                    // cancellation just means the event is absent.
                    EventChange::Delete { .. } => tombstones += 1,
                }
            }
            let replaced =
                self.events.replace_window(user_id, provider, &self.window, records).await?;
            (replaced, tombstones, skipped_malformed)
        };

        if let Some(ref token) = next_sync_token {
            self.integrations.set_sync_token(user_id, provider, token).await?;
        } else {
            debug!(
                user_id,
                %provider,
                "provider returned no continuation token; leaving stored token unchanged"
            );
        }

        let last_synced_at = Utc::now();
        info!(
            user_id,
            %provider,
            events_synced,
            events_deleted,
            events_skipped,
            "calendar sync completed"
        );

        Ok(SyncOutcome { provider, events_synced, events_deleted, events_skipped, last_synced_at })
    }

    fn window_cursor(&self) -> Cursor {
        let (time_min, time_max) = self.window.bounds(Utc::now());
        Cursor::Window { time_min, time_max }
    }

    /// Follow pagination to the end of the feed, buffering every event.
    /// The continuation token only appears on the final page; keep the
    /// latest one seen.
    async fn fetch_all_pages(
        &self,
        access_token: &str,
        cursor: Cursor,
    ) -> Result<(Vec<RawCalendarEvent>, Option<String>)> {
        let mut query = EventQuery::initial(cursor);
        let mut buffered = Vec::new();
        let mut next_sync_token: Option<String> = None;

        loop {
            let page = self.client.gateway().fetch_page(access_token, &query).await?;

            buffered.extend(page.events);
            next_sync_token = page.next_sync_token.or(next_sync_token);

            match page.next_page_token {
                Some(token) => query = query.next_page(token),
                None => break,
            }
        }

        Ok((buffered, next_sync_token))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate};
    use dayplan_core::{
        CalendarGateway, EventDraft, EventPage, RawEventTime, TokenRefresh,
    };
    use dayplan_domain::{CalendarEventRecord, IntegrationRecord, Provider, StoreChange};
    use tokio::sync::broadcast;

    use super::*;

    struct ScriptedGateway {
        pages: Mutex<VecDeque<Result<EventPage>>>,
        queries: Mutex<Vec<EventQuery>>,
    }

    impl ScriptedGateway {
        fn new(pages: Vec<Result<EventPage>>) -> Self {
            Self { pages: Mutex::new(pages.into()), queries: Mutex::new(Vec::new()) }
        }

        fn queries(&self) -> Vec<EventQuery> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CalendarGateway for ScriptedGateway {
        fn provider(&self) -> Provider {
            Provider::Google
        }

        async fn fetch_page(&self, _: &str, query: &EventQuery) -> Result<EventPage> {
            self.queries.lock().unwrap().push(query.clone());
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("gateway asked for more pages than scripted"))
        }

        async fn refresh_token(&self, _: &str) -> Result<TokenRefresh> {
            unreachable!("tokens in these tests never expire")
        }

        async fn create_event(&self, _: &str, _: &EventDraft) -> Result<RawCalendarEvent> {
            unreachable!("not exercised")
        }

        async fn update_event(&self, _: &str, _: &str, _: &EventDraft) -> Result<RawCalendarEvent> {
            unreachable!("not exercised")
        }

        async fn delete_event(&self, _: &str, _: &str) -> Result<()> {
            unreachable!("not exercised")
        }
    }

    struct MemoryEvents {
        rows: Mutex<Vec<CalendarEventRecord>>,
        replace_batches: Mutex<Vec<usize>>,
        changes: broadcast::Sender<StoreChange>,
    }

    impl MemoryEvents {
        fn new() -> Self {
            let (changes, _) = broadcast::channel(8);
            Self { rows: Mutex::new(Vec::new()), replace_batches: Mutex::new(Vec::new()), changes }
        }
    }

    #[async_trait]
    impl CalendarEventStore for MemoryEvents {
        async fn upsert_event(&self, record: CalendarEventRecord) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            rows.retain(|r| {
                !(r.external_id == record.external_id
                    && r.provider == record.provider
                    && r.user_id == record.user_id)
            });
            rows.push(record);
            Ok(())
        }

        async fn delete_event(
            &self,
            user_id: &str,
            provider: Provider,
            external_id: &str,
        ) -> Result<bool> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|r| {
                !(r.external_id == external_id && r.provider == provider && r.user_id == user_id)
            });
            Ok(rows.len() < before)
        }

        async fn replace_window(
            &self,
            user_id: &str,
            provider: Provider,
            _window: &SyncWindow,
            records: Vec<CalendarEventRecord>,
        ) -> Result<usize> {
            self.replace_batches.lock().unwrap().push(records.len());
            let mut rows = self.rows.lock().unwrap();
            rows.retain(|r| !(r.user_id == user_id && r.provider == provider));
            let count = records.len();
            rows.extend(records);
            Ok(count)
        }

        async fn events_in_range(
            &self,
            user_id: &str,
            _: NaiveDate,
            _: NaiveDate,
        ) -> Result<Vec<CalendarEventRecord>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect())
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

    struct MemoryIntegrations {
        records: Mutex<Vec<IntegrationRecord>>,
    }

    impl MemoryIntegrations {
        fn with(record: IntegrationRecord) -> Self {
            Self { records: Mutex::new(vec![record]) }
        }
    }

    #[async_trait]
    impl IntegrationStore for MemoryIntegrations {
        async fn get(&self, user_id: &str, provider: Provider) -> Result<IntegrationRecord> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.user_id == user_id && r.provider == provider)
                .cloned()
                .ok_or_else(|| DayplanError::NotFound("no integration".into()))
        }

        async fn upsert(&self, record: IntegrationRecord) -> Result<()> {
            self.records.lock().unwrap().push(record);
            Ok(())
        }

        async fn update_tokens(
            &self,
            _: &str,
            _: Provider,
            _: &str,
            _: Option<&str>,
            _: Option<DateTime<Utc>>,
        ) -> Result<()> {
            Ok(())
        }

        async fn set_sync_token(&self, user_id: &str, provider: Provider, token: &str) -> Result<()> {
            let mut records = self.records.lock().unwrap();
            let record = records
                .iter_mut()
                .find(|r| r.user_id == user_id && r.provider == provider)
                .ok_or_else(|| DayplanError::NotFound("no integration".into()))?;
            record.sync_token = Some(token.to_string());
            record.last_synced_at = Some(Utc::now());
            Ok(())
        }

        async fn clear_sync_token(&self, user_id: &str, provider: Provider) -> Result<()> {
            let mut records = self.records.lock().unwrap();
            let record = records
                .iter_mut()
                .find(|r| r.user_id == user_id && r.provider == provider)
                .ok_or_else(|| DayplanError::NotFound("no integration".into()))?;
            record.sync_token = None;
            Ok(())
        }
    }

    fn integration(sync_token: Option<&str>) -> IntegrationRecord {
        IntegrationRecord {
            user_id: "u1".to_string(),
            provider: Provider::Google,
            access_token: "tok".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: None,
            sync_token: sync_token.map(String::from),
            last_synced_at: None,
        }
    }

    fn raw(id: &str) -> RawCalendarEvent {
        RawCalendarEvent {
            id: id.to_string(),
            title: Some(format!("Event {id}")),
            description: None,
            location: None,
            start: RawEventTime::DateTime("2024-05-01T09:00:00Z".to_string()),
            end: RawEventTime::DateTime("2024-05-01T10:00:00Z".to_string()),
            cancelled: false,
            color_id: None,
            calendar_id: "primary".to_string(),
            calendar_name: "primary".to_string(),
            calendar_color: None,
            recurring_event_id: None,
            html_link: None,
        }
    }

    fn cancelled(id: &str) -> RawCalendarEvent {
        RawCalendarEvent { cancelled: true, ..raw(id) }
    }

    fn page(
        events: Vec<RawCalendarEvent>,
        next_page_token: Option<&str>,
        next_sync_token: Option<&str>,
    ) -> Result<EventPage> {
        Ok(EventPage {
            events,
            next_page_token: next_page_token.map(String::from),
            next_sync_token: next_sync_token.map(String::from),
        })
    }

    fn worker(
        gateway: Arc<ScriptedGateway>,
        events: Arc<MemoryEvents>,
        integrations: Arc<MemoryIntegrations>,
    ) -> CalendarSyncWorker {
        CalendarSyncWorker::new(
            CalendarClient::new(gateway, integrations.clone()),
            events,
            integrations,
            SyncWindow::default(),
        )
    }

    #[tokio::test]
    async fn initial_sync_buffers_all_pages_then_replaces_window() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            page(vec![raw("a"), raw("b")], Some("page-2"), None),
            page(vec![raw("c")], None, Some("token-1")),
        ]));
        let events = Arc::new(MemoryEvents::new());
        let integrations = Arc::new(MemoryIntegrations::with(integration(None)));

        let outcome =
            worker(gateway.clone(), events.clone(), integrations.clone()).perform_sync("u1").await.unwrap();

        assert_eq!(outcome.events_synced, 3);
        assert_eq!(outcome.events_deleted, 0);
        // One atomic replace carrying the whole buffered feed.
        assert_eq!(*events.replace_batches.lock().unwrap(), vec![3]);

        let stored = integrations.get("u1", Provider::Google).await.unwrap();
        assert_eq!(stored.sync_token.as_deref(), Some("token-1"));
        assert!(stored.last_synced_at.is_some());

        let queries = gateway.queries();
        assert!(matches!(queries[0].cursor, Cursor::Window { .. }));
        assert_eq!(queries[1].page_token.as_deref(), Some("page-2"));
    }

    #[tokio::test]
    async fn incremental_sync_applies_upserts_and_tombstones() {
        let gateway = Arc::new(ScriptedGateway::new(vec![page(
            vec![raw("a"), cancelled("b")],
            None,
            Some("token-2"),
        )]));
        let events = Arc::new(MemoryEvents::new());
        let integrations = Arc::new(MemoryIntegrations::with(integration(Some("token-1"))));

        // Seed the event the tombstone removes.
        let seeded = dayplan_core::calendar::mapper::map_raw_event(raw("b"), Provider::Google, "u1");
        if let Some(EventChange::Upsert(record)) = seeded {
            events.upsert_event(record).await.unwrap();
        }

        let outcome =
            worker(gateway.clone(), events.clone(), integrations.clone()).perform_sync("u1").await.unwrap();

        assert_eq!(outcome.events_synced, 1);
        assert_eq!(outcome.events_deleted, 1);
        assert!(events.replace_batches.lock().unwrap().is_empty());

        let rows = events.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].external_id, "a");
        drop(rows);

        let queries = gateway.queries();
        assert!(matches!(&queries[0].cursor, Cursor::SyncToken(t) if t == "token-1"));

        let stored = integrations.get("u1", Provider::Google).await.unwrap();
        assert_eq!(stored.sync_token.as_deref(), Some("token-2"));
    }

    #[tokio::test]
    async fn expired_token_falls_back_to_full_window_fetch() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Err(DayplanError::SyncTokenInvalid("410".to_string())),
            page(vec![raw("a")], None, Some("token-fresh")),
        ]));
        let events = Arc::new(MemoryEvents::new());
        let integrations = Arc::new(MemoryIntegrations::with(integration(Some("token-stale"))));

        let outcome =
            worker(gateway.clone(), events.clone(), integrations.clone()).perform_sync("u1").await.unwrap();

        assert_eq!(outcome.events_synced, 1);
        assert_eq!(*events.replace_batches.lock().unwrap(), vec![1]);

        let queries = gateway.queries();
        assert!(matches!(&queries[0].cursor, Cursor::SyncToken(_)));
        assert!(matches!(&queries[1].cursor, Cursor::Window { .. }));

        let stored = integrations.get("u1", Provider::Google).await.unwrap();
        assert_eq!(stored.sync_token.as_deref(), Some("token-fresh"));
    }

    #[tokio::test]
    async fn missing_continuation_token_leaves_stored_token_unchanged() {
        let gateway = Arc::new(ScriptedGateway::new(vec![page(vec![raw("a")], None, None)]));
        let events = Arc::new(MemoryEvents::new());
        let integrations = Arc::new(MemoryIntegrations::with(integration(Some("token-1"))));

        worker(gateway, events, integrations.clone()).perform_sync("u1").await.unwrap();

        let stored = integrations.get("u1", Provider::Google).await.unwrap();
        assert_eq!(stored.sync_token.as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn malformed_events_are_counted_as_skipped() {
        let mut bad = raw("");
        bad.id = "  ".to_string();
        let gateway =
            Arc::new(ScriptedGateway::new(vec![page(vec![raw("a"), bad], None, Some("t"))]));
        let events = Arc::new(MemoryEvents::new());
        let integrations = Arc::new(MemoryIntegrations::with(integration(None)));

        let outcome = worker(gateway, events, integrations).perform_sync("u1").await.unwrap();

        assert_eq!(outcome.events_synced, 1);
        assert_eq!(outcome.events_skipped, 1);
    }

    #[tokio::test]
    async fn missing_integration_propagates_not_found() {
        let gateway = Arc::new(ScriptedGateway::new(vec![]));
        let events = Arc::new(MemoryEvents::new());
        let integrations =
            Arc::new(MemoryIntegrations { records: Mutex::new(Vec::new()) });

        let err = worker(gateway, events, integrations).perform_sync("u1").await.unwrap_err();
        assert!(matches!(err, DayplanError::NotFound(_)));
    }
}
