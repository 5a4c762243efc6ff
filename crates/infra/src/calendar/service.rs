//! Sync service
//!
//! Front door for everything calendar: on-demand syncs with per-user,
//! per-provider single-flight, and write-through vendor mutations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use dayplan_core::calendar::mapper::map_raw_event;
use dayplan_core::{CalendarEventStore, CalendarGateway, EventDraft, IntegrationStore, SyncWindow};
use dayplan_domain::{
    CalendarEventRecord, DayplanError, EventChange, Provider, Result, StoreChange, SyncOutcome,
};
use tokio::sync::{broadcast, Mutex as TokioMutex};
use tracing::{info, instrument};

use super::client::CalendarClient;
use super::sync::CalendarSyncWorker;

type SyncKey = (String, Provider);

pub struct SyncService {
    events: Arc<dyn CalendarEventStore>,
    integrations: Arc<dyn IntegrationStore>,
    gateways: HashMap<Provider, Arc<dyn CalendarGateway>>,
    window: SyncWindow,
    // One async mutex per (user, provider); a second trigger for the same
    // key waits for the in-flight cycle instead of running beside it.
    locks: StdMutex<HashMap<SyncKey, Arc<TokioMutex<()>>>>,
}

impl SyncService {
    pub fn new(
        events: Arc<dyn CalendarEventStore>,
        integrations: Arc<dyn IntegrationStore>,
        window: SyncWindow,
    ) -> Self {
        Self {
            events,
            integrations,
            gateways: HashMap::new(),
            window,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn register_gateway(&mut self, gateway: Arc<dyn CalendarGateway>) {
        self.gateways.insert(gateway.provider(), gateway);
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.gateways.keys().copied().collect()
    }

    /// Run one sync cycle for `(user_id, provider)`, serialized against any
    /// cycle already in flight for the same pair.
    #[instrument(skip(self))]
    pub async fn sync(&self, user_id: &str, provider: Provider) -> Result<SyncOutcome> {
        let lock = self.sync_lock(user_id, provider);
        let _guard = lock.lock().await;

        let worker = CalendarSyncWorker::new(
            self.client(provider)?,
            self.events.clone(),
            self.integrations.clone(),
            self.window,
        );
        worker.perform_sync(user_id).await
    }

    /// Create an event on the vendor calendar, then store the mapped copy.
    pub async fn create_event(
        &self,
        user_id: &str,
        provider: Provider,
        draft: &EventDraft,
    ) -> Result<CalendarEventRecord> {
        let client = self.client(provider)?;
        let access_token = client.ensure_access_token(user_id).await?;
        let raw = client.gateway().create_event(&access_token, draft).await?;
        self.store_mapped(raw, provider, user_id).await
    }

    /// Update a vendor event, then store the mapped copy.
    pub async fn update_event(
        &self,
        user_id: &str,
        provider: Provider,
        external_id: &str,
        draft: &EventDraft,
    ) -> Result<CalendarEventRecord> {
        let client = self.client(provider)?;
        let access_token = client.ensure_access_token(user_id).await?;
        let raw = client.gateway().update_event(&access_token, external_id, draft).await?;
        self.store_mapped(raw, provider, user_id).await
    }

    /// Delete a vendor event, then drop the local copy.
    pub async fn delete_event(
        &self,
        user_id: &str,
        provider: Provider,
        external_id: &str,
    ) -> Result<()> {
        let client = self.client(provider)?;
        let access_token = client.ensure_access_token(user_id).await?;
        client.gateway().delete_event(&access_token, external_id).await?;

        let removed = self.events.delete_event(user_id, provider, external_id).await?;
        info!(user_id, %provider, external_id, removed, "deleted calendar event");
        Ok(())
    }

    pub fn event_store(&self) -> &Arc<dyn CalendarEventStore> {
        &self.events
    }

    pub fn integration_store(&self) -> &Arc<dyn IntegrationStore> {
        &self.integrations
    }

    /// Committed-write notifications from the local store.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.events.subscribe()
    }

    async fn store_mapped(
        &self,
        raw: dayplan_core::RawCalendarEvent,
        provider: Provider,
        user_id: &str,
    ) -> Result<CalendarEventRecord> {
        match map_raw_event(raw, provider, user_id) {
            Some(EventChange::Upsert(record)) => {
                self.events.upsert_event(record.clone()).await?;
                Ok(record)
            }
            _ => Err(DayplanError::Internal(format!(
                "{provider} returned an event that cannot be stored"
            ))),
        }
    }

    fn client(&self, provider: Provider) -> Result<CalendarClient> {
        let gateway = self
            .gateways
            .get(&provider)
            .ok_or_else(|| DayplanError::Config(format!("no {provider} gateway configured")))?;
        Ok(CalendarClient::new(gateway.clone(), self.integrations.clone()))
    }

    fn sync_lock(&self, user_id: &str, provider: Provider) -> Arc<TokioMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry((user_id.to_string(), provider)).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};
    use dayplan_core::{EventPage, EventQuery, RawCalendarEvent, RawEventTime, TokenRefresh};
    use dayplan_domain::IntegrationRecord;

    use super::*;

    struct CountingGateway {
        provider: Provider,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl CountingGateway {
        fn new(provider: Provider) -> Self {
            Self { provider, in_flight: AtomicUsize::new(0), max_in_flight: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl CalendarGateway for CountingGateway {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn fetch_page(&self, _: &str, _: &EventQuery) -> Result<EventPage> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(StdDuration::from_millis(25)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(EventPage { events: Vec::new(), next_page_token: None, next_sync_token: None })
        }

        async fn refresh_token(&self, _: &str) -> Result<TokenRefresh> {
            unreachable!("tokens in these tests never expire")
        }

        async fn create_event(&self, _: &str, draft: &EventDraft) -> Result<RawCalendarEvent> {
            Ok(raw_from_draft("created-1", draft))
        }

        async fn update_event(
            &self,
            _: &str,
            external_id: &str,
            draft: &EventDraft,
        ) -> Result<RawCalendarEvent> {
            Ok(raw_from_draft(external_id, draft))
        }

        async fn delete_event(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn raw_from_draft(id: &str, draft: &EventDraft) -> RawCalendarEvent {
        RawCalendarEvent {
            id: id.to_string(),
            title: Some(draft.title.clone()),
            description: draft.description.clone(),
            location: draft.location.clone(),
            start: RawEventTime::DateTime(format!(
                "{}T{}Z",
                draft.start_date,
                draft.start_time.unwrap_or(chrono::NaiveTime::MIN)
            )),
            end: RawEventTime::DateTime(format!(
                "{}T{}Z",
                draft.end_date,
                draft.end_time.unwrap_or(chrono::NaiveTime::MIN)
            )),
            cancelled: false,
            color_id: None,
            calendar_id: "primary".to_string(),
            calendar_name: "primary".to_string(),
            calendar_color: None,
            recurring_event_id: None,
            html_link: None,
        }
    }

    struct MemoryEvents {
        rows: Mutex<Vec<CalendarEventRecord>>,
        changes: tokio::sync::broadcast::Sender<StoreChange>,
    }

    impl MemoryEvents {
        fn new() -> Self {
            let (changes, _) = tokio::sync::broadcast::channel(8);
            Self { rows: Mutex::new(Vec::new()), changes }
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
            _: &str,
            _: Provider,
            _: &SyncWindow,
            records: Vec<CalendarEventRecord>,
        ) -> Result<usize> {
            Ok(records.len())
        }

        async fn events_in_range(
            &self,
            _: &str,
            _: NaiveDate,
            _: NaiveDate,
        ) -> Result<Vec<CalendarEventRecord>> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn events_for_day(&self, _: &str, _: NaiveDate) -> Result<Vec<CalendarEventRecord>> {
            Ok(self.rows.lock().unwrap().clone())
        }

        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StoreChange> {
            self.changes.subscribe()
        }
    }

    struct MemoryIntegrations {
        records: Mutex<Vec<IntegrationRecord>>,
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

        async fn set_sync_token(&self, _: &str, _: Provider, _: &str) -> Result<()> {
            Ok(())
        }

        async fn clear_sync_token(&self, _: &str, _: Provider) -> Result<()> {
            Ok(())
        }
    }

    fn service_with(gateway: Arc<CountingGateway>) -> SyncService {
        let integrations = Arc::new(MemoryIntegrations {
            records: Mutex::new(vec![IntegrationRecord {
                user_id: "u1".to_string(),
                provider: gateway.provider(),
                access_token: "tok".to_string(),
                refresh_token: None,
                expires_at: None,
                sync_token: None,
                last_synced_at: None,
            }]),
        });
        let mut service =
            SyncService::new(Arc::new(MemoryEvents::new()), integrations, SyncWindow::default());
        service.register_gateway(gateway);
        service
    }

    fn draft() -> EventDraft {
        EventDraft {
            title: "Planning".to_string(),
            description: None,
            location: None,
            is_all_day: false,
            start_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            start_time: Some(chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            end_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            end_time: Some(chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn concurrent_syncs_for_the_same_pair_serialize() {
        let gateway = Arc::new(CountingGateway::new(Provider::Google));
        let service = Arc::new(service_with(gateway.clone()));

        let a = tokio::spawn({
            let service = service.clone();
            async move { service.sync("u1", Provider::Google).await }
        });
        let b = tokio::spawn({
            let service = service.clone();
            async move { service.sync("u1", Provider::Google).await }
        });

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(gateway.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_event_writes_through_to_the_store() {
        let gateway = Arc::new(CountingGateway::new(Provider::Google));
        let service = service_with(gateway);

        let record = service.create_event("u1", Provider::Google, &draft()).await.unwrap();
        assert_eq!(record.external_id, "created-1");
        assert_eq!(record.title, "Planning");

        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let stored = service.event_store().events_for_day("u1", day).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn delete_event_removes_the_local_copy() {
        let gateway = Arc::new(CountingGateway::new(Provider::Google));
        let service = service_with(gateway);

        service.create_event("u1", Provider::Google, &draft()).await.unwrap();
        service.delete_event("u1", Provider::Google, "created-1").await.unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let stored = service.event_store().events_for_day("u1", day).await.unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn unknown_provider_is_a_config_error() {
        let gateway = Arc::new(CountingGateway::new(Provider::Google));
        let service = service_with(gateway);

        let err = service.sync("u1", Provider::Microsoft).await.unwrap_err();
        assert!(matches!(err, DayplanError::Config(_)));
    }
}
