//! Periodic calendar sync scheduler.
//!
//! Cron-driven scheduler that runs a sync cycle for every configured user
//! and every registered provider. Join handles are tracked, cancellation is
//! explicit, and every asynchronous operation is wrapped in a timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::calendar::SyncService;
use crate::scheduling::error::{SchedulerError, SchedulerResult};
use dayplan_domain::DayplanError;

/// Configuration for the sync scheduler.
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Cron expression describing the execution schedule.
    pub cron_expression: String,
    /// User ids to sync on every tick.
    pub users: Vec<String>,
    /// Timeout applied to a single batch execution.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 0 */2 * * *".into(), // every 2 hours
            users: Vec::new(),
            job_timeout: Duration::from_secs(300),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Calendar sync scheduler with explicit lifecycle management.
pub struct SyncScheduler {
    scheduler: Option<JobScheduler>,
    config: SyncSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    service: Arc<SyncService>,
}

impl SyncScheduler {
    pub fn new(
        cron_expression: String,
        users: Vec<String>,
        service: Arc<SyncService>,
    ) -> SchedulerResult<Self> {
        let config = SyncSchedulerConfig { cron_expression, users, ..Default::default() };
        Self::with_config(config, service)
    }

    pub fn with_config(
        config: SyncSchedulerConfig,
        service: Arc<SyncService>,
    ) -> SchedulerResult<Self> {
        Ok(Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            service,
        })
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        let start_result = tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?;

        start_result.map_err(|source| SchedulerError::StartFailed { source })?;

        self.scheduler = Some(scheduler_instance);

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            Self::monitor_task(cancel).await;
        });

        self.monitor_handle = Some(handle);
        info!("sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let mut scheduler = match self.scheduler.take() {
            Some(scheduler) => scheduler,
            None => return Err(SchedulerError::NotRunning),
        };

        let stop_timeout = self.config.stop_timeout;
        let stop_result =
            tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
                .await
                .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?;

        stop_result.map_err(|source| SchedulerError::StopFailed { source })?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??
        }

        info!("sync scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a scheduler instance is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler =
            JobScheduler::new().await.map_err(|source| SchedulerError::CreationFailed { source })?;

        let cron_expr = self.config.cron_expression.clone();
        let service = self.service.clone();
        let job_timeout = self.config.job_timeout;
        let users = self.config.users.clone();

        let job_definition = Job::new_async(cron_expr.as_str(), move |_id, _lock| {
            let service = service.clone();
            let users = users.clone();

            Box::pin(async move {
                let started = Instant::now();

                match tokio::time::timeout(job_timeout, Self::run_batch(service, users)).await {
                    Ok(()) => {
                        debug!(elapsed = ?started.elapsed(), "sync batch finished");
                    }
                    Err(elapsed) => {
                        warn!(timeout_secs = job_timeout.as_secs(), "sync batch timed out");
                        debug!(?elapsed, "timeout details");
                    }
                }
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        let job_id = job_definition.guid();
        scheduler
            .add(job_definition)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "registered sync job");
        Ok(scheduler)
    }

    /// One scheduled tick: sync every configured user against every
    /// registered provider. Users without an integration for a provider are
    /// skipped; real failures are logged and do not stop the batch.
    async fn run_batch(service: Arc<SyncService>, users: Vec<String>) {
        if users.is_empty() {
            debug!("no users configured for periodic sync");
            return;
        }

        let providers = service.providers();
        info!(user_count = users.len(), provider_count = providers.len(), "starting sync batch");

        let mut total_synced = 0usize;
        let mut errors = 0usize;

        for user_id in &users {
            for provider in &providers {
                match service.sync(user_id, *provider).await {
                    Ok(outcome) => {
                        total_synced += outcome.events_synced;
                        debug!(
                            user_id,
                            provider = %provider,
                            events_synced = outcome.events_synced,
                            "periodic sync succeeded"
                        );
                    }
                    Err(DayplanError::NotFound(_)) => {
                        debug!(user_id, provider = %provider, "no integration, skipping");
                    }
                    Err(err) => {
                        errors += 1;
                        error!(user_id, provider = %provider, error = %err, "periodic sync failed");
                    }
                }
            }
        }

        info!(total_users = users.len(), total_synced, errors, "sync batch completed");
    }

    async fn monitor_task(cancel: CancellationToken) {
        cancel.cancelled().await;
        debug!("sync scheduler monitor cancelled");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use dayplan_core::SyncWindow;

    use super::*;
    use crate::database::{SqliteCalendarEventStore, SqliteIntegrationStore};
    use crate::storage::DbPool;

    fn empty_service() -> Arc<SyncService> {
        let pool = Arc::new(DbPool::in_memory().expect("pool"));
        let events = Arc::new(SqliteCalendarEventStore::new(pool.clone()));
        let integrations = Arc::new(SqliteIntegrationStore::new(pool));
        Arc::new(SyncService::new(events, integrations, SyncWindow::default()))
    }

    fn fast_config() -> SyncSchedulerConfig {
        SyncSchedulerConfig {
            cron_expression: "* * * * * *".into(),
            users: vec!["u1".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_runs_successfully() {
        let mut scheduler =
            SyncScheduler::with_config(fast_config(), empty_service()).expect("scheduler created");

        scheduler.start().await.expect("start succeeds");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        scheduler.stop().await.expect("stop succeeds");

        assert!(!scheduler.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_start_is_rejected() {
        let mut scheduler =
            SyncScheduler::with_config(fast_config(), empty_service()).expect("scheduler created");

        scheduler.start().await.expect("first start");
        let err = scheduler.start().await.expect_err("second start fails");
        assert!(matches!(err, SchedulerError::AlreadyRunning));
        scheduler.stop().await.expect("stop succeeds");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restart_after_stop_succeeds() {
        let mut scheduler =
            SyncScheduler::with_config(fast_config(), empty_service()).expect("scheduler created");

        scheduler.start().await.expect("start succeeds");
        scheduler.stop().await.expect("stop succeeds");
        assert!(!scheduler.is_running());

        scheduler.start().await.expect("start again");
        scheduler.stop().await.expect("stop again");
    }

    #[tokio::test]
    async fn stop_without_start_is_rejected() {
        let mut scheduler =
            SyncScheduler::with_config(fast_config(), empty_service()).expect("scheduler created");

        let err = scheduler.stop().await.expect_err("stop fails");
        assert!(matches!(err, SchedulerError::NotRunning));
    }
}
