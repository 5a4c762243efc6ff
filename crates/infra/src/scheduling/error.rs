//! Scheduler error types

use std::time::Duration;

use dayplan_domain::DayplanError;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::error::Elapsed;
use tokio_cron_scheduler::JobSchedulerError;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler already running")]
    AlreadyRunning,

    #[error("Scheduler not running")]
    NotRunning,

    #[error("Failed to create scheduler: {source}")]
    CreationFailed { source: JobSchedulerError },

    #[error("Failed to start scheduler: {source}")]
    StartFailed { source: JobSchedulerError },

    #[error("Failed to stop scheduler: {source}")]
    StopFailed { source: JobSchedulerError },

    #[error("Failed to register job: {source}")]
    JobRegistrationFailed { source: JobSchedulerError },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration, source: Elapsed },

    #[error("Task join failed: {0}")]
    TaskJoinFailed(#[from] JoinError),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let domain_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                DayplanError::InvalidInput(err.to_string())
            }
            _ => DayplanError::Internal(err.to_string()),
        };
        InfraError(domain_err)
    }
}

impl From<SchedulerError> for DayplanError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
