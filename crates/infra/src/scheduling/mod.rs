//! Background scheduling infrastructure

mod error;
mod sync_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use sync_scheduler::{SyncScheduler, SyncSchedulerConfig};
