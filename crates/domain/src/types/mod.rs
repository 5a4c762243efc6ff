//! Domain types and models

pub mod calendar;
pub mod suggestion;

pub use calendar::{
    CalendarEventRecord, EventChange, IntegrationRecord, Provider, StoreChange, SyncOutcome,
};
pub use suggestion::SuggestedTask;
