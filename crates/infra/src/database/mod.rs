//! SQLite-backed implementations of the core store ports

mod calendar_event_repository;
mod integration_repository;

pub use calendar_event_repository::SqliteCalendarEventStore;
pub use integration_repository::SqliteIntegrationStore;
