//! # dayplan Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite repositories (calendar events, integrations)
//! - HTTP client with retry support
//! - Calendar provider gateways (Google Calendar, Microsoft Graph)
//! - Sync worker and trigger service
//! - Cron scheduler for periodic sync
//! - Task suggestion client (Anthropic Messages API)
//!
//! ## Architecture
//! - Implements traits defined in `dayplan-core`
//! - Depends on `dayplan-domain` and `dayplan-core`
//! - Contains all "impure" code (I/O, vendor APIs)

pub mod ai;
pub mod calendar;
pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod scheduling;
pub mod storage;

pub use ai::{EmailSource, SuggestionClient};
pub use calendar::{CalendarClient, CalendarSyncWorker, SyncService};
pub use database::{SqliteCalendarEventStore, SqliteIntegrationStore};
pub use errors::InfraError;
pub use http::HttpClient;
pub use storage::DbPool;
