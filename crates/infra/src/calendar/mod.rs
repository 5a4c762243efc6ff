//! Calendar integration: vendor gateways, token management, and the sync
//! pipeline.

mod client;
pub mod providers;
mod service;
mod sync;

pub use client::CalendarClient;
pub use providers::{create_gateway, GoogleCalendarGateway, GoogleConfig, MicrosoftCalendarGateway, MicrosoftConfig};
pub use service::SyncService;
pub use sync::CalendarSyncWorker;
