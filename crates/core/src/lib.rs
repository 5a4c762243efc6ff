//! # dayplan Core
//!
//! Pure business logic: port interfaces, the vendor-to-record field
//! mapper, and the reconciler that applies mapped changes to the local
//! store.
//!
//! ## Architecture
//! - Defines the traits infrastructure implements
//! - No I/O beyond the port boundaries
//! - Depends only on `dayplan-domain`

pub mod calendar;

pub use calendar::ports::{
    CalendarEventStore, CalendarGateway, Cursor, EventDraft, EventPage, EventQuery,
    IntegrationStore, RawCalendarEvent, RawEventTime, TokenRefresh,
};
pub use calendar::reconcile::{apply_changes, ReconcileSummary};
pub use calendar::window::SyncWindow;
