//! Reconciler: applies mapped changes to the local store
//!
//! Two strategies, per the fetch mode:
//! - incremental upsert with tombstones ([`apply_changes`]) for delta
//!   feeds driven by a sync token; idempotent, so replaying a batch is
//!   harmless.
//! - full window replace (delegated to
//!   [`CalendarEventStore::replace_window`]) for token-less fetches that
//!   cover the whole window; runs as one transaction.
//!
//! Postcondition of either: local rows for the covered provider and
//! window are set-equal to the vendor's reported state.

use dayplan_domain::{EventChange, Provider, Result};
use tracing::{debug, error};

use super::ports::CalendarEventStore;

/// Counts from one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub upserted: usize,
    pub deleted: usize,
    /// Records the store refused (constraint or I/O failure on a single
    /// row). The rest of the batch still applies.
    pub skipped: usize,
}

/// Apply a batch of changes with the incremental strategy.
///
/// Upserts are keyed by `(external_id, provider, user_id)` inside the
/// store, so replaying the same batch leaves the store unchanged.
/// Tombstones delete quietly when the row is already gone.
pub async fn apply_changes(
    store: &dyn CalendarEventStore,
    user_id: &str,
    provider: Provider,
    changes: Vec<EventChange>,
) -> Result<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();

    for change in changes {
        match change {
            EventChange::Upsert(record) => {
                let external_id = record.external_id.clone();
                match store.upsert_event(record).await {
                    Ok(()) => summary.upserted += 1,
                    Err(e) => {
                        error!(external_id, error = %e, "failed to store calendar event");
                        summary.skipped += 1;
                    }
                }
            }
            EventChange::Delete { external_id } => {
                match store.delete_event(user_id, provider, &external_id).await {
                    Ok(existed) => {
                        if existed {
                            summary.deleted += 1;
                        } else {
                            debug!(external_id, "tombstone for unknown event, nothing to delete");
                        }
                    }
                    Err(e) => {
                        error!(external_id, error = %e, "failed to delete calendar event");
                        summary.skipped += 1;
                    }
                }
            }
        }
    }

    Ok(summary)
}
