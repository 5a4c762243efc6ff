use std::sync::Arc;

use dayplan_infra::{SuggestionClient, SyncService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SyncService>,
    /// Absent when no suggestion API key is configured.
    pub suggestions: Option<Arc<SuggestionClient>>,
}

impl AppState {
    pub fn new(service: Arc<SyncService>, suggestions: Option<Arc<SuggestionClient>>) -> Self {
        Self { service, suggestions }
    }
}
