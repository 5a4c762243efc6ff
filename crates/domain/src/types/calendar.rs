//! Calendar domain types
//!
//! The local store holds a disposable copy of vendor calendar data; the
//! vendor API is the source of truth and every local row can be rebuilt
//! from a fresh sync.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DayplanError;

/// Calendar provider identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Microsoft,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
        }
    }

    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Microsoft];
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = DayplanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "microsoft" => Ok(Self::Microsoft),
            other => Err(DayplanError::InvalidInput(format!("unknown provider: {other}"))),
        }
    }
}

/// One synced calendar entry as stored locally.
///
/// Identity is `(external_id, provider, user_id)`; `id` is a synthesized
/// row id. For all-day events `end_date` is inclusive (vendor APIs report
/// an exclusive end date, the mapper subtracts one day) and both times are
/// `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEventRecord {
    pub id: String,
    pub external_id: String,
    pub provider: Provider,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_date: NaiveDate,
    pub end_time: Option<NaiveTime>,
    pub is_all_day: bool,
    pub color_hex: Option<String>,
    pub calendar_id: String,
    pub calendar_name: String,
    pub is_recurring: bool,
    pub html_link: Option<String>,
}

/// One reconcile instruction derived from a vendor event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventChange {
    /// Insert-or-update keyed by `(external_id, provider, user_id)`.
    Upsert(CalendarEventRecord),
    /// Vendor-reported cancellation tombstone.
    Delete { external_id: String },
}

/// Per-user, per-provider integration credentials plus sync cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationRecord {
    pub user_id: String,
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Opaque continuation token; absent until the vendor hands one out.
    pub sync_token: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl IntegrationRecord {
    /// Whether the access token is past (or at) its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Result of one completed sync cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub provider: Provider,
    pub events_synced: usize,
    pub events_deleted: usize,
    pub events_skipped: usize,
    pub last_synced_at: DateTime<Utc>,
}

/// Change notification emitted by the local store after a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub user_id: String,
    pub provider: Provider,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_through_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!("caldav".parse::<Provider>().is_err());
    }

    #[test]
    fn expiry_check_handles_missing_expiry() {
        let record = IntegrationRecord {
            user_id: "u1".into(),
            provider: Provider::Google,
            access_token: "tok".into(),
            refresh_token: None,
            expires_at: None,
            sync_token: None,
            last_synced_at: None,
        };
        assert!(!record.is_expired(Utc::now()));
    }
}
