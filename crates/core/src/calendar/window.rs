//! Sync window arithmetic

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Bounded time window for a token-less (initial or full) sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub lookback_days: i64,
    pub lookahead_days: i64,
}

impl Default for SyncWindow {
    fn default() -> Self {
        // Initial sync covers yesterday through two months out.
        Self { lookback_days: 1, lookahead_days: 60 }
    }
}

impl SyncWindow {
    pub fn new(lookback_days: i64, lookahead_days: i64) -> Self {
        Self { lookback_days, lookahead_days }
    }

    /// UTC bounds `[now - lookback, now + lookahead)`.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - Duration::days(self.lookback_days), now + Duration::days(self.lookahead_days))
    }

    /// Date bounds used by the store when replacing a window.
    pub fn date_bounds(&self, now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
        let (min, max) = self.bounds(now);
        (min.date_naive(), max.date_naive())
    }
}
