use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::core::{add_std, until};
use crate::history::HistoryStore;

/// When the next rotation is due. Always derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationSchedule {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub last_success_at: Option<DateTime<Utc>>,
    pub next_due_at: DateTime<Utc>,
}

impl RotationSchedule {
    /// `last_success_at + interval`, or `now` when there has never been a
    /// success.
    pub fn compute(
        interval: Duration,
        last_success_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let next_due_at = last_success_at.map_or(now, |at| add_std(at, interval));
        Self {
            interval,
            last_success_at,
            next_due_at,
        }
    }

    pub fn from_history(history: &HistoryStore, interval: Duration, now: DateTime<Utc>) -> Self {
        Self::compute(
            interval,
            history.last_success().map(|record| record.timestamp),
            now,
        )
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_due_at
    }

    /// Zero once due.
    pub fn time_until_due(&self, now: DateTime<Utc>) -> Duration {
        until(now, self.next_due_at)
    }
}
