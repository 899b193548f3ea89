//! Rollup of duplicate errors into a recent matching record

use chrono::{DateTime, Duration, Utc};

use super::limits::{truncate, APPLICATION_NAME_MAX};
use crate::domain::ErrorRecord;

/// Default rollup window in seconds
pub const DEFAULT_ROLLUP_SECONDS: u64 = 600;

/// Time window inside which errors with equal hashes collapse into one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupPolicy {
    window: Option<Duration>,
}

/// Where to look for an existing record to merge into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupQuery {
    pub error_hash: i64,
    pub application_name: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl RollupPolicy {
    pub fn disabled() -> Self {
        Self { window: None }
    }

    pub fn new(window: Duration) -> Self {
        if window <= Duration::zero() {
            return Self::disabled();
        }
        Self { window: Some(window) }
    }

    /// `0` disables rollup
    pub fn from_seconds(seconds: u64) -> Self {
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        Self::new(Duration::seconds(seconds))
    }

    pub fn window(&self) -> Option<Duration> {
        self.window
    }

    /// The lookup to run for `error`, or `None` when it must be inserted as-is
    pub fn candidate(&self, error: &ErrorRecord, now: DateTime<Utc>) -> Option<RollupQuery> {
        let window = self.window?;
        let error_hash = error.error_hash?;

        Some(RollupQuery {
            error_hash,
            application_name: truncate(&error.application_name, APPLICATION_NAME_MAX).to_string(),
            window_start: now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC),
            window_end: now,
        })
    }
}

impl Default for RollupPolicy {
    fn default() -> Self {
        Self::from_seconds(DEFAULT_ROLLUP_SECONDS)
    }
}

impl RollupQuery {
    /// Whether an existing record qualifies as the merge target
    pub fn matches(&self, existing: &ErrorRecord) -> bool {
        existing.deletion_date.is_none()
            && existing.error_hash == Some(self.error_hash)
            && truncate(&existing.application_name, APPLICATION_NAME_MAX) == self.application_name
            && existing.creation_date >= self.window_start
            && existing.creation_date <= self.window_end
    }
}
