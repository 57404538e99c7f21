//! Last observed provider rate-limit budget.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::provider::RateLimitSnapshot;

/// Tracks `limit`, `remaining` and `reset_epoch` across all provider calls.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    state: Mutex<RateLimitSnapshot>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the fields present in `snapshot` into the tracked state.
    pub fn observe(&self, snapshot: &RateLimitSnapshot) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if snapshot.limit.is_some() {
            state.limit = snapshot.limit;
        }
        if snapshot.remaining.is_some() {
            state.remaining = snapshot.remaining;
        }
        if snapshot.reset_epoch.is_some() {
            state.reset_epoch = snapshot.reset_epoch;
        }
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time left until the budget refills, when it is exhausted.
    ///
    /// Returns `None` while requests remain or no reset time is known. A reset
    /// already in the past yields a zero duration.
    pub fn wait_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        let state = self.snapshot();
        if state.remaining != Some(0) {
            return None;
        }
        let reset_epoch = state.reset_epoch?;
        let seconds = reset_epoch.saturating_sub(now.timestamp()).max(0);
        Some(Duration::from_secs(seconds.unsigned_abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exhausted(reset_epoch: i64) -> RateLimitSnapshot {
        RateLimitSnapshot {
            limit: Some(60),
            remaining: Some(0),
            reset_epoch: Some(reset_epoch),
        }
    }

    #[test]
    fn wait_equals_time_until_reset() {
        let tracker = RateLimitTracker::new();
        let now = Utc::now();
        tracker.observe(&exhausted(now.timestamp() + 5));

        assert_eq!(tracker.wait_duration(now), Some(Duration::from_secs(5)));
    }

    #[test]
    fn wait_is_never_negative() {
        let tracker = RateLimitTracker::new();
        let now = Utc::now();
        tracker.observe(&exhausted(now.timestamp() - 30));

        assert_eq!(tracker.wait_duration(now), Some(Duration::ZERO));
    }

    #[test]
    fn no_wait_while_budget_remains() {
        let tracker = RateLimitTracker::new();
        assert_eq!(tracker.wait_duration(Utc::now()), None);

        tracker.observe(&RateLimitSnapshot {
            limit: Some(5000),
            remaining: Some(12),
            reset_epoch: Some(Utc::now().timestamp() + 600),
        });
        assert_eq!(tracker.wait_duration(Utc::now()), None);
    }

    #[test]
    fn partial_observations_keep_known_fields() {
        let tracker = RateLimitTracker::new();
        tracker.observe(&exhausted(1_700_000_000));
        tracker.observe(&RateLimitSnapshot {
            remaining: Some(3),
            ..RateLimitSnapshot::default()
        });

        let state = tracker.snapshot();
        assert_eq!(state.limit, Some(60));
        assert_eq!(state.remaining, Some(3));
        assert_eq!(state.reset_epoch, Some(1_700_000_000));
    }
}
