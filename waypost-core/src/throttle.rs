//! Minimum-interval gate for delivery attempts
//!
//! The gate measures from *attempt* time, not from confirmed success: the
//! caller marks the attempt immediately upon deciding to proceed, before the
//! outcome is known. A failed delivery therefore still consumes throttle
//! budget, giving "at most one attempt per interval" rather than "at most
//! one success per interval".

use crate::db::StateStore;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Store key holding the last-attempt timestamp
const LAST_ACTION_KEY: &str = "waypost.last_action_at";

/// Returns true if enough time has elapsed since the last attempt to act
/// again. A missing `last_action_at` always admits the attempt.
pub fn should_proceed(
    now: DateTime<Utc>,
    last_action_at: Option<DateTime<Utc>>,
    min_interval: Duration,
) -> bool {
    match last_action_at {
        None => true,
        Some(last) => now - last >= min_interval,
    }
}

/// Persisted gate state over the key-value store
pub struct ThrottleGate {
    store: Arc<StateStore>,
}

impl ThrottleGate {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// When the last delivery attempt was admitted, if ever
    pub fn last_action_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.store.get(LAST_ACTION_KEY)
    }

    /// Whether an attempt at `now` is admitted
    pub fn check(&self, now: DateTime<Utc>, min_interval: Duration) -> Result<bool> {
        Ok(should_proceed(now, self.last_action_at()?, min_interval))
    }

    /// Record that an attempt was admitted at `now`.
    ///
    /// Must be called before the attempt's outcome is known (see module
    /// docs).
    pub fn mark_attempt(&self, now: DateTime<Utc>) -> Result<()> {
        self.store.set(LAST_ACTION_KEY, &now)
    }
}
