//! Core domain types for waypost
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Sample** | One captured position reading with its capture timestamp |
//! | **Batch** | The full ordered set of currently unsent samples |
//! | **Target** | The configured delivery endpoint and request headers |
//! | **Trigger** | Any external event that supplies a sample or requests a flush |
//! | **Throttle interval** | Minimum wall-clock time between delivery attempts |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================
// Sample
// ============================================

/// A single captured position reading.
///
/// Immutable once created: samples enter the buffer on capture and leave it
/// only after the server confirms delivery (or the serialization safety
/// valve fires).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// When the position was captured
    pub captured_at: DateTime<Utc>,
}

impl Sample {
    /// Create a sample from a position reading and its capture time
    pub fn new(latitude: f64, longitude: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            captured_at,
        }
    }
}

// ============================================
// Delivery target
// ============================================

/// Where and how to deliver buffered samples.
///
/// Set once via [`Tracker::configure`](crate::Tracker::configure), persisted
/// in the state store, and read-only until reconfigured or
/// [`stop`](crate::Tracker::stop)ped. Delivery is a no-op while no target is
/// configured; captured samples stay buffered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    /// Endpoint URL for the POST request
    pub endpoint: String,
    /// Request headers; `Content-Type: application/json` is forced on top
    pub headers: HashMap<String, String>,
}

// ============================================
// Triggers
// ============================================

/// The external event that invoked the pipeline.
///
/// Carried for logging context only; the pipeline behaves identically for
/// every capture-path trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// OS-level significant-change callback
    SignificantChange,
    /// Periodic position refresh
    PeriodicRefresh,
    /// Push-initiated wake-up carrying a position
    PushWake,
    /// Explicit flush request (no new sample)
    ForcedFlush,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::SignificantChange => "significant_change",
            TriggerKind::PeriodicRefresh => "periodic_refresh",
            TriggerKind::PushWake => "push_wake",
            TriggerKind::ForcedFlush => "forced_flush",
        }
    }
}

// ============================================
// Flush outcomes
// ============================================

/// Observable result of one entry-point invocation.
///
/// Delivery failures are outcomes, not errors: the pipeline logs them and
/// retries on the next trigger with the same (possibly grown) batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The server accepted the batch; `sent` samples were pruned
    Delivered { sent: usize },
    /// Nothing was attempted (deliberate no-op)
    Skipped(SkipReason),
    /// An attempt was made and failed; the buffer is preserved, except for
    /// the serialization safety valve
    Failed(FailureKind),
}

/// Why an invocation deliberately did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Tracking is disabled; the sample was dropped
    TrackingDisabled,
    /// The minimum interval since the last attempt has not elapsed
    Throttled,
    /// No unsent samples to deliver
    EmptyBuffer,
    /// No delivery target configured; samples stay buffered
    NotConfigured,
}

/// How a delivery attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection, DNS, or deadline failure before a response arrived
    Transport,
    /// The server answered outside [200, 300)
    Status(u16),
    /// The batch could not be encoded; the buffer was reset
    Serialization,
}
