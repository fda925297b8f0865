//! # waypost-core
//!
//! Core library for waypost - a store-and-forward delivery pipeline for
//! opportunistically captured location samples.
//!
//! This library provides:
//! - A durable SQLite-backed key-value store for all tracker state
//! - An ordered, crash-safe buffer of unsent samples
//! - Minimum-interval throttling of delivery attempts
//! - Batched HTTP delivery with at-least-once semantics
//!
//! ## Architecture
//!
//! Every external trigger funnels into one [`Tracker`]:
//!
//! ```text
//! capture callback ──► Tracker::on_sample_captured ──► SampleBuffer.append
//! forced wake-up   ──► Tracker::force_flush              │
//!                                ▼                       ▼
//!                          ThrottleGate ──(admitted)──► DeliveryClient
//!                                                        │ 2xx: prune batch
//!                                                        │ else: keep batch,
//!                                                        ▼       retry later
//!                                                   StateStore (SQLite)
//! ```
//!
//! Samples leave the buffer only after the server confirms receipt, so a
//! process kill at any point re-delivers rather than loses. The one
//! exception is the serialization safety valve: a batch that cannot be
//! encoded is dropped whole instead of poisoning every later attempt.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use waypost_core::{Config, Sample, Tracker, TriggerKind};
//!
//! # async fn run() -> waypost_core::Result<()> {
//! let config = Config::load()?;
//! let tracker = Tracker::open(&config)?;
//!
//! tracker.configure("https://api.example.com/locations", HashMap::new()).await?;
//!
//! // Called by the host whenever a new position is available
//! let sample = Sample::new(48.2082, 16.3738, chrono::Utc::now());
//! tracker.on_sample_captured(sample, TriggerKind::SignificantChange).await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::{Config, TrackingConfig};
pub use db::StateStore;
pub use error::{Error, Result};
pub use tracker::{SyncTracker, Tracker};
pub use types::*;

// Public modules
pub mod buffer;
pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod throttle;
pub mod tracker;
pub mod types;
