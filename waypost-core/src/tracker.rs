//! Capture entry point and pipeline orchestration
//!
//! The [`Tracker`] is the single place every external trigger lands:
//! capture callbacks, forced wake-ups, and the startup collaborator's
//! `configure`/`set_enabled` calls. All state mutations (buffer, throttle,
//! target, enabled flag) happen behind one async mutex, and the lock is
//! held across the delivery await, so at most one delivery is ever in
//! flight per tracker and no capture can interleave with a flush.
//!
//! Construct one tracker at process startup and hand it to the
//! collaborators that need it; there is deliberately no shared global
//! instance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::buffer::SampleBuffer;
use crate::config::{Config, TrackingConfig};
use crate::db::StateStore;
use crate::delivery::client::validate_target;
use crate::delivery::{DeliveryClient, DeliveryError};
use crate::error::Result;
use crate::throttle::ThrottleGate;
use crate::types::{DeliveryTarget, FailureKind, FlushOutcome, Sample, SkipReason, TriggerKind};

/// Store key holding the persisted delivery target
const TARGET_KEY: &str = "waypost.delivery_target";

/// Store key holding the tracking-enabled flag
const ENABLED_KEY: &str = "waypost.enabled";

/// The store-and-forward location tracker
pub struct Tracker {
    inner: Mutex<Inner>,
}

struct Inner {
    store: Arc<StateStore>,
    buffer: SampleBuffer,
    throttle: ThrottleGate,
    client: DeliveryClient,
    min_interval: chrono::Duration,
}

impl Tracker {
    /// Open a tracker over the default on-disk state store
    pub fn open(config: &Config) -> Result<Self> {
        let store = Arc::new(StateStore::open(&Config::database_path())?);
        store.migrate()?;
        Self::with_store(store, &config.tracking)
    }

    /// Open a tracker over an existing (already migrated) store
    pub fn with_store(store: Arc<StateStore>, tracking: &TrackingConfig) -> Result<Self> {
        tracking.validate()?;

        let client = DeliveryClient::new(Duration::from_secs(tracking.request_timeout_secs))?;

        Ok(Self {
            inner: Mutex::new(Inner {
                buffer: SampleBuffer::new(store.clone()),
                throttle: ThrottleGate::new(store.clone()),
                client,
                min_interval: chrono::Duration::seconds(tracking.min_interval_secs as i64),
                store,
            }),
        })
    }

    /// Set the delivery target and enable tracking.
    ///
    /// Both survive a process restart; a relaunched host only needs to feed
    /// new samples. Fails without persisting anything if the endpoint is not
    /// a URL or a header cannot be represented on the wire.
    pub async fn configure(&self, endpoint: &str, headers: HashMap<String, String>) -> Result<()> {
        let inner = self.inner.lock().await;

        let target = DeliveryTarget {
            endpoint: endpoint.to_string(),
            headers,
        };
        validate_target(&target)?;

        inner.store.set(TARGET_KEY, &target)?;
        inner.store.set(ENABLED_KEY, &true)?;

        tracing::info!(endpoint = %target.endpoint, "delivery target configured; tracking enabled");
        Ok(())
    }

    /// Enable or disable processing of captured samples.
    ///
    /// Disabling drops future captures but keeps the buffer and target, so
    /// re-enabling resumes exactly where tracking paused.
    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        let inner = self.inner.lock().await;
        inner.store.set(ENABLED_KEY, &enabled)?;
        tracing::info!(enabled, "tracking flag updated");
        Ok(())
    }

    /// Stop tracking: disable capture and drop the persisted target and
    /// buffer.
    pub async fn stop(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        inner.store.set(ENABLED_KEY, &false)?;
        inner.store.delete(TARGET_KEY)?;
        inner.buffer.clear()?;
        tracing::info!("tracking stopped; persisted target and buffer cleared");
        Ok(())
    }

    /// The single function invoked whenever a new sample arrives.
    ///
    /// Appends the sample to the durable buffer, then attempts a delivery
    /// if the minimum interval since the last attempt has elapsed. The
    /// sample stays buffered for the next trigger otherwise.
    pub async fn on_sample_captured(
        &self,
        sample: Sample,
        trigger: TriggerKind,
    ) -> Result<FlushOutcome> {
        let inner = self.inner.lock().await;

        if !inner.store.get::<bool>(ENABLED_KEY)?.unwrap_or(false) {
            tracing::debug!(trigger = trigger.as_str(), "tracking disabled; sample dropped");
            return Ok(FlushOutcome::Skipped(SkipReason::TrackingDisabled));
        }

        inner.buffer.append(&sample);

        let now = Utc::now();
        if !inner.throttle.check(now, inner.min_interval)? {
            let buffered = inner.buffer.len()?;
            tracing::debug!(
                trigger = trigger.as_str(),
                buffered,
                "minimum interval not elapsed; sample buffered"
            );
            return Ok(FlushOutcome::Skipped(SkipReason::Throttled));
        }

        // Attempt time, not success time: a failed delivery still consumes
        // the throttle budget.
        inner.throttle.mark_attempt(now)?;

        Self::flush_locked(&inner, trigger, None).await
    }

    /// Attempt a delivery right now, regardless of the tracking flag and
    /// the throttle gate.
    ///
    /// For explicit wake-up events (a background refresh opportunity, say)
    /// that exist to drain whatever is buffered. Does not consume throttle
    /// budget. `deadline` bounds the whole attempt; expiry leaves the
    /// buffer pending.
    pub async fn force_flush(&self, deadline: Option<Duration>) -> Result<FlushOutcome> {
        let inner = self.inner.lock().await;
        Self::flush_locked(&inner, TriggerKind::ForcedFlush, deadline).await
    }

    /// Whether captured samples are currently processed
    pub async fn is_enabled(&self) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.store.get::<bool>(ENABLED_KEY)?.unwrap_or(false))
    }

    /// The persisted delivery target, if configured
    pub async fn delivery_target(&self) -> Result<Option<DeliveryTarget>> {
        let inner = self.inner.lock().await;
        inner.store.get(TARGET_KEY)
    }

    /// Snapshot of the unsent batch, oldest first
    pub async fn buffered(&self) -> Result<Vec<Sample>> {
        let inner = self.inner.lock().await;
        inner.buffer.snapshot()
    }

    /// When the last gated delivery attempt was admitted, if ever
    pub async fn last_attempt_at(&self) -> Result<Option<chrono::DateTime<Utc>>> {
        let inner = self.inner.lock().await;
        inner.throttle.last_action_at()
    }

    /// Deliver the current batch and prune it on success. Caller holds the
    /// tracker lock.
    async fn flush_locked(
        inner: &Inner,
        trigger: TriggerKind,
        deadline: Option<Duration>,
    ) -> Result<FlushOutcome> {
        let target = match inner.store.get::<DeliveryTarget>(TARGET_KEY)? {
            Some(target) => target,
            None => {
                tracing::warn!(
                    trigger = trigger.as_str(),
                    "no delivery target configured; samples stay buffered"
                );
                return Ok(FlushOutcome::Skipped(SkipReason::NotConfigured));
            }
        };

        let batch = inner.buffer.snapshot()?;
        if batch.is_empty() {
            tracing::debug!(trigger = trigger.as_str(), "nothing buffered; skipping delivery");
            return Ok(FlushOutcome::Skipped(SkipReason::EmptyBuffer));
        }

        match inner.client.deliver(&batch, &target, deadline).await {
            Ok(()) => {
                inner.buffer.truncate_sent(batch.len())?;
                tracing::info!(
                    trigger = trigger.as_str(),
                    sent = batch.len(),
                    "delivered buffered samples"
                );
                Ok(FlushOutcome::Delivered { sent: batch.len() })
            }
            Err(DeliveryError::Status { status, body }) => {
                tracing::warn!(
                    trigger = trigger.as_str(),
                    batch_size = batch.len(),
                    status,
                    body = %body,
                    "server rejected delivery; will retry"
                );
                Ok(FlushOutcome::Failed(FailureKind::Status(status)))
            }
            Err(DeliveryError::Transport(msg)) => {
                tracing::warn!(
                    trigger = trigger.as_str(),
                    batch_size = batch.len(),
                    error = %msg,
                    "delivery failed in transport; will retry"
                );
                Ok(FlushOutcome::Failed(FailureKind::Transport))
            }
            Err(DeliveryError::Serialization(msg)) => {
                // Safety valve: a payload that cannot be encoded would fail
                // on every future attempt and block delivery forever. Drop
                // the batch and start clean.
                tracing::error!(
                    trigger = trigger.as_str(),
                    batch_size = batch.len(),
                    error = %msg,
                    "payload serialization failed; resetting buffer"
                );
                inner.buffer.clear()?;
                Ok(FlushOutcome::Failed(FailureKind::Serialization))
            }
        }
    }
}

/// Synchronous wrapper for [`Tracker`]
///
/// Provides blocking methods for callback-style hosts that do not run a
/// tokio runtime of their own.
pub struct SyncTracker {
    inner: Tracker,
    runtime: tokio::runtime::Runtime,
}

impl SyncTracker {
    /// Open a sync tracker over the default on-disk state store
    pub fn open(config: &Config) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            inner: Tracker::open(config)?,
            runtime,
        })
    }

    /// Open a sync tracker over an existing (already migrated) store
    pub fn with_store(store: Arc<StateStore>, tracking: &TrackingConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            inner: Tracker::with_store(store, tracking)?,
            runtime,
        })
    }

    /// See [`Tracker::configure`]
    pub fn configure(&self, endpoint: &str, headers: HashMap<String, String>) -> Result<()> {
        self.runtime.block_on(self.inner.configure(endpoint, headers))
    }

    /// See [`Tracker::set_enabled`]
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.runtime.block_on(self.inner.set_enabled(enabled))
    }

    /// See [`Tracker::stop`]
    pub fn stop(&self) -> Result<()> {
        self.runtime.block_on(self.inner.stop())
    }

    /// See [`Tracker::on_sample_captured`]
    pub fn on_sample_captured(&self, sample: Sample, trigger: TriggerKind) -> Result<FlushOutcome> {
        self.runtime
            .block_on(self.inner.on_sample_captured(sample, trigger))
    }

    /// See [`Tracker::force_flush`]
    pub fn force_flush(&self, deadline: Option<Duration>) -> Result<FlushOutcome> {
        self.runtime.block_on(self.inner.force_flush(deadline))
    }

    /// See [`Tracker::is_enabled`]
    pub fn is_enabled(&self) -> Result<bool> {
        self.runtime.block_on(self.inner.is_enabled())
    }

    /// See [`Tracker::delivery_target`]
    pub fn delivery_target(&self) -> Result<Option<DeliveryTarget>> {
        self.runtime.block_on(self.inner.delivery_target())
    }

    /// See [`Tracker::buffered`]
    pub fn buffered(&self) -> Result<Vec<Sample>> {
        self.runtime.block_on(self.inner.buffered())
    }

    /// See [`Tracker::last_attempt_at`]
    pub fn last_attempt_at(&self) -> Result<Option<chrono::DateTime<Utc>>> {
        self.runtime.block_on(self.inner.last_attempt_at())
    }
}
