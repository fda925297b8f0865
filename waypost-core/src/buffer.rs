//! Durable buffer of captured-but-unsent samples
//!
//! The buffer is an ordered batch persisted as a whole under one store key:
//! insertion order is capture order, and the batch read back after a process
//! kill is exactly the batch last persisted. The buffer owns its key
//! exclusively; the delivery path only reads snapshots and requests prunes.

use crate::db::StateStore;
use crate::error::Result;
use crate::types::Sample;
use std::sync::Arc;

/// Store key holding the unsent batch (a JSON array of samples)
const UNSENT_KEY: &str = "waypost.unsent_samples";

/// Ordered, durable list of unsent samples
pub struct SampleBuffer {
    store: Arc<StateStore>,
}

impl SampleBuffer {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// Append a sample to the persisted batch.
    ///
    /// Persistence failures are logged and swallowed; the sample is lost.
    /// The pipeline runs in a background host with no way to surface an
    /// error to anyone, and a dropped sample is preferable to a crashed
    /// capture callback.
    pub fn append(&self, sample: &Sample) {
        let mut batch = match self.store.get::<Vec<Sample>>(UNSENT_KEY) {
            Ok(batch) => batch.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read sample buffer; dropping capture");
                return;
            }
        };

        batch.push(sample.clone());

        if let Err(e) = self.store.set(UNSENT_KEY, &batch) {
            tracing::warn!(
                error = %e,
                buffered = batch.len(),
                "failed to persist sample buffer; sample lost"
            );
        }
    }

    /// Current persisted batch, oldest first (empty if none)
    pub fn snapshot(&self) -> Result<Vec<Sample>> {
        Ok(self
            .store
            .get::<Vec<Sample>>(UNSENT_KEY)?
            .unwrap_or_default())
    }

    /// Number of unsent samples
    pub fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }

    /// Remove the first `sent` samples after a confirmed delivery.
    ///
    /// Prunes only the delivered prefix rather than clearing the key, so a
    /// sample appended between snapshot and prune can never be dropped.
    pub fn truncate_sent(&self, sent: usize) -> Result<()> {
        let batch = self.snapshot()?;
        if sent >= batch.len() {
            return self.store.delete(UNSENT_KEY);
        }
        self.store.set(UNSENT_KEY, &batch[sent..].to_vec())
    }

    /// Drop the whole batch unconditionally.
    ///
    /// Used by [`Tracker::stop`](crate::Tracker::stop) and by the
    /// serialization safety valve: a payload that cannot be encoded would
    /// otherwise block every future delivery.
    pub fn clear(&self) -> Result<()> {
        self.store.delete(UNSENT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn test_buffer() -> SampleBuffer {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        store.migrate().unwrap();
        SampleBuffer::new(store)
    }

    fn sample(n: i64) -> Sample {
        Sample::new(
            n as f64,
            (n * 2) as f64,
            Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap(),
        )
    }

    #[test]
    fn test_empty_snapshot() {
        let buffer = test_buffer();
        assert!(buffer.snapshot().unwrap().is_empty());
        assert_eq!(buffer.len().unwrap(), 0);
    }

    #[test]
    fn test_append_preserves_capture_order() {
        let buffer = test_buffer();
        for n in 0..5 {
            buffer.append(&sample(n));
        }

        let batch = buffer.snapshot().unwrap();
        assert_eq!(batch.len(), 5);
        for (n, stored) in batch.iter().enumerate() {
            assert_eq!(*stored, sample(n as i64));
        }
    }

    #[test]
    fn test_truncate_sent_prefix() {
        let buffer = test_buffer();
        for n in 0..4 {
            buffer.append(&sample(n));
        }

        buffer.truncate_sent(2).unwrap();

        let batch = buffer.snapshot().unwrap();
        assert_eq!(batch, vec![sample(2), sample(3)]);
    }

    #[test]
    fn test_truncate_sent_whole_batch_removes_key() {
        let buffer = test_buffer();
        buffer.append(&sample(0));
        buffer.append(&sample(1));

        buffer.truncate_sent(2).unwrap();
        assert!(buffer.snapshot().unwrap().is_empty());

        // Over-counting must not underflow or error
        buffer.truncate_sent(10).unwrap();
        assert!(buffer.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_append_after_truncate() {
        let buffer = test_buffer();
        buffer.append(&sample(0));
        buffer.truncate_sent(1).unwrap();
        buffer.append(&sample(1));

        assert_eq!(buffer.snapshot().unwrap(), vec![sample(1)]);
    }

    #[test]
    fn test_clear() {
        let buffer = test_buffer();
        buffer.append(&sample(0));
        buffer.clear().unwrap();
        assert!(buffer.snapshot().unwrap().is_empty());
    }
}
