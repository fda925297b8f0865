//! Wire format for delivered batches
//!
//! The request body is a JSON array with one object per buffered sample,
//! array order = capture order. All three fields are strings: the receiving
//! backend predates this implementation and expects
//! `{"lat": "48.2", "long": "16.37", "timestamp": "<RFC 3339>"}`.

use crate::types::Sample;
use serde::{Deserialize, Serialize};

/// One sample as it appears in the POST body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSample {
    /// Latitude as a decimal string
    pub lat: String,
    /// Longitude as a decimal string
    pub long: String,
    /// Capture time as an RFC 3339 string
    pub timestamp: String,
}

impl WireSample {
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            lat: sample.latitude.to_string(),
            long: sample.longitude.to_string(),
            timestamp: sample.captured_at.to_rfc3339(),
        }
    }
}

/// Encode a batch to the POST body
pub fn encode_batch(batch: &[Sample]) -> serde_json::Result<Vec<u8>> {
    let records: Vec<WireSample> = batch.iter().map(WireSample::from_sample).collect();
    serde_json::to_vec(&records)
}
