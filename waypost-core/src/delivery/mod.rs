//! HTTP delivery of buffered samples
//!
//! One POST per flush: the whole unsent batch is serialized to the wire
//! format (see [`payload`]) and sent to the configured endpoint. Any status
//! in [200, 300) confirms receipt; everything else (transport errors,
//! non-2xx statuses, an expired caller deadline) is retryable and leaves
//! the buffer untouched for the next trigger.
//!
//! Delivery is at-least-once: a response lost after the server processed the
//! batch means the same samples are sent again later. Receivers are expected
//! to tolerate duplicates.

pub mod client;
pub mod payload;

pub use client::{DeliveryClient, DeliveryError};
pub use payload::WireSample;
