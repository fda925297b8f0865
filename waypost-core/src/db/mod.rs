//! Durable state layer for waypost
//!
//! A small key-value store over SQLite:
//! - Schema migrations via `PRAGMA user_version`
//! - One row per logical key, values stored as JSON text
//! - Single-key atomicity (an update is one SQL statement); concurrent
//!   writers to the same key race with last-write-wins
//!
//! Everything the tracker must survive a process kill with (the unsent
//! sample buffer, the delivery target, the last-attempt timestamp, the
//! enabled flag) lives here under its own key.

pub mod kv;
pub mod schema;

pub use kv::StateStore;
