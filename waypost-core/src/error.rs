//! Error types for waypost-core

use thiserror::Error;

/// Main error type for the waypost-core library
#[derive(Error, Debug)]
pub enum Error {
    /// State store error
    #[error("state store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for waypost-core
pub type Result<T> = std::result::Result<T, Error>;
