//! Error types for the gym_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for gym_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisting the ledger failed; the in-memory change was rolled back
    #[error("Store error: {0}")]
    Store(String),

    /// An entity is missing a relationship it must have
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// A CSV row could not be interpreted
    #[error("Parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// The rest display or notification channel rejected a request
    #[error("External channel error: {0}")]
    ExternalChannel(String),

    /// Invalid input value
    #[error("Validation error: {0}")]
    Validation(String),

    /// No async runtime available to drive the countdown
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}
