//! # Error Types
//!
//! Custom error types for the ground station using `thiserror`.

use thiserror::Error;

/// Main error type for the ground station
#[derive(Debug, Error)]
pub enum GroundStationError {
    /// Serial transport errors (port unavailable, device disconnected)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A received line could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The CSV log could not be written; fatal to the running session
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// CSV reader/writer errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not allowed while ingestion is running
    #[error("Session busy: {0}")]
    SessionBusy(String),

    /// The background ingestion task panicked or was cancelled
    #[error("Ingestion task failed: {0}")]
    TaskFailed(String),
}

impl From<toml::de::Error> for GroundStationError {
    fn from(e: toml::de::Error) -> Self {
        GroundStationError::Config(e.to_string())
    }
}

/// Recoverable failures while decoding a single downlink line.
///
/// The offending line is discarded; ingestion always continues.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Telemetry payload did not have the expected number of fields
    #[error("expected {expected} fields, got {found}")]
    FieldCount { expected: usize, found: usize },

    /// A numeric field failed to parse
    #[error("invalid {field} value: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// Mission time was not `HH:MM:SS.ss`
    #[error("invalid mission time {0:?} (expected HH:MM:SS.ss)")]
    MalformedTime(String),

    /// Leading record kind character is not known
    #[error("unrecognized record kind {0:?}")]
    UnknownKind(char),

    /// Line exceeds the configured maximum length
    #[error("line too long: {length} bytes (max {max})")]
    LineTooLong { length: usize, max: usize },
}

/// Result type alias for the ground station
pub type Result<T> = std::result::Result<T, GroundStationError>;
