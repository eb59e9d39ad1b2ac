//! # Telemetry Module
//!
//! Decoding, live history and CSV logging of downlink telemetry.
//!
//! This module handles:
//! - Decoding `<kind><payload>` downlink lines into typed records
//! - Mission time conversion (`HH:MM:SS.ss` ↔ milliseconds)
//! - Keeping the last N samples per field for live display
//! - Appending every sample to a CSV log, and replaying those logs

pub mod decoder;
pub mod logger;
pub mod ring;
pub mod store;
pub mod types;

pub use decoder::{Record, RecordDecoder};
pub use logger::{CsvLogger, LogMode};
pub use ring::RingBuffer;
pub use store::TelemetryStore;
pub use types::{Field, TelemetrySample};
