//! # Ground Station Library
//!
//! Receive, store and log telemetry from a rocket payload over a serial radio
//! link.
//!
//! This library provides the core of a ground station: a background session
//! that reads newline-framed downlink records, keeps a short rolling history
//! for live display, appends every sample to a CSV log and notifies
//! observers. Logs can be replayed later through the same validation.

pub mod config;
pub mod error;
pub mod serial;
pub mod session;
pub mod simulator;
pub mod telemetry;

pub use error::{GroundStationError, Result};
pub use session::{Session, SessionState};
