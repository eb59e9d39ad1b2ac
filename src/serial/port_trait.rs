//! Trait abstraction for line-oriented transports to enable testing

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Source of newline-framed downlink lines
#[async_trait]
pub trait LineSource: Send {
    /// Read the next complete line, without its terminator.
    ///
    /// Returns `Ok(None)` when no complete line arrived within `timeout`;
    /// partially received bytes are kept for the next call.
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<String>>;

    /// Release the transport. Further reads fail with a transport error.
    async fn close(&mut self) -> Result<()>;

    /// Human readable transport name (e.g. the device path)
    fn describe(&self) -> &str;
}
