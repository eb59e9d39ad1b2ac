//! # Serial Communication Module
//!
//! Handles the serial link to the telemetry downlink radio.
//!
//! This module handles:
//! - Opening the serial port (8N1) at the configured baud rate
//! - Framing the incoming byte stream into newline-terminated lines
//! - Bounded-timeout reads so callers can poll a stop flag
//! - Enumerating available serial ports

pub mod port_trait;

pub use port_trait::LineSource;

use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::error::{GroundStationError, Result};

/// Bytes buffered without a line terminator before the partial line is dropped
pub const MAX_FRAME_BYTES: usize = 128 * 1024;

/// Initial read buffer size
const READ_CHUNK_BYTES: usize = 256;

/// Splits a byte stream into UTF-8 lines.
///
/// Lines are terminated by `\n`; a trailing `\r` is stripped. Lines that are
/// not valid UTF-8 are logged and dropped. When more than `max_frame_bytes`
/// accumulate without a terminator, the partial line is dropped together with
/// the rest of that line.
#[derive(Debug)]
pub struct LineFramer {
    pending: BytesMut,
    max_frame_bytes: usize,
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(MAX_FRAME_BYTES)
    }
}

impl LineFramer {
    #[must_use]
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(READ_CHUNK_BYTES),
            max_frame_bytes,
            discarding: false,
        }
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
        self.enforce_limit();
    }

    /// Buffer to read into directly; call [`LineFramer::enforce_limit`] afterwards
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.pending
    }

    /// Number of buffered bytes not yet returned as a line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Next complete line, if one is buffered
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let pos = self.pending.iter().position(|&b| b == b'\n')?;
            let mut raw = self.pending.split_to(pos + 1);

            if self.discarding {
                self.discarding = false;
                debug!("Dropped tail of oversized line ({} bytes)", raw.len());
                continue;
            }

            raw.truncate(pos);
            if raw.last() == Some(&b'\r') {
                raw.truncate(pos - 1);
            }

            match String::from_utf8(raw.to_vec()) {
                Ok(line) => return Some(line),
                Err(e) => {
                    warn!("Discarding non-UTF-8 line ({} bytes): {}", raw.len(), e);
                    continue;
                }
            }
        }
    }

    /// Drop a runaway partial line once it exceeds the frame limit
    pub fn enforce_limit(&mut self) {
        if self.pending.len() > self.max_frame_bytes && !self.pending.contains(&b'\n') {
            warn!(
                "Discarding {} bytes without line terminator (limit {})",
                self.pending.len(),
                self.max_frame_bytes
            );
            self.pending.clear();
            self.discarding = true;
        }
    }
}

/// Line source reading from a serial port (or any async reader).
pub struct SerialLineSource<R = tokio_serial::SerialStream> {
    port: Option<R>,
    framer: LineFramer,
    device_path: String,
}

impl<R> std::fmt::Debug for SerialLineSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLineSource")
            .field("device_path", &self.device_path)
            .field("open", &self.port.is_some())
            .finish_non_exhaustive()
    }
}

impl SerialLineSource {
    /// Open a serial device for reading downlink lines
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyUSB0" or "COM3")
    /// * `baud_rate` - Link speed (e.g., 9600)
    ///
    /// # Errors
    ///
    /// Returns [`GroundStationError::Transport`] if the port does not exist
    /// or is busy
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ground_station::serial::SerialLineSource;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let source = SerialLineSource::open("/dev/ttyUSB0", 9600)?;
    ///     Ok(())
    /// }
    /// ```
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = open_port(path, baud_rate)?;
        info!("Opened downlink serial port {} at {} baud", path, baud_rate);
        Ok(Self::from_reader(port, path))
    }
}

impl<R: AsyncRead + Unpin> SerialLineSource<R> {
    /// Wrap an already opened reader
    pub fn from_reader(reader: R, name: &str) -> Self {
        Self {
            port: Some(reader),
            framer: LineFramer::default(),
            device_path: name.to_string(),
        }
    }

    /// Read the next complete line within `timeout`.
    ///
    /// Returns `Ok(None)` on timeout. Bytes of an incomplete line are kept
    /// and completed by a later call.
    ///
    /// # Errors
    ///
    /// Returns [`GroundStationError::Transport`] if the read fails, the
    /// device reports end of stream, or the source was closed.
    pub async fn next_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(line) = self.framer.next_line() {
                return Ok(Some(line));
            }

            let port = self.port.as_mut().ok_or_else(|| {
                GroundStationError::Transport(format!("{} is closed", self.device_path))
            })?;

            let buffer = self.framer.buffer_mut();
            buffer.reserve(READ_CHUNK_BYTES);

            // read_buf is cancel safe: bytes are either in the buffer or unread
            match tokio::time::timeout_at(deadline, port.read_buf(buffer)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    return Err(GroundStationError::Transport(format!(
                        "{} reported end of stream",
                        self.device_path
                    )));
                }
                Ok(Ok(n)) => {
                    debug!("Read {} bytes from {}", n, self.device_path);
                    self.framer.enforce_limit();
                }
                Ok(Err(e)) => {
                    return Err(GroundStationError::Transport(format!(
                        "Failed to read from {}: {}",
                        self.device_path, e
                    )));
                }
            }
        }
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> LineSource for SerialLineSource<R> {
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        self.next_line(timeout).await
    }

    async fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            info!("Closed serial port {}", self.device_path);
        }
        Ok(())
    }

    fn describe(&self) -> &str {
        &self.device_path
    }
}

/// Open a serial port with 8N1 settings
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyUSB0")
/// * `baud_rate` - Link speed
pub fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| GroundStationError::Transport(format!("Failed to open {}: {}", path, e)))
}

/// Names of the serial ports present on this machine
///
/// # Errors
///
/// Returns [`GroundStationError::Transport`] if enumeration fails
pub fn list_available_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| GroundStationError::Transport(format!("Failed to enumerate ports: {}", e)))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
