//! Background ingestion loop
//!
//! Reads downlink lines, decodes them and fans the results out to the CSV log,
//! the shared history and the observers. Runs on its own tokio task until the
//! stop flag is raised or the log becomes unwritable.
//!
//! Only the line read runs on the async worker. The synced CSV write and the
//! observer callbacks block, so each sample is handed to the blocking pool
//! and awaited before the next read; a current-thread caller keeps running
//! while a row is being flushed or an observer is slow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::observer::ObserverRegistry;
use super::SharedTelemetry;
use crate::error::{GroundStationError, Result};
use crate::serial::LineSource;
use crate::telemetry::{CsvLogger, Record, RecordDecoder, TelemetrySample};

/// Number of decoded samples between progress log messages
const LOG_INTERVAL_SAMPLES: u64 = 100;

/// Counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub lines_read: u64,
    pub samples_logged: u64,
    pub decode_errors: u64,
    pub transport_errors: u64,
}

pub(crate) struct IngestionLoop {
    source: Box<dyn LineSource>,
    /// Lent to the blocking pool while a row is written
    logger: Option<CsvLogger>,
    decoder: RecordDecoder,
    shared: Arc<SharedTelemetry>,
    observers: ObserverRegistry,
    stop_flag: Arc<AtomicBool>,
    read_timeout: Duration,
    retry_backoff: Duration,
    stats: LoopStats,
}

impl IngestionLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source: Box<dyn LineSource>,
        logger: CsvLogger,
        decoder: RecordDecoder,
        shared: Arc<SharedTelemetry>,
        observers: ObserverRegistry,
        stop_flag: Arc<AtomicBool>,
        read_timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            source,
            logger: Some(logger),
            decoder,
            shared,
            observers,
            stop_flag,
            read_timeout,
            retry_backoff,
            stats: LoopStats::default(),
        }
    }

    /// Run until stopped or a persistence failure occurs.
    ///
    /// The line source and the logger are closed on every exit path, after the
    /// last read has returned.
    pub(crate) async fn run(mut self) -> Result<LoopStats> {
        if let Some(logger) = &self.logger {
            info!(
                "Ingesting from {} into {}",
                self.source.describe(),
                logger.path().display()
            );
        }

        let mut outcome = Ok(());
        while !self.stop_flag.load(Ordering::Acquire) {
            if let Err(e) = self.cycle().await {
                error!("Ingestion stopped: {}", e);
                outcome = Err(e);
                break;
            }
        }

        let stats = self.stats;
        let shutdown = self.shutdown().await;
        outcome?;
        shutdown?;

        info!(
            "Ingestion finished: {} lines, {} samples, {} decode errors, {} transport errors",
            stats.lines_read, stats.samples_logged, stats.decode_errors, stats.transport_errors
        );
        Ok(stats)
    }

    /// One read/decode/dispatch step. Only persistence failures escape.
    async fn cycle(&mut self) -> Result<()> {
        match self.source.read_line(self.read_timeout).await {
            Ok(Some(line)) => {
                self.stats.lines_read += 1;
                self.handle_line(&line).await
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.stats.transport_errors += 1;
                warn!(
                    "Read from {} failed: {}; retrying in {:?}",
                    self.source.describe(),
                    e,
                    self.retry_backoff
                );
                tokio::time::sleep(self.retry_backoff).await;
                Ok(())
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<()> {
        match self.decoder.decode(line) {
            Ok(Some(Record::Telemetry(sample))) => {
                debug!("Telemetry packet {}: {}", sample.packet_count, line);
                self.publish(sample).await?;
                self.stats.samples_logged += 1;

                if self.stats.samples_logged % LOG_INTERVAL_SAMPLES == 0 {
                    info!("Logged {} samples", self.stats.samples_logged);
                }
            }
            Ok(Some(Record::Status(text))) => {
                debug!("Status: {}", text);
                self.shared.set_status(text);
            }
            Ok(Some(Record::Error(text))) => {
                warn!("Payload reported error: {}", text);
                self.shared.set_error(text);
            }
            Ok(None) => {}
            Err(e) => {
                self.stats.decode_errors += 1;
                warn!("Discarding line {:?}: {}", line, e);
            }
        }
        Ok(())
    }

    /// Log, store, then notify, on the blocking pool.
    ///
    /// A sample that fails to persist is neither stored nor announced.
    async fn publish(&mut self, sample: TelemetrySample) -> Result<()> {
        let mut logger = self.logger.take().ok_or_else(|| {
            GroundStationError::Persistence("telemetry log is not open".to_string())
        })?;
        let shared = self.shared.clone();
        let observers = self.observers.clone();

        let (logger, written) = tokio::task::spawn_blocking(move || {
            let written = logger.append_row(&sample);
            if written.is_ok() {
                shared.append(sample);
                observers.notify_all();
            }
            (logger, written)
        })
        .await
        .map_err(|e| GroundStationError::TaskFailed(e.to_string()))?;

        self.logger = Some(logger);
        written
    }

    async fn shutdown(mut self) -> Result<()> {
        let source_closed = self.source.close().await;
        let logger_closed = match self.logger.take() {
            Some(logger) => tokio::task::spawn_blocking(move || logger.close())
                .await
                .map_err(|e| GroundStationError::TaskFailed(e.to_string()))?,
            None => Ok(()),
        };
        source_closed?;
        logger_closed
    }
}
