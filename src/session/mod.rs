//! # Session Module
//!
//! Owns the ingestion lifecycle and everything a presentation layer reads:
//! the live telemetry history, the latest status and error strings, the
//! selected CSV log and the observer list.
//!
//! ```text
//! Idle --start--> Running --stop--> Stopping --(task joined)--> Idle
//! ```
//!
//! A `Session` is an ordinary owned value. Lifecycle calls take `&mut self`;
//! reads take `&self` and return copies, so they never block the loop for
//! longer than a clone.

pub mod ingest;
pub mod observer;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{Config, SUPPORTED_BAUD_RATES};
use crate::error::{GroundStationError, Result};
use crate::serial::{self, LineSource, SerialLineSource};
use crate::telemetry::{logger, CsvLogger, LogMode, RecordDecoder, TelemetrySample, TelemetryStore};

pub use ingest::LoopStats;
pub use observer::ObserverRegistry;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    /// The loop has exited (stop requested or fatal error) but has not been
    /// collected by [`Session::stop`] yet
    Stopping,
}

/// Tunables taken from [`Config`]
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub csv_dir: PathBuf,
    pub history_capacity: usize,
    pub max_line_length: usize,
    pub read_timeout: Duration,
    pub retry_backoff: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            csv_dir: PathBuf::from(&config.storage.csv_dir),
            history_capacity: config.telemetry.history_capacity,
            max_line_length: config.telemetry.max_line_length,
            read_timeout: config.serial.read_timeout(),
            retry_backoff: config.serial.retry_backoff(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// State written by the ingestion task and read everywhere else.
#[derive(Debug)]
pub struct SharedTelemetry {
    capacity: usize,
    store: RwLock<TelemetryStore>,
    status: RwLock<String>,
    error: RwLock<String>,
}

impl SharedTelemetry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            store: RwLock::new(TelemetryStore::with_capacity(capacity)),
            status: RwLock::new(String::new()),
            error: RwLock::new(String::new()),
        }
    }

    pub fn append(&self, sample: TelemetrySample) {
        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .append(sample);
    }

    pub fn set_status(&self, text: String) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = text;
    }

    pub fn set_error(&self, text: String) {
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = text;
    }

    /// Copy of the history with all fields of equal length
    pub fn snapshot(&self) -> TelemetryStore {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub fn status(&self) -> String {
        self.status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn error(&self) -> String {
        self.error.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Fresh bounded store and empty strings
    pub fn reset(&self) {
        self.replace_store(TelemetryStore::with_capacity(self.capacity));
        self.set_status(String::new());
        self.set_error(String::new());
    }

    fn replace_store(&self, store: TelemetryStore) {
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = store;
    }
}

/// What the session is connected to, for a status display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub state: SessionState,
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub csv_path: Option<PathBuf>,
}

impl std::fmt::Display for ConnectionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.port, self.baud_rate) {
            (Some(port), Some(baud)) => write!(f, "{:?}: {} @ {} baud", self.state, port, baud)?,
            _ => write!(f, "{:?}: not connected", self.state)?,
        }
        match &self.csv_path {
            Some(path) => write!(f, ", logging to {}", path.display()),
            None => write!(f, ", no CSV selected"),
        }
    }
}

fn current_runtime() -> Result<Handle> {
    Handle::try_current().map_err(|e| {
        GroundStationError::Config(format!("session must start inside a tokio runtime: {}", e))
    })
}

struct Worker {
    stop_flag: Arc<AtomicBool>,
    handle: JoinHandle<Result<LoopStats>>,
    port: String,
    baud_rate: Option<u32>,
}

/// Telemetry ingestion session
pub struct Session {
    settings: SessionSettings,
    shared: Arc<SharedTelemetry>,
    observers: ObserverRegistry,
    csv_path: Option<PathBuf>,
    worker: Option<Worker>,
    exit: Arc<Notify>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("csv_path", &self.csv_path)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        let shared = Arc::new(SharedTelemetry::new(settings.history_capacity));
        Self {
            settings,
            shared,
            observers: ObserverRegistry::new(),
            csv_path: None,
            worker: None,
            exit: Arc::new(Notify::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(SessionSettings::from_config(config))
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Start ingesting from a serial port.
    ///
    /// `csv_path` selects the log file; `None` uses the file chosen earlier
    /// with [`set_csv`](Self::set_csv) or [`create_csv`](Self::create_csv).
    /// An existing non-empty file is appended to, otherwise a header is
    /// written first. Must be called from within a tokio runtime.
    ///
    /// Calling `start` while a loop is active does nothing.
    ///
    /// # Errors
    ///
    /// - [`GroundStationError::Config`] for an empty port, an unsupported
    ///   baud rate or no CSV path; nothing is opened in that case
    /// - [`GroundStationError::Transport`] if the port cannot be opened
    /// - [`GroundStationError::Persistence`] if the log cannot be opened
    pub fn start(&mut self, port: &str, baud_rate: u32, csv_path: Option<&Path>) -> Result<()> {
        if self.is_active() {
            warn!("start() ignored: session already active");
            return Ok(());
        }

        if port.trim().is_empty() {
            return Err(GroundStationError::Config("no serial port selected".to_string()));
        }
        if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
            return Err(GroundStationError::Config(format!(
                "unsupported baud rate {}",
                baud_rate
            )));
        }
        let csv_path = self.resolve_csv_path(csv_path)?;
        let runtime = current_runtime()?;

        let source = SerialLineSource::open(port, baud_rate)?;
        let logger = CsvLogger::open(&csv_path, LogMode::for_path(&csv_path))?;
        self.spawn(&runtime, Box::new(source), logger, Some(baud_rate))
    }

    /// Start ingesting from an arbitrary line source
    pub fn start_with_source(
        &mut self,
        source: Box<dyn LineSource>,
        csv_path: Option<&Path>,
    ) -> Result<()> {
        if self.is_active() {
            warn!("start() ignored: session already active");
            return Ok(());
        }

        let csv_path = self.resolve_csv_path(csv_path)?;
        let runtime = current_runtime()?;
        let logger = CsvLogger::open(&csv_path, LogMode::for_path(&csv_path))?;
        self.spawn(&runtime, source, logger, None)
    }

    fn resolve_csv_path(&self, csv_path: Option<&Path>) -> Result<PathBuf> {
        match csv_path {
            Some(path) if !path.as_os_str().is_empty() => Ok(path.to_path_buf()),
            Some(_) => Err(GroundStationError::Config("CSV path is empty".to_string())),
            None => self
                .csv_path
                .clone()
                .ok_or_else(|| GroundStationError::Config("no CSV file selected".to_string())),
        }
    }

    fn spawn(
        &mut self,
        runtime: &Handle,
        source: Box<dyn LineSource>,
        logger: CsvLogger,
        baud_rate: Option<u32>,
    ) -> Result<()> {
        self.shared.reset();
        self.csv_path = Some(logger.path().to_path_buf());

        let port = source.describe().to_string();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let exit = Arc::new(Notify::new());
        self.exit = exit.clone();

        let ingestion = ingest::IngestionLoop::new(
            source,
            logger,
            RecordDecoder::new(self.settings.max_line_length),
            self.shared.clone(),
            self.observers.clone(),
            stop_flag.clone(),
            self.settings.read_timeout,
            self.settings.retry_backoff,
        );

        let handle = runtime.spawn(async move {
            let result = ingestion.run().await;
            exit.notify_one();
            result
        });

        info!("Session started on {}", port);
        self.worker = Some(Worker {
            stop_flag,
            handle,
            port,
            baud_rate,
        });
        Ok(())
    }

    /// Stop ingestion and return to `Idle`.
    ///
    /// Waits for the in-flight read to return, closes the transport and the
    /// log, then clears history, status and error. Does nothing when idle.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the loop, if any (typically
    /// [`GroundStationError::Persistence`]). The session is `Idle` either way.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            debug!("stop() ignored: session idle");
            return Ok(());
        };

        info!("Stopping session on {}", worker.port);
        worker.stop_flag.store(true, Ordering::Release);
        let joined = worker.handle.await;
        self.shared.reset();

        match joined {
            Ok(Ok(stats)) => {
                info!("Session stopped after {} samples", stats.samples_logged);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(GroundStationError::TaskFailed(e.to_string())),
        }
    }

    pub fn state(&self) -> SessionState {
        match &self.worker {
            None => SessionState::Idle,
            Some(worker) if worker.handle.is_finished() => SessionState::Stopping,
            Some(_) => SessionState::Running,
        }
    }

    fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    fn ensure_idle(&self, operation: &str) -> Result<()> {
        if self.is_active() {
            return Err(GroundStationError::SessionBusy(format!(
                "cannot {} while ingestion is running",
                operation
            )));
        }
        Ok(())
    }

    /// Notified once when the current loop exits, for any reason.
    ///
    /// A new signal is created by every successful `start`.
    pub fn exit_signal(&self) -> Arc<Notify> {
        self.exit.clone()
    }

    pub fn register_observer<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.register(callback);
    }

    /// Channel-backed observer; see [`ObserverRegistry::subscribe`]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<u64> {
        self.observers.subscribe()
    }

    pub fn current_snapshot(&self) -> TelemetryStore {
        self.shared.snapshot()
    }

    /// Latest status record text, empty if none
    pub fn current_status(&self) -> String {
        self.shared.status()
    }

    /// Latest error record text, empty if none
    pub fn current_error(&self) -> String {
        self.shared.error()
    }

    pub fn list_available_ports(&self) -> Result<Vec<String>> {
        serial::list_available_ports()
    }

    /// Create the next free `<prefix>N.csv` in the CSV directory and select it
    pub fn create_csv(&mut self, prefix: &str) -> Result<PathBuf> {
        self.ensure_idle("create a CSV file")?;
        let path = logger::create_csv(&self.settings.csv_dir, prefix)?;
        self.csv_path = Some(path.clone());
        Ok(path)
    }

    /// Select an existing file as the log for the next `start`
    pub fn set_csv<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.ensure_idle("change the CSV file")?;
        let path = path.as_ref();
        if !path.is_file() {
            return Err(GroundStationError::Config(format!(
                "{} is not a file",
                path.display()
            )));
        }
        self.csv_path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn csv_path(&self) -> Option<&Path> {
        self.csv_path.as_deref()
    }

    /// Forget the selected CSV and clear the displayed telemetry
    pub fn close_csv(&mut self) -> Result<()> {
        self.ensure_idle("close the CSV file")?;
        self.shared.reset();
        self.csv_path = None;
        Ok(())
    }

    /// Load a whole CSV log for display and select it.
    ///
    /// The full history is kept; rows that fail validation are skipped.
    pub fn open_csv_for_replay<P: AsRef<Path>>(&mut self, path: P) -> Result<TelemetryStore> {
        self.ensure_idle("replay a CSV file")?;
        let path = path.as_ref();
        let store = logger::read_csv(path)?;

        self.shared.reset();
        self.shared.replace_store(store.clone());
        self.csv_path = Some(path.to_path_buf());
        info!("Replayed {} samples from {}", store.len(), path.display());
        Ok(store)
    }

    /// Files in the CSV directory; empty if it does not exist yet
    pub fn files(&self) -> Result<Vec<String>> {
        if !self.settings.csv_dir.exists() {
            return Ok(Vec::new());
        }
        logger::files_in_directory(&self.settings.csv_dir)
    }

    pub fn connection_summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            state: self.state(),
            port: self.worker.as_ref().map(|w| w.port.clone()),
            baud_rate: self.worker.as_ref().and_then(|w| w.baud_rate),
            csv_path: self.csv_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::port_trait::mocks::{ScriptStep, ScriptedLineSource};
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    fn telemetry_line(packet: u32) -> String {
        format!(
            "001000,00:00:{:02}.50,{},ASCENT,N,{:.1},100.9,21.0,4.8,34.05,-117.82",
            packet % 60,
            packet,
            packet as f64 * 10.0
        )
    }

    fn fast_settings(dir: &Path) -> SessionSettings {
        SessionSettings {
            csv_dir: dir.to_path_buf(),
            history_capacity: 15,
            max_line_length: 512,
            read_timeout: Duration::from_millis(10),
            retry_backoff: Duration::from_millis(50),
        }
    }

    async fn wait_until_drained(source: &ScriptedLineSource) {
        while source.remaining_steps() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn test_full_flow_logs_stores_and_notifies() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));
        let path = session.create_csv("flight").unwrap();

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        session.register_observer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut notices = session.subscribe();

        let lines: Vec<String> = (1..=20).map(telemetry_line).collect();
        let mut script: Vec<&str> = lines.iter().map(String::as_str).collect();
        script.push("1Parachute deployed");
        script.push("0garbage");
        let source = ScriptedLineSource::lines(&script);

        session
            .start_with_source(Box::new(source.clone()), None)
            .unwrap();
        assert_eq!(session.state(), SessionState::Running);

        wait_until_drained(&source).await;

        let snapshot = session.current_snapshot();
        assert_eq!(snapshot.len(), 15);
        assert_eq!(snapshot.column_lengths(), [15; 11]);
        assert_eq!(
            snapshot.packet_counts().to_vec(),
            (6..=20).collect::<Vec<u32>>()
        );
        assert_eq!(session.current_status(), "Parachute deployed");
        assert_eq!(notified.load(Ordering::SeqCst), 20);
        for expected in 1..=20 {
            assert_eq!(notices.recv().await, Some(expected));
        }

        session.stop().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.current_snapshot().is_empty());
        assert!(session.current_status().is_empty());
        assert!(source.is_closed());
        assert!(!source.was_read_after_close());

        // Every sample reached the log, not only the retained window
        let replayed = logger::read_csv(&path).unwrap();
        assert_eq!(replayed.len(), 20);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));

        session.stop().await.unwrap();
        session.stop().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);

        let path = session.create_csv("x").unwrap();
        session.set_csv(&path).unwrap();
        session
            .start_with_source(Box::new(ScriptedLineSource::lines(&[])), None)
            .unwrap();
        session.stop().await.unwrap();
        session.stop().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_while_running_is_noop() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));
        session.create_csv("run").unwrap();

        let first = ScriptedLineSource::lines(&[]);
        let second = ScriptedLineSource::lines(&[telemetry_line(1).as_str()]);
        session.start_with_source(Box::new(first.clone()), None).unwrap();
        session.start_with_source(Box::new(second.clone()), None).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        session.stop().await.unwrap();

        assert!(first.read_count() > 0);
        assert_eq!(second.read_count(), 0);
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn test_transport_error_is_retried_after_backoff() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));
        session.create_csv("retry").unwrap();

        let source = ScriptedLineSource::new(vec![
            ScriptStep::Fail("device disconnected".to_string()),
            ScriptStep::Line(telemetry_line(1)),
        ]);
        session.start_with_source(Box::new(source.clone()), None).unwrap();
        wait_until_drained(&source).await;

        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.current_snapshot().len(), 1);
        let reads = source.read_instants();
        assert!(reads[1].duration_since(reads[0]) >= Duration::from_millis(50));

        session.stop().await.unwrap();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_persistence_error_surfaces_from_stop() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));
        let source = ScriptedLineSource::lines(&[telemetry_line(1).as_str(), telemetry_line(2).as_str()]);

        // /dev/full exists with zero length, so it is opened in Create mode
        // and the header write already fails
        let result = session.start_with_source(Box::new(source.clone()), Some(Path::new("/dev/full")));
        assert!(matches!(result, Err(GroundStationError::Persistence(_))));
        assert_eq!(session.state(), SessionState::Idle);

        let logger = CsvLogger::open("/dev/full", LogMode::Append).unwrap();
        session
            .spawn(&Handle::current(), Box::new(source.clone()), logger, None)
            .unwrap();
        let exit = session.exit_signal();
        tokio::time::timeout(Duration::from_secs(2), exit.notified())
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Stopping);
        assert!(source.is_closed());
        assert!(matches!(
            session.stop().await,
            Err(GroundStationError::Persistence(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_validates_before_opening() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));
        let csv = dir.path().join("out.csv");

        assert!(matches!(
            session.start("", 9600, Some(csv.as_path())),
            Err(GroundStationError::Config(_))
        ));
        assert!(matches!(
            session.start("/dev/ttyUSB0", 1234, Some(csv.as_path())),
            Err(GroundStationError::Config(_))
        ));
        assert!(matches!(
            session.start("/dev/ttyUSB0", 9600, None),
            Err(GroundStationError::Config(_))
        ));
        assert!(!csv.exists());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_on_missing_port_reports_transport_error() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));
        let csv = dir.path().join("out.csv");

        let result = session.start("/dev/does-not-exist-12345", 9600, Some(csv.as_path()));
        assert!(matches!(result, Err(GroundStationError::Transport(_))));
        assert!(!csv.exists());
    }

    #[tokio::test]
    async fn test_replay_and_busy_checks() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));
        let path = session.create_csv("replay").unwrap();

        let lines: Vec<String> = (1..=30).map(telemetry_line).collect();
        let script: Vec<&str> = lines.iter().map(String::as_str).collect();
        let source = ScriptedLineSource::lines(&script);
        session.start_with_source(Box::new(source.clone()), None).unwrap();
        wait_until_drained(&source).await;

        assert!(matches!(
            session.open_csv_for_replay(&path),
            Err(GroundStationError::SessionBusy(_))
        ));
        assert!(matches!(session.close_csv(), Err(GroundStationError::SessionBusy(_))));
        assert!(matches!(session.create_csv("x"), Err(GroundStationError::SessionBusy(_))));

        session.stop().await.unwrap();

        let store = session.open_csv_for_replay(&path).unwrap();
        assert_eq!(store.len(), 30);
        assert_eq!(store.capacity(), None);
        assert_eq!(session.current_snapshot().len(), 30);
        assert_eq!(session.csv_path(), Some(path.as_path()));

        session.close_csv().unwrap();
        assert!(session.current_snapshot().is_empty());
        assert_eq!(session.csv_path(), None);
    }

    #[tokio::test]
    async fn test_restart_appends_to_existing_log() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));
        let path = session.create_csv("resume").unwrap();

        for packet in [1, 2] {
            let line = telemetry_line(packet);
            let source = ScriptedLineSource::lines(&[line.as_str()]);
            session.start_with_source(Box::new(source.clone()), None).unwrap();
            wait_until_drained(&source).await;
            session.stop().await.unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("TEAM_ID").count(), 1);
        assert_eq!(logger::read_csv(&path).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_files_and_connection_summary() {
        let dir = tempdir().unwrap();
        let csv_dir = dir.path().join("logs");
        let mut session = Session::new(fast_settings(&csv_dir));

        assert!(session.files().unwrap().is_empty());
        session.create_csv("flight").unwrap();
        session.create_csv("flight").unwrap();
        assert_eq!(session.files().unwrap(), vec!["flight1.csv", "flight2.csv"]);

        let idle = session.connection_summary();
        assert_eq!(idle.state, SessionState::Idle);
        assert_eq!(idle.port, None);
        assert_eq!(idle.csv_path, Some(csv_dir.join("flight2.csv")));

        session
            .start_with_source(Box::new(ScriptedLineSource::lines(&[])), None)
            .unwrap();
        let running = session.connection_summary();
        assert_eq!(running.state, SessionState::Running);
        assert_eq!(running.port.as_deref(), Some("mock"));
        assert!(running.to_string().contains("flight2.csv"));
        session.stop().await.unwrap();
    }

    #[test]
    fn test_set_csv_requires_existing_file() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));
        assert!(session.set_csv(dir.path().join("missing.csv")).is_err());
        assert_eq!(session.csv_path(), None);
    }

    #[tokio::test]
    async fn test_caller_stays_responsive_while_samples_are_logged() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));
        session.create_csv("busy").unwrap();

        // A slow observer must not stall this current-thread runtime
        session.register_observer(|| std::thread::sleep(Duration::from_millis(100)));

        let lines: Vec<String> = (1..=5).map(telemetry_line).collect();
        let script: Vec<&str> = lines.iter().map(String::as_str).collect();
        let source = ScriptedLineSource::lines(&script);
        session.start_with_source(Box::new(source.clone()), None).unwrap();

        for _ in 0..5 {
            let begun = std::time::Instant::now();
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(
                begun.elapsed() < Duration::from_millis(60),
                "caller blocked for {:?}",
                begun.elapsed()
            );
        }

        wait_until_drained(&source).await;
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_link_keeps_running_and_stops_promptly() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(fast_settings(dir.path()));
        session.create_csv("quiet").unwrap();

        let source = ScriptedLineSource::new(vec![
            ScriptStep::Quiet,
            ScriptStep::Quiet,
            ScriptStep::Quiet,
            ScriptStep::Line(telemetry_line(1)),
            ScriptStep::Quiet,
        ]);
        session.start_with_source(Box::new(source.clone()), None).unwrap();
        wait_until_drained(&source).await;

        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.current_snapshot().len(), 1);
        assert!(source.read_count() >= 5);

        let begun = std::time::Instant::now();
        session.stop().await.unwrap();
        // One read timeout plus scheduling slack
        assert!(begun.elapsed() < Duration::from_millis(200));
        assert!(source.is_closed());
        assert!(!source.was_read_after_close());
    }
}
