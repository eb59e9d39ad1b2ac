//! # CSV Telemetry Logger
//!
//! Appends every accepted telemetry sample to a CSV file and reads those files
//! back for full-history replay.
//!
//! File layout:
//!
//! ```text
//! TEAM_ID,MISSION_TIME,PACKET_COUNT,SW_STATE,PL_STATE,ALTITUDE,PRESSURE,TEMP,VOLTAGE,GPS_LATITUDE,GPS_LONGITUDE
//! 1004,00:01:02.50,42,ASCENT,STOWED,1234.5,87.2,21.75,8.4,37.7749,-122.4194
//! ```
//!
//! The logger never truncates an existing file and flushes every row to disk
//! before returning, so the log survives a crash of the ground station.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::decoder::parse_telemetry_fields;
use super::store::TelemetryStore;
use super::types::{format_mission_time, Field, TelemetrySample, TELEMETRY_FIELD_COUNT};
use crate::error::{GroundStationError, Result};

/// Header row written when a log file is created, in wire order
pub const CSV_HEADER: [&str; TELEMETRY_FIELD_COUNT] = {
    let mut header = [""; TELEMETRY_FIELD_COUNT];
    let mut i = 0;
    while i < TELEMETRY_FIELD_COUNT {
        header[i] = Field::ALL[i].header();
        i += 1;
    }
    header
};

/// How a log file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Write the header row first
    Create,
    /// Continue an existing log without a header
    Append,
}

impl LogMode {
    /// `Append` if the file exists and has content, `Create` otherwise
    pub fn for_path(path: &Path) -> LogMode {
        match fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => LogMode::Append,
            _ => LogMode::Create,
        }
    }
}

fn persistence(path: &Path, action: &str, e: impl std::fmt::Display) -> GroundStationError {
    GroundStationError::Persistence(format!("Failed to {} {}: {}", action, path.display(), e))
}

/// Synchronous, append-only CSV writer for telemetry samples.
pub struct CsvLogger {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows_written: u64,
}

impl std::fmt::Debug for CsvLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvLogger")
            .field("path", &self.path)
            .field("rows_written", &self.rows_written)
            .finish_non_exhaustive()
    }
}

impl CsvLogger {
    /// Open a log file for appending.
    ///
    /// The file is created if missing and never truncated. In
    /// [`LogMode::Create`] the header row is written and flushed first.
    ///
    /// # Errors
    ///
    /// Returns [`GroundStationError::Persistence`] if the file cannot be
    /// opened or the header cannot be written.
    pub fn open<P: AsRef<Path>>(path: P, mode: LogMode) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| persistence(path, "open", e))?;

        Self::from_file(path, file, mode)
    }

    fn from_file(path: &Path, file: File, mode: LogMode) -> Result<Self> {
        let mut logger = Self {
            path: path.to_path_buf(),
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(file),
            rows_written: 0,
        };

        if mode == LogMode::Create {
            logger.write_synced(&CSV_HEADER)?;
        }

        info!("Telemetry log opened at {} ({:?})", path.display(), mode);
        Ok(logger)
    }

    /// Write one sample as a row and flush it to stable storage.
    ///
    /// # Errors
    ///
    /// Returns [`GroundStationError::Persistence`] if the write, flush or
    /// sync fails (e.g. disk full).
    pub fn append_row(&mut self, sample: &TelemetrySample) -> Result<()> {
        self.write_synced(&log_row(sample))?;
        self.rows_written += 1;
        debug!("Logged packet {} to {}", sample.packet_count, self.path.display());
        Ok(())
    }

    fn write_synced<I, T>(&mut self, record: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(record)
            .map_err(|e| persistence(&self.path, "write", e))?;
        self.writer
            .flush()
            .map_err(|e| persistence(&self.path, "flush", e))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| persistence(&self.path, "sync", e))
    }

    /// Release the file handle
    pub fn close(mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| persistence(&self.path, "flush", e))?;
        info!(
            "Telemetry log {} closed after {} rows",
            self.path.display(),
            self.rows_written
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended since this logger was opened
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

/// CSV projection of a sample, in header order
pub fn log_row(sample: &TelemetrySample) -> [String; TELEMETRY_FIELD_COUNT] {
    [
        sample.team_id.to_string(),
        format_mission_time(sample.mission_time_ms),
        sample.packet_count.to_string(),
        sample.sw_state.clone(),
        sample.pl_state.clone(),
        sample.altitude.to_string(),
        sample.pressure.to_string(),
        sample.temperature.to_string(),
        sample.voltage.to_string(),
        sample.gps_latitude.to_string(),
        sample.gps_longitude.to_string(),
    ]
}

/// Create the first free `{prefix}{n}.csv` (n = 1, 2, …) in `dir`.
///
/// Existing files are never overwritten; the new file contains the header
/// row. The directory is created if it does not exist.
///
/// # Errors
///
/// Returns [`GroundStationError::Config`] for an empty prefix or one with
/// path separators, and [`GroundStationError::Persistence`] if the file
/// cannot be created.
///
/// # Examples
///
/// ```no_run
/// use ground_station::telemetry::logger::create_csv;
///
/// let path = create_csv("CSV Files", "status")?;
/// println!("Logging to {}", path.display());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_csv<P: AsRef<Path>>(dir: P, prefix: &str) -> Result<PathBuf> {
    if prefix.is_empty() || prefix.contains(|c: char| c == '/' || c == '\\') {
        return Err(GroundStationError::Config(format!(
            "invalid CSV file prefix {:?}",
            prefix
        )));
    }

    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| persistence(dir, "create directory", e))?;

    let mut index: u32 = 1;
    loop {
        let path = dir.join(format!("{}{}.csv", prefix, index));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                CsvLogger::from_file(&path, file, LogMode::Create)?.close()?;
                info!("Created telemetry log {}", path.display());
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                index = index.checked_add(1).ok_or_else(|| {
                    persistence(&path, "create", "no free file name left")
                })?;
            }
            Err(e) => return Err(persistence(&path, "create", e)),
        }
    }
}

/// Names of the regular, non-hidden files in `dir`, sorted.
///
/// Subdirectories are not traversed.
pub fn files_in_directory<P: AsRef<Path>>(dir: P) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

/// Load a telemetry log into an unbounded store for full-history review.
///
/// Rows go through the same 11-field validation as live decoding; rows that
/// fail are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<TelemetryStore> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.iter().map(str::trim).ne(Field::ALL.iter().map(|f| f.header())) {
        warn!("Unexpected CSV header in {}: {:?}", path.display(), headers);
    }

    let mut store = TelemetryStore::unbounded();
    let mut skipped = 0usize;

    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping unreadable row {} in {}: {}", index + 2, path.display(), e);
                skipped += 1;
                continue;
            }
        };

        let fields: Vec<&str> = record.iter().collect();
        match parse_telemetry_fields(&fields) {
            Ok(sample) => store.append(sample),
            Err(e) => {
                warn!("Skipping invalid row {} in {}: {}", index + 2, path.display(), e);
                skipped += 1;
            }
        }
    }

    info!(
        "Loaded {} rows from {} ({} skipped)",
        store.len(),
        path.display(),
        skipped
    );
    Ok(store)
}
