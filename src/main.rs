//! # Ground Station
//!
//! Receive rocket payload telemetry over a serial radio link, log it to CSV
//! and show it live in the terminal.
//!
//! # Usage
//!
//! ```bash
//! ground-station run --port /dev/ttyUSB0 --baud 9600
//! ground-station replay "CSV Files/flight1.csv" --json
//! ground-station simulate --port /dev/ttyUSB1 --rate 2
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::interval;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use ground_station::config::{Config, LoggingConfig};
use ground_station::serial;
use ground_station::simulator::{DownlinkSimulator, DEFAULT_TEAM_ID};
use ground_station::telemetry::types::format_mission_time;
use ground_station::telemetry::{TelemetrySample, TelemetryStore};
use ground_station::Session;

/// Default configuration file looked up in the working directory
const DEFAULT_CONFIG_FILE: &str = "ground-station.toml";

/// How often `run` checks for new status and error records
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Number of simulated packets between status log messages
const SIMULATE_LOG_INTERVAL: u32 = 50;

#[derive(Parser, Debug)]
#[command(name = "ground-station", version, about = "Rocket payload telemetry ground station", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Receive telemetry until Ctrl+C
    Run {
        /// Serial port of the radio (defaults to `serial.port`)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate (defaults to `serial.baud_rate`)
        #[arg(short, long)]
        baud: Option<u32>,

        /// CSV log to append to; a new `<prefix>N.csv` is created when omitted
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        csv: Option<PathBuf>,
    },

    /// List connected serial ports
    Ports,

    /// List files in the CSV directory
    Files,

    /// Create the next free CSV log file
    Create {
        /// File name prefix (defaults to `storage.file_prefix`)
        prefix: Option<String>,
    },

    /// Load a CSV log and print its contents
    Replay {
        path: PathBuf,

        /// Print the full history as JSON columns
        #[arg(long)]
        json: bool,
    },

    /// Send a synthetic downlink to a serial port
    Simulate {
        #[arg(short, long)]
        port: String,

        #[arg(short, long)]
        baud: Option<u32>,

        /// Telemetry packets per second
        #[arg(short, long, default_value = "1.0")]
        rate: f64,

        #[arg(long, default_value_t = DEFAULT_TEAM_ID)]
        team_id: u32,

        /// Stop after this many packets
        #[arg(long)]
        count: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _log_guard = init_logging(&config.logging)?;

    info!("Ground Station v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run { port, baud, csv } => run(&config, port, baud, csv).await,
        Commands::Ports => list_ports(),
        Commands::Files => list_files(&config),
        Commands::Create { prefix } => create(&config, prefix),
        Commands::Replay { path, json } => replay(&config, &path, json),
        Commands::Simulate {
            port,
            baud,
            rate,
            team_id,
            count,
        } => simulate(&config, &port, baud, rate, team_id, count).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::load(DEFAULT_CONFIG_FILE)
            .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG_FILE)),
        None => Ok(Config::default()),
    }
}

/// Console logging, plus a daily rolling file when a log directory is set.
///
/// The returned guard flushes the file writer on drop.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level {:?}", config.level))?;
    let console = fmt::layer().with_writer(std::io::stderr);

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "ground-station.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            Ok(None)
        }
    }
}

async fn run(
    config: &Config,
    port: Option<String>,
    baud: Option<u32>,
    csv: Option<PathBuf>,
) -> Result<()> {
    let port = port.unwrap_or_else(|| config.serial.port.clone());
    if port.is_empty() {
        bail!("No serial port given; use --port or set serial.port");
    }
    let baud = baud.unwrap_or(config.serial.baud_rate);

    let mut session = Session::from_config(config);
    let mut notices = session.subscribe();
    start_session(&mut session, &config.storage.file_prefix, &port, baud, csv.as_deref())?;
    let exit = session.exit_signal();

    info!("{}", session.connection_summary());
    info!("Press Ctrl+C to exit");

    let mut payload = PayloadMessages::default();
    let mut status_poll = interval(STATUS_POLL_INTERVAL);

    loop {
        tokio::select! {
            Some(_) = notices.recv() => {
                if let Some(sample) = session.current_snapshot().latest() {
                    println!("{}", format_sample(&sample));
                }
            }

            // Status and error records arrive between telemetry packets too
            _ = status_poll.tick() => {
                for message in payload.changes(session.current_status(), session.current_error()) {
                    println!("{}", message);
                }
            }

            _ = exit.notified() => {
                warn!("Ingestion loop ended unexpectedly");
                break;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.stop().await?;
    Ok(())
}

/// Start logging to `csv`, or to a freshly created `<prefix>N.csv`.
///
/// A file created here is removed again if the session fails to start.
fn start_session(
    session: &mut Session,
    prefix: &str,
    port: &str,
    baud: u32,
    csv: Option<&Path>,
) -> Result<()> {
    let created = match csv {
        Some(_) => None,
        None => Some(session.create_csv(prefix)?),
    };

    if let Err(e) = session.start(port, baud, csv) {
        if let Some(path) = created {
            session.close_csv()?;
            if let Err(remove_err) = std::fs::remove_file(&path) {
                warn!("Failed to remove unused log {}: {}", path.display(), remove_err);
            }
        }
        return Err(e.into());
    }

    if let Some(path) = session.csv_path() {
        info!("Logging to {}", path.display());
    }
    Ok(())
}

/// Last payload status/error text shown to the operator
#[derive(Debug, Default)]
struct PayloadMessages {
    status: String,
    error: String,
}

impl PayloadMessages {
    /// Lines to print for texts that changed since the last call
    fn changes(&mut self, status: String, error: String) -> Vec<String> {
        let mut lines = Vec::new();
        if status != self.status {
            if !status.is_empty() {
                lines.push(format!("STATUS: {}", status));
            }
            self.status = status;
        }
        if error != self.error {
            if !error.is_empty() {
                lines.push(format!("PAYLOAD ERROR: {}", error));
            }
            self.error = error;
        }
        lines
    }
}

fn format_sample(sample: &TelemetrySample) -> String {
    format!(
        "[{}] #{:<5} T+{} {:<10} {:<8} alt {:>8.1} m  {:>7.3} kPa  {:>5.1} C  {:>5.2} V  {:.6}, {:.6}",
        chrono::Local::now().format("%H:%M:%S"),
        sample.packet_count,
        format_mission_time(sample.mission_time_ms),
        sample.sw_state,
        sample.pl_state,
        sample.altitude,
        sample.pressure,
        sample.temperature,
        sample.voltage,
        sample.gps_latitude,
        sample.gps_longitude
    )
}

fn list_ports() -> Result<()> {
    let ports = serial::list_available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

fn list_files(config: &Config) -> Result<()> {
    let session = Session::from_config(config);
    for file in session.files()? {
        println!("{}", file);
    }
    Ok(())
}

fn create(config: &Config, prefix: Option<String>) -> Result<()> {
    let prefix = prefix.unwrap_or_else(|| config.storage.file_prefix.clone());
    let mut session = Session::from_config(config);
    let path = session.create_csv(&prefix)?;
    println!("{}", path.display());
    Ok(())
}

fn replay(config: &Config, path: &Path, json: bool) -> Result<()> {
    let mut session = Session::from_config(config);
    let store = session.open_csv_for_replay(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&store)?);
    } else {
        print!("{}", replay_summary(&store));
    }
    Ok(())
}

fn replay_summary(store: &TelemetryStore) -> String {
    let (Some(first), Some(last)) = (store.sample(0), store.latest()) else {
        return "No telemetry rows\n".to_string();
    };
    let max_altitude = store.altitudes().iter().copied().fold(f64::MIN, f64::max);

    format!(
        "Samples:      {}\nPackets:      {} .. {}\nMission time: {} .. {}\nMax altitude: {:.1} m\nLast state:   {} / {}\n",
        store.len(),
        first.packet_count,
        last.packet_count,
        format_mission_time(first.mission_time_ms),
        format_mission_time(last.mission_time_ms),
        max_altitude,
        last.sw_state,
        last.pl_state
    )
}

async fn simulate(
    config: &Config,
    port: &str,
    baud: Option<u32>,
    rate: f64,
    team_id: u32,
    count: Option<u32>,
) -> Result<()> {
    if !(rate.is_finite() && rate > 0.0 && rate <= 100.0) {
        bail!("rate must be between 0 and 100 packets per second");
    }
    let baud = baud.unwrap_or(config.serial.baud_rate);
    let period = Duration::from_secs_f64(1.0 / rate);

    let mut port_stream = serial::open_port(port, baud)?;
    let mut simulator = DownlinkSimulator::new(team_id, period);
    let mut tick = interval(period);

    info!("Simulating downlink on {} at {} baud, {} Hz", port, baud, rate);
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = tick.tick() => {
                simulator.write_batch(&mut port_stream).await?;

                let sent = simulator.packet_count();
                if sent % SIMULATE_LOG_INTERVAL == 0 {
                    info!("Sent {} packets", sent);
                }
                if count.is_some_and(|limit| sent >= limit) {
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    info!("Total packets sent: {}", simulator.packet_count());
    Ok(())
}
