//! # Telemetry Types
//!
//! Record kinds, field names and the decoded [`TelemetrySample`], plus the
//! mission-time conversions shared by live decoding and CSV replay.

use serde::Serialize;

use crate::error::DecodeError;

/// Record kind of a telemetry line (`0<11 comma separated fields>`)
pub const RECORD_KIND_TELEMETRY: char = '0';

/// Record kind of a status line (`1<free text>`)
pub const RECORD_KIND_STATUS: char = '1';

/// Record kind of an error line (`2<free text>`)
pub const RECORD_KIND_ERROR: char = '2';

/// Number of comma separated fields in a telemetry payload
pub const TELEMETRY_FIELD_COUNT: usize = 11;

const MS_PER_HOUR: u64 = 3_600_000;
const MS_PER_MINUTE: u64 = 60_000;

/// One column of the telemetry record, in wire and CSV order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    TeamId,
    MissionTime,
    PacketCount,
    SwState,
    PlState,
    Altitude,
    Pressure,
    Temp,
    Voltage,
    GpsLatitude,
    GpsLongitude,
}

impl Field {
    /// All fields in wire order
    pub const ALL: [Field; TELEMETRY_FIELD_COUNT] = [
        Field::TeamId,
        Field::MissionTime,
        Field::PacketCount,
        Field::SwState,
        Field::PlState,
        Field::Altitude,
        Field::Pressure,
        Field::Temp,
        Field::Voltage,
        Field::GpsLatitude,
        Field::GpsLongitude,
    ];

    /// Lower-case key used by presentation code (`"altitude"`)
    pub fn name(self) -> &'static str {
        match self {
            Field::TeamId => "team_id",
            Field::MissionTime => "mission_time",
            Field::PacketCount => "packet_count",
            Field::SwState => "sw_state",
            Field::PlState => "pl_state",
            Field::Altitude => "altitude",
            Field::Pressure => "pressure",
            Field::Temp => "temp",
            Field::Voltage => "voltage",
            Field::GpsLatitude => "gps_latitude",
            Field::GpsLongitude => "gps_longitude",
        }
    }

    /// Column title in the CSV header row (`"ALTITUDE"`)
    pub const fn header(self) -> &'static str {
        match self {
            Field::TeamId => "TEAM_ID",
            Field::MissionTime => "MISSION_TIME",
            Field::PacketCount => "PACKET_COUNT",
            Field::SwState => "SW_STATE",
            Field::PlState => "PL_STATE",
            Field::Altitude => "ALTITUDE",
            Field::Pressure => "PRESSURE",
            Field::Temp => "TEMP",
            Field::Voltage => "VOLTAGE",
            Field::GpsLatitude => "GPS_LATITUDE",
            Field::GpsLongitude => "GPS_LONGITUDE",
        }
    }

    /// Look up a field by its lower-case key
    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// A fully decoded telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub team_id: u32,

    /// Milliseconds since the mission epoch
    pub mission_time_ms: u64,

    pub packet_count: u32,

    /// Flight software state
    pub sw_state: String,

    /// Payload state
    pub pl_state: String,

    /// Altitude in meters
    pub altitude: f64,

    /// Pressure in kPa
    pub pressure: f64,

    /// Temperature in °C
    pub temperature: f64,

    /// Battery voltage in volts
    pub voltage: f64,

    /// GPS latitude in degrees
    pub gps_latitude: f64,

    /// GPS longitude in degrees
    pub gps_longitude: f64,
}

/// Convert a `HH:MM:SS.ss` mission time to milliseconds.
///
/// An empty string converts to `0`. Seconds may carry any number of decimals
/// and are rounded to the nearest millisecond.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedTime`] when the text does not have three
/// colon separated parts, a part is not numeric or negative, or the result
/// overflows.
///
/// # Examples
///
/// ```
/// use ground_station::telemetry::types::mission_time_to_ms;
///
/// assert_eq!(mission_time_to_ms("01:02:03.50").unwrap(), 3_723_500);
/// assert_eq!(mission_time_to_ms("").unwrap(), 0);
/// assert!(mission_time_to_ms("bad").is_err());
/// ```
pub fn mission_time_to_ms(text: &str) -> Result<u64, DecodeError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }

    let malformed = || DecodeError::MalformedTime(text.to_string());

    let mut parts = text.split(':');
    let (Some(hours), Some(minutes), Some(seconds), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };

    let hours: u64 = hours.trim().parse().map_err(|_| malformed())?;
    let minutes: u64 = minutes.trim().parse().map_err(|_| malformed())?;
    let seconds: f64 = seconds.trim().parse().map_err(|_| malformed())?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(malformed());
    }

    let seconds_ms = (seconds * 1000.0).round();
    if seconds_ms > u64::MAX as f64 {
        return Err(malformed());
    }

    hours
        .checked_mul(MS_PER_HOUR)
        .and_then(|ms| ms.checked_add(minutes.checked_mul(MS_PER_MINUTE)?))
        .and_then(|ms| ms.checked_add(seconds_ms as u64))
        .ok_or_else(malformed)
}

/// Render milliseconds as `HH:MM:SS.ss`, rounded to the nearest centisecond.
///
/// # Examples
///
/// ```
/// use ground_station::telemetry::types::format_mission_time;
///
/// assert_eq!(format_mission_time(3_723_500), "01:02:03.50");
/// assert_eq!(format_mission_time(0), "00:00:00.00");
/// ```
pub fn format_mission_time(ms: u64) -> String {
    let centis = ms / 10 + u64::from(ms % 10 >= 5);
    let hours = centis / 360_000;
    let minutes = (centis / 6_000) % 60;
    let seconds = (centis / 100) % 60;
    let fraction = centis % 100;
    format!("{:02}:{:02}:{:02}.{:02}", hours, minutes, seconds, fraction)
}
