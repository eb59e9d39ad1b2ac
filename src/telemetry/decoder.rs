//! # Record Decoder
//!
//! Decodes downlink lines of the form `<kind><payload>` into [`Record`]s.
//!
//! | Kind | Payload | Result |
//! |------|---------|--------|
//! | `0` | 11 comma separated telemetry fields | [`Record::Telemetry`] |
//! | `1` | free text | [`Record::Status`] |
//! | `2` | free text | [`Record::Error`] |
//!
//! Telemetry field order:
//! `team_id, mission_time, packet_count, sw_state, pl_state, altitude,
//! pressure, temp, voltage, gps_latitude, gps_longitude`.

use std::str::FromStr;

use super::types::*;
use crate::error::DecodeError;

/// Default upper bound on a single line, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 512;

/// A decoded downlink line
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Telemetry(TelemetrySample),
    Status(String),
    Error(String),
}

/// Line decoder with a configurable length limit.
#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder {
    max_line_length: usize,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl RecordDecoder {
    #[must_use]
    pub fn new(max_line_length: usize) -> Self {
        Self { max_line_length }
    }

    /// Decode one line.
    ///
    /// Returns `Ok(None)` for blank lines, which are silently discarded.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the line is too long, has an unknown
    /// record kind, or carries an invalid telemetry payload. No partial
    /// sample is ever produced.
    ///
    /// # Examples
    ///
    /// ```
    /// use ground_station::telemetry::decoder::{Record, RecordDecoder};
    ///
    /// let decoder = RecordDecoder::default();
    /// let record = decoder.decode("1 Awaiting launch").unwrap();
    /// assert_eq!(record, Some(Record::Status("Awaiting launch".to_string())));
    /// ```
    pub fn decode(&self, line: &str) -> Result<Option<Record>, DecodeError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        if line.len() > self.max_line_length {
            return Err(DecodeError::LineTooLong {
                length: line.len(),
                max: self.max_line_length,
            });
        }

        let mut chars = line.chars();
        let kind = match chars.next() {
            Some(kind) => kind,
            None => return Ok(None),
        };
        let payload = chars.as_str().trim();

        match kind {
            RECORD_KIND_TELEMETRY => decode_telemetry(payload).map(|s| Some(Record::Telemetry(s))),
            RECORD_KIND_STATUS => Ok(Some(Record::Status(payload.to_string()))),
            RECORD_KIND_ERROR => Ok(Some(Record::Error(payload.to_string()))),
            other => Err(DecodeError::UnknownKind(other)),
        }
    }
}

/// Decode one line with the default length limit
pub fn decode_line(line: &str) -> Result<Option<Record>, DecodeError> {
    RecordDecoder::default().decode(line)
}

/// Decode a telemetry payload (the part after the `0` kind character)
pub fn decode_telemetry(payload: &str) -> Result<TelemetrySample, DecodeError> {
    let fields: Vec<&str> = payload.split(',').collect();
    parse_telemetry_fields(&fields)
}

/// Build a sample from exactly [`TELEMETRY_FIELD_COUNT`] text fields.
///
/// Shared by live decoding and CSV replay so both apply the same validation.
pub fn parse_telemetry_fields<S: AsRef<str>>(fields: &[S]) -> Result<TelemetrySample, DecodeError> {
    if fields.len() != TELEMETRY_FIELD_COUNT {
        return Err(DecodeError::FieldCount {
            expected: TELEMETRY_FIELD_COUNT,
            found: fields.len(),
        });
    }

    let field = |f: Field| fields[f as usize].as_ref().trim();

    Ok(TelemetrySample {
        team_id: parse_int(Field::TeamId, field(Field::TeamId))?,
        mission_time_ms: mission_time_to_ms(field(Field::MissionTime))?,
        packet_count: parse_int(Field::PacketCount, field(Field::PacketCount))?,
        sw_state: field(Field::SwState).to_string(),
        pl_state: field(Field::PlState).to_string(),
        altitude: parse_float(Field::Altitude, field(Field::Altitude))?,
        pressure: parse_float(Field::Pressure, field(Field::Pressure))?,
        temperature: parse_float(Field::Temp, field(Field::Temp))?,
        voltage: parse_float(Field::Voltage, field(Field::Voltage))?,
        gps_latitude: parse_float(Field::GpsLatitude, field(Field::GpsLatitude))?,
        gps_longitude: parse_float(Field::GpsLongitude, field(Field::GpsLongitude))?,
    })
}

fn parse_int<T: FromStr>(field: Field, value: &str) -> Result<T, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidNumber {
        field: field.name(),
        value: value.to_string(),
    })
}

fn parse_float(field: Field, value: &str) -> Result<f64, DecodeError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(DecodeError::InvalidNumber {
            field: field.name(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PAYLOAD: &str =
        "1004,01:02:03.50,42,ASCENT,STOWED,1234.5,87.2,21.75,8.4,37.7749,-122.4194";

    fn telemetry_line() -> String {
        format!("0{}", VALID_PAYLOAD)
    }

    #[test]
    fn test_decode_valid_telemetry() {
        let record = decode_line(&telemetry_line()).unwrap();

        let sample = match record {
            Some(Record::Telemetry(sample)) => sample,
            other => panic!("Expected telemetry record, got: {:?}", other),
        };

        assert_eq!(sample.team_id, 1004);
        assert_eq!(sample.mission_time_ms, 3_723_500);
        assert_eq!(sample.packet_count, 42);
        assert_eq!(sample.sw_state, "ASCENT");
        assert_eq!(sample.pl_state, "STOWED");
        assert!((sample.altitude - 1234.5).abs() < 1e-9);
        assert!((sample.pressure - 87.2).abs() < 1e-9);
        assert!((sample.temperature - 21.75).abs() < 1e-9);
        assert!((sample.voltage - 8.4).abs() < 1e-9);
        assert!((sample.gps_latitude - 37.7749).abs() < 1e-9);
        assert!((sample.gps_longitude - (-122.4194)).abs() < 1e-9);
    }

    #[test]
    fn test_decode_trims_payload_and_fields() {
        let line = "0 1004, 00:00:01.00 ,7, IDLE ,OFF,1,2,3,4,5,6\r\n";
        let record = decode_line(line).unwrap();
        match record {
            Some(Record::Telemetry(sample)) => {
                assert_eq!(sample.mission_time_ms, 1000);
                assert_eq!(sample.sw_state, "IDLE");
                assert_eq!(sample.packet_count, 7);
            }
            other => panic!("Expected telemetry record, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_empty_time_is_zero() {
        let line = "01004,,1,IDLE,OFF,0,101.3,20,9,0,0";
        match decode_line(line).unwrap() {
            Some(Record::Telemetry(sample)) => assert_eq!(sample.mission_time_ms, 0),
            other => panic!("Expected telemetry record, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_status_and_error() {
        assert_eq!(
            decode_line("1 Parachute armed ").unwrap(),
            Some(Record::Status("Parachute armed".to_string()))
        );
        assert_eq!(
            decode_line("2GPS lost, retrying").unwrap(),
            Some(Record::Error("GPS lost, retrying".to_string()))
        );
        assert_eq!(decode_line("1").unwrap(), Some(Record::Status(String::new())));
    }

    #[test]
    fn test_decode_blank_lines_are_discarded() {
        assert_eq!(decode_line("").unwrap(), None);
        assert_eq!(decode_line("   \r").unwrap(), None);
    }

    #[test]
    fn test_decode_unknown_kind() {
        assert_eq!(decode_line("9hello"), Err(DecodeError::UnknownKind('9')));
        assert_eq!(decode_line("Xhello"), Err(DecodeError::UnknownKind('X')));
    }

    #[test]
    fn test_decode_wrong_field_count() {
        // Superseded 10-field layout without pressure
        let line = "01004,00:00:01.00,1,IDLE,OFF,100.0,20.0,9.0,37.0,-122.0";
        assert_eq!(
            decode_line(line),
            Err(DecodeError::FieldCount { expected: 11, found: 10 })
        );

        let line = format!("0{},extra", VALID_PAYLOAD);
        assert_eq!(
            decode_line(&line),
            Err(DecodeError::FieldCount { expected: 11, found: 12 })
        );

        assert_eq!(
            decode_line("0"),
            Err(DecodeError::FieldCount { expected: 11, found: 1 })
        );
    }

    #[test]
    fn test_decode_non_numeric_altitude() {
        let line = "01004,00:00:01.00,1,IDLE,OFF,high,87.2,20.0,9.0,37.0,-122.0";
        assert_eq!(
            decode_line(line),
            Err(DecodeError::InvalidNumber {
                field: "altitude",
                value: "high".to_string()
            })
        );
    }

    #[test]
    fn test_decode_non_finite_float() {
        let line = "01004,00:00:01.00,1,IDLE,OFF,NaN,87.2,20.0,9.0,37.0,-122.0";
        assert!(matches!(
            decode_line(line),
            Err(DecodeError::InvalidNumber { field: "altitude", .. })
        ));

        let line = "01004,00:00:01.00,1,IDLE,OFF,1.0,87.2,inf,9.0,37.0,-122.0";
        assert!(matches!(
            decode_line(line),
            Err(DecodeError::InvalidNumber { field: "temp", .. })
        ));
    }

    #[test]
    fn test_decode_invalid_team_id() {
        // Older firmware sent a text team id
        let line = "0TEAM1234,00:00:01.00,1,IDLE,OFF,1.0,87.2,20.0,9.0,37.0,-122.0";
        assert!(matches!(
            decode_line(line),
            Err(DecodeError::InvalidNumber { field: "team_id", .. })
        ));
    }

    #[test]
    fn test_decode_malformed_time() {
        let line = "01004,bad,1,IDLE,OFF,1.0,87.2,20.0,9.0,37.0,-122.0";
        assert_eq!(
            decode_line(line),
            Err(DecodeError::MalformedTime("bad".to_string()))
        );
    }

    #[test]
    fn test_decode_line_too_long() {
        let decoder = RecordDecoder::new(32);
        let line = format!("1{}", "x".repeat(40));
        assert_eq!(
            decoder.decode(&line),
            Err(DecodeError::LineTooLong { length: 41, max: 32 })
        );

        // Status lines within the limit still pass
        assert!(decoder.decode("1short").unwrap().is_some());
    }

    #[test]
    fn test_parse_telemetry_fields_from_owned_strings() {
        let fields: Vec<String> = VALID_PAYLOAD.split(',').map(str::to_string).collect();
        let sample = parse_telemetry_fields(&fields).unwrap();
        assert_eq!(sample.team_id, 1004);
        assert_eq!(sample, decode_telemetry(VALID_PAYLOAD).unwrap());
    }
}
