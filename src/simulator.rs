//! # Downlink Simulator
//!
//! Generates a plausible payload downlink for bench testing without flight
//! hardware: a climb-and-descend flight profile sent as 11-field telemetry
//! records, with periodic status records and the occasional error record.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{GroundStationError, Result};
use crate::telemetry::types::{
    format_mission_time, RECORD_KIND_ERROR, RECORD_KIND_STATUS, RECORD_KIND_TELEMETRY,
};

/// Team identifier used when none is given
pub const DEFAULT_TEAM_ID: u32 = 1234;

/// A status record is emitted after this many telemetry packets
const STATUS_INTERVAL_PACKETS: u32 = 10;

/// Chance of an error record following any telemetry packet
const ERROR_PROBABILITY: f64 = 0.02;

/// Apogee of the simulated flight in metres
const APOGEE_M: f64 = 750.0;

/// Packets spent climbing to apogee; descent takes twice as long
const ASCENT_PACKETS: u32 = 60;

const SEA_LEVEL_PRESSURE_KPA: f64 = 101.325;
const SEA_LEVEL_TEMP_C: f64 = 15.0;
const LAPSE_RATE_C_PER_M: f64 = 0.0065;

const LAUNCH_LATITUDE: f64 = 32.990_254;
const LAUNCH_LONGITUDE: f64 = -106.974_998;

const PAYLOAD_STATES: &[&str] = &["STOWED", "DEPLOYED"];
const ERROR_MESSAGES: &[&str] = &[
    "GPS fix lost",
    "Barometer read timeout",
    "SD card write failed",
];

/// Synthetic telemetry generator
#[derive(Debug)]
pub struct DownlinkSimulator {
    rng: StdRng,
    team_id: u32,
    period: Duration,
    packet_count: u32,
    mission_time_ms: u64,
}

impl DownlinkSimulator {
    /// Create a simulator sending one packet every `period`
    pub fn new(team_id: u32, period: Duration) -> Self {
        Self::with_rng(StdRng::from_entropy(), team_id, period)
    }

    /// Reproducible simulator for tests
    pub fn seeded(seed: u64, team_id: u32, period: Duration) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), team_id, period)
    }

    fn with_rng(rng: StdRng, team_id: u32, period: Duration) -> Self {
        Self {
            rng,
            team_id,
            period,
            packet_count: 0,
            mission_time_ms: 0,
        }
    }

    /// Telemetry packets generated so far
    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Next telemetry record line, without terminator
    pub fn next_telemetry(&mut self) -> String {
        self.packet_count += 1;
        self.mission_time_ms += self.period.as_millis() as u64;

        let altitude = (self.altitude_at(self.packet_count) + self.rng.gen_range(-0.5..0.5)).max(0.0);
        let pressure = SEA_LEVEL_PRESSURE_KPA * (1.0 - 2.255_77e-5 * altitude).powf(5.255_88);
        let temperature =
            SEA_LEVEL_TEMP_C - LAPSE_RATE_C_PER_M * altitude + self.rng.gen_range(-0.2..0.2);
        // Battery sags slowly over the flight
        let voltage = 8.4 - 0.0005 * f64::from(self.packet_count) + self.rng.gen_range(-0.02..0.02);
        let latitude = LAUNCH_LATITUDE + self.rng.gen_range(-0.0005..0.0005);
        let longitude = LAUNCH_LONGITUDE + self.rng.gen_range(-0.0005..0.0005);

        let pl_state = if self.packet_count > ASCENT_PACKETS {
            PAYLOAD_STATES[1]
        } else {
            PAYLOAD_STATES[0]
        };

        format!(
            "{}{:04},{},{},{},{},{:.1},{:.3},{:.1},{:.2},{:.6},{:.6}",
            RECORD_KIND_TELEMETRY,
            self.team_id,
            format_mission_time(self.mission_time_ms),
            self.packet_count,
            self.flight_state(),
            pl_state,
            altitude,
            pressure,
            temperature,
            voltage,
            latitude,
            longitude
        )
    }

    /// Lines for one period: a telemetry record, plus status/error records
    /// when due.
    pub fn next_batch(&mut self) -> Vec<String> {
        let mut lines = vec![self.next_telemetry()];

        if self.packet_count % STATUS_INTERVAL_PACKETS == 0 {
            lines.push(format!(
                "{}{} at packet {}",
                RECORD_KIND_STATUS,
                self.flight_state(),
                self.packet_count
            ));
        }

        if self.rng.gen_bool(ERROR_PROBABILITY) {
            if let Some(message) = ERROR_MESSAGES.choose(&mut self.rng) {
                lines.push(format!("{}{}", RECORD_KIND_ERROR, message));
            }
        }

        lines
    }

    /// Write the next batch, newline terminated, and flush.
    ///
    /// Returns the number of lines written.
    pub async fn write_batch<W>(&mut self, writer: &mut W) -> Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let lines = self.next_batch();
        for line in &lines {
            writer
                .write_all(format!("{}\n", line).as_bytes())
                .await
                .map_err(|e| GroundStationError::Transport(format!("Failed to send line: {}", e)))?;
        }
        writer
            .flush()
            .await
            .map_err(|e| GroundStationError::Transport(format!("Failed to flush: {}", e)))?;
        Ok(lines.len())
    }

    fn altitude_at(&self, packet: u32) -> f64 {
        let t = f64::from(packet);
        let climb = f64::from(ASCENT_PACKETS);
        if t <= climb {
            APOGEE_M * (t / climb)
        } else {
            APOGEE_M * (1.0 - (t - climb) / (2.0 * climb))
        }
    }

    fn flight_state(&self) -> &'static str {
        match self.packet_count {
            0 => "LAUNCH_PAD",
            n if n < ASCENT_PACKETS => "ASCENT",
            n if n < ASCENT_PACKETS * 3 => "DESCENT",
            _ => "LANDED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::decoder::decode_line;
    use crate::telemetry::Record;

    fn sim(seed: u64) -> DownlinkSimulator {
        DownlinkSimulator::seeded(seed, DEFAULT_TEAM_ID, Duration::from_millis(500))
    }

    #[test]
    fn test_telemetry_lines_decode() {
        let mut simulator = sim(7);
        for expected_count in 1..=200u32 {
            let line = simulator.next_telemetry();
            match decode_line(&line) {
                Ok(Some(Record::Telemetry(sample))) => {
                    assert_eq!(sample.team_id, DEFAULT_TEAM_ID);
                    assert_eq!(sample.packet_count, expected_count);
                    assert_eq!(sample.mission_time_ms, u64::from(expected_count) * 500);
                    assert!(sample.altitude >= 0.0);
                    assert!(sample.pressure > 0.0 && sample.pressure <= 101.4);
                }
                other => panic!("line {:?} decoded to {:?}", line, other),
            }
        }
    }

    #[test]
    fn test_batches_contain_status_records() {
        let mut simulator = sim(3);
        let mut status = 0;
        let mut telemetry = 0;

        for _ in 0..50 {
            for line in simulator.next_batch() {
                match decode_line(&line) {
                    Ok(Some(Record::Telemetry(_))) => telemetry += 1,
                    Ok(Some(Record::Status(_))) => status += 1,
                    Ok(Some(Record::Error(text))) => assert!(ERROR_MESSAGES.contains(&text.as_str())),
                    other => panic!("unexpected {:?}", other),
                }
            }
        }

        assert_eq!(telemetry, 50);
        assert_eq!(status, 5);
    }

    #[test]
    fn test_seeded_simulators_agree() {
        let mut a = sim(42);
        let mut b = sim(42);
        for _ in 0..20 {
            assert_eq!(a.next_batch(), b.next_batch());
        }
    }

    #[test]
    fn test_flight_profile() {
        let simulator = sim(1);
        assert_eq!(simulator.altitude_at(0), 0.0);
        assert_eq!(simulator.altitude_at(ASCENT_PACKETS), APOGEE_M);
        assert_eq!(simulator.altitude_at(ASCENT_PACKETS * 3), 0.0);
    }

    #[tokio::test]
    async fn test_write_batch_terminates_lines() {
        let mut simulator = sim(9);
        let mut out: Vec<u8> = Vec::new();

        let written = simulator.write_batch(&mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), written);
        assert!(text.ends_with('\n'));
        assert!(text.starts_with('0'));
    }
}
