//! # Telemetry Store
//!
//! Per-field history of the most recent telemetry samples for live display.
//!
//! Each of the 11 fields is a [`RingBuffer`] with the same capacity. The only
//! mutators are [`TelemetryStore::append`] and [`TelemetryStore::clear`], which
//! touch every column together, so all columns always have the same length.

use serde::Serialize;

use super::ring::RingBuffer;
use super::types::{Field, TelemetrySample};

/// Default number of samples kept for live display
pub const DEFAULT_HISTORY_CAPACITY: usize = 15;

/// Values of one column, typed by the field's kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnValues {
    Integer(Vec<u64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Integer(v) => v.len(),
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded per-field telemetry history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryStore {
    team_id: RingBuffer<u32>,
    mission_time: RingBuffer<u64>,
    packet_count: RingBuffer<u32>,
    sw_state: RingBuffer<String>,
    pl_state: RingBuffer<String>,
    altitude: RingBuffer<f64>,
    pressure: RingBuffer<f64>,
    temp: RingBuffer<f64>,
    voltage: RingBuffer<f64>,
    gps_latitude: RingBuffer<f64>,
    gps_longitude: RingBuffer<f64>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl TelemetryStore {
    /// Store keeping the most recent `capacity` samples (minimum 1)
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(Some(capacity))
    }

    /// Store that keeps every sample, used for CSV replay
    #[must_use]
    pub fn unbounded() -> Self {
        Self::build(None)
    }

    fn build(capacity: Option<usize>) -> Self {
        fn make<T>(capacity: Option<usize>) -> RingBuffer<T> {
            match capacity {
                Some(c) => RingBuffer::with_capacity(c),
                None => RingBuffer::unbounded(),
            }
        }

        Self {
            team_id: make(capacity),
            mission_time: make(capacity),
            packet_count: make(capacity),
            sw_state: make(capacity),
            pl_state: make(capacity),
            altitude: make(capacity),
            pressure: make(capacity),
            temp: make(capacity),
            voltage: make(capacity),
            gps_latitude: make(capacity),
            gps_longitude: make(capacity),
        }
    }

    /// Append one fully decoded sample to every column, evicting the oldest
    /// sample when the store is full.
    pub fn append(&mut self, sample: TelemetrySample) {
        self.team_id.push(sample.team_id);
        self.mission_time.push(sample.mission_time_ms);
        self.packet_count.push(sample.packet_count);
        self.sw_state.push(sample.sw_state);
        self.pl_state.push(sample.pl_state);
        self.altitude.push(sample.altitude);
        self.pressure.push(sample.pressure);
        self.temp.push(sample.temperature);
        self.voltage.push(sample.voltage);
        self.gps_latitude.push(sample.gps_latitude);
        self.gps_longitude.push(sample.gps_longitude);
    }

    /// Remove every sample, keeping the capacity
    pub fn clear(&mut self) {
        self.team_id.clear();
        self.mission_time.clear();
        self.packet_count.clear();
        self.sw_state.clear();
        self.pl_state.clear();
        self.altitude.clear();
        self.pressure.clear();
        self.temp.clear();
        self.voltage.clear();
        self.gps_latitude.clear();
        self.gps_longitude.clear();
    }

    /// Read-consistent copy for readers outside the ingestion loop
    pub fn snapshot(&self) -> TelemetryStore {
        self.clone()
    }

    /// Number of samples held (identical for every column)
    pub fn len(&self) -> usize {
        self.team_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` for an unbounded replay store
    pub fn capacity(&self) -> Option<usize> {
        self.team_id.capacity()
    }

    /// Lengths of all 11 columns in field order
    pub fn column_lengths(&self) -> [usize; 11] {
        [
            self.team_id.len(),
            self.mission_time.len(),
            self.packet_count.len(),
            self.sw_state.len(),
            self.pl_state.len(),
            self.altitude.len(),
            self.pressure.len(),
            self.temp.len(),
            self.voltage.len(),
            self.gps_latitude.len(),
            self.gps_longitude.len(),
        ]
    }

    /// Reassemble the sample at `index` (0 = oldest)
    pub fn sample(&self, index: usize) -> Option<TelemetrySample> {
        Some(TelemetrySample {
            team_id: *self.team_id.get(index)?,
            mission_time_ms: *self.mission_time.get(index)?,
            packet_count: *self.packet_count.get(index)?,
            sw_state: self.sw_state.get(index)?.clone(),
            pl_state: self.pl_state.get(index)?.clone(),
            altitude: *self.altitude.get(index)?,
            pressure: *self.pressure.get(index)?,
            temperature: *self.temp.get(index)?,
            voltage: *self.voltage.get(index)?,
            gps_latitude: *self.gps_latitude.get(index)?,
            gps_longitude: *self.gps_longitude.get(index)?,
        })
    }

    /// Most recently appended sample
    pub fn latest(&self) -> Option<TelemetrySample> {
        self.len().checked_sub(1).and_then(|i| self.sample(i))
    }

    /// All held samples, oldest first
    pub fn samples(&self) -> Vec<TelemetrySample> {
        (0..self.len()).filter_map(|i| self.sample(i)).collect()
    }

    /// Copy of one column
    pub fn column(&self, field: Field) -> ColumnValues {
        fn ints<T: Copy + Into<u64>>(ring: &RingBuffer<T>) -> ColumnValues {
            ColumnValues::Integer(ring.iter().map(|v| (*v).into()).collect())
        }

        match field {
            Field::TeamId => ints(&self.team_id),
            Field::MissionTime => ints(&self.mission_time),
            Field::PacketCount => ints(&self.packet_count),
            Field::SwState => ColumnValues::Text(self.sw_state.to_vec()),
            Field::PlState => ColumnValues::Text(self.pl_state.to_vec()),
            Field::Altitude => ColumnValues::Float(self.altitude.to_vec()),
            Field::Pressure => ColumnValues::Float(self.pressure.to_vec()),
            Field::Temp => ColumnValues::Float(self.temp.to_vec()),
            Field::Voltage => ColumnValues::Float(self.voltage.to_vec()),
            Field::GpsLatitude => ColumnValues::Float(self.gps_latitude.to_vec()),
            Field::GpsLongitude => ColumnValues::Float(self.gps_longitude.to_vec()),
        }
    }

    /// Copy of one column looked up by its lower-case key (`"altitude"`)
    pub fn column_by_name(&self, name: &str) -> Option<ColumnValues> {
        Field::from_name(name).map(|f| self.column(f))
    }

    pub fn team_ids(&self) -> &RingBuffer<u32> {
        &self.team_id
    }

    pub fn mission_times(&self) -> &RingBuffer<u64> {
        &self.mission_time
    }

    pub fn packet_counts(&self) -> &RingBuffer<u32> {
        &self.packet_count
    }

    pub fn sw_states(&self) -> &RingBuffer<String> {
        &self.sw_state
    }

    pub fn pl_states(&self) -> &RingBuffer<String> {
        &self.pl_state
    }

    pub fn altitudes(&self) -> &RingBuffer<f64> {
        &self.altitude
    }

    pub fn pressures(&self) -> &RingBuffer<f64> {
        &self.pressure
    }

    pub fn temperatures(&self) -> &RingBuffer<f64> {
        &self.temp
    }

    pub fn voltages(&self) -> &RingBuffer<f64> {
        &self.voltage
    }

    pub fn gps_latitudes(&self) -> &RingBuffer<f64> {
        &self.gps_latitude
    }

    pub fn gps_longitudes(&self) -> &RingBuffer<f64> {
        &self.gps_longitude
    }
}
