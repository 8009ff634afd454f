// Sample domain model - normalized field readings
use chrono::{DateTime, Utc};
use serde::Serialize;

/// The monitored quantities. Ordering is used for deterministic keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Temperature,
    Humidity,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Temperature, Field::Humidity];

    /// Map a Data Source field name onto a monitored field
    pub fn from_source_name(name: &str) -> Option<Self> {
        match name {
            "temperature_celsius" => Some(Field::Temperature),
            "humidity_percent" => Some(Field::Humidity),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Field::Temperature => "temperature",
            Field::Humidity => "humidity",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Field::Temperature => "Temperature",
            Field::Humidity => "Humidity",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Field::Temperature => "°C",
            Field::Humidity => "%",
        }
    }

    /// Physical bounds a setpoint range must stay within
    pub fn domain(&self) -> (f64, f64) {
        match self {
            Field::Temperature => (0.0, 50.0),
            Field::Humidity => (0.0, 100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub location: String,
    pub process_stage: String,
    pub field: Field,
    pub value: f64,
    pub sensor_id: Option<String>,
}

impl Sample {
    pub fn new(
        time: DateTime<Utc>,
        location: String,
        process_stage: String,
        field: Field,
        value: f64,
        sensor_id: Option<String>,
    ) -> Self {
        Self {
            time,
            location,
            process_stage,
            field,
            value,
            sensor_id,
        }
    }
}

/// Most recent value of each field across the last ingested batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatestReading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

impl LatestReading {
    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::Temperature => self.temperature,
            Field::Humidity => self.humidity,
        }
    }

    pub fn set(&mut self, field: Field, value: Option<f64>) {
        match field {
            Field::Temperature => self.temperature = value,
            Field::Humidity => self.humidity = value,
        }
    }
}

/// Tag labels of the monitored sensor, fixed by the first record seen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub location: String,
    pub process_stage: String,
    pub sensor_id: String,
}
