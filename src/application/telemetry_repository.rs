// Repository trait for the time-series Data Source
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A field record as returned by the Data Source, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub field: String,
    pub value: f64,
    pub time: DateTime<Utc>,
    pub location: Option<String>,
    pub process_stage: Option<String>,
    pub sensor_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: bool,
    pub message: String,
}

#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Probe the service. An `Err` means it could not be reached at all.
    async fn check_health(&self) -> anyhow::Result<HealthReport>;

    /// Fetch the raw records of the configured rolling window
    async fn query_records(&self) -> anyhow::Result<Vec<RawRecord>>;
}
