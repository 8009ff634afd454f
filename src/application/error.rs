// Failure taxonomy of the monitoring pipeline
use crate::domain::setpoint::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Data Source unreachable or rejected the credentials
    #[error("failed to connect to InfluxDB: {0}")]
    Connection(String),

    /// Data Source reachable but not healthy
    #[error("InfluxDB reports unhealthy status: {0}")]
    HealthCheck(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to render output: {0}")]
    Render(String),

    #[error("monitoring is not running")]
    NotMonitoring,

    #[error("no data to export")]
    NoData,
}

impl MonitorError {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::Connection(_) => "connection",
            MonitorError::HealthCheck(_) => "health_check",
            MonitorError::Query(_) => "query",
            MonitorError::Validation(_) => "validation",
            MonitorError::Render(_) => "render",
            MonitorError::NotMonitoring => "not_monitoring",
            MonitorError::NoData => "no_data",
        }
    }
}
