// Domain layer - pure monitoring types and algorithms
pub mod alert;
pub mod dataset;
pub mod sample;
pub mod setpoint;
pub mod telemetry;
