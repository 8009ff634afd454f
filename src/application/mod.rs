// Application layer - monitoring use cases
pub mod dashboard_service;
pub mod error;
pub mod export_service;
pub mod ingestor;
pub mod monitoring_service;
pub mod monitoring_session;
pub mod telemetry_repository;
