// Application state for HTTP handlers
use crate::application::export_service::TableWriter;
use crate::application::monitoring_service::MonitoringService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub monitoring_service: MonitoringService,
    pub exporter: Arc<dyn TableWriter>,
}
