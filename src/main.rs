// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::application::dashboard_service::DashboardService;
use crate::application::monitoring_service::{MonitorSettings, MonitoringService};
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::csv_export::CsvTableWriter;
use crate::infrastructure::influx_repository::InfluxRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    alerts, charts, export, get_setpoints, health_check, refresh, start_monitoring, status,
    stop_monitoring, stream_alerts, table, update_setpoints,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tank_monitor=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = load_app_config()?;
    let setpoints = config.setpoints.to_setpoints()?;
    let offset = config.monitoring.display_offset()?;

    // Create repository (infrastructure layer)
    let repository = Arc::new(InfluxRepository::new(&config.influx, &config.query)?);

    // Create services (application layer)
    let monitoring_service = MonitoringService::new(
        repository,
        DashboardService::new(offset),
        MonitorSettings {
            poll_interval: Duration::from_secs(config.monitoring.poll_interval_secs.max(1)),
            alert_cooldown_secs: config.monitoring.alert_cooldown_secs,
            alert_history: config.monitoring.alert_history,
            has_credentials: !config.influx.token.is_empty(),
        },
        setpoints,
    );

    // Create application state
    let state = Arc::new(AppState {
        monitoring_service,
        exporter: Arc::new(CsvTableWriter),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/status", get(status))
        .route("/monitoring/start", post(start_monitoring))
        .route("/monitoring/stop", post(stop_monitoring))
        .route("/monitoring/refresh", post(refresh))
        .route("/setpoints", get(get_setpoints).put(update_setpoints))
        .route("/dashboard/charts", get(charts))
        .route("/dashboard/table", get(table))
        .route("/alerts", get(alerts))
        .route("/alerts/stream", get(stream_alerts))
        .route("/export", get(export))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    tracing::info!("Starting tank-monitor service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
