// Monitoring controller - session lifecycle, polling and user actions
use crate::application::dashboard_service::DashboardService;
use crate::application::error::MonitorError;
use crate::application::export_service::{export_rows, ExportFile, TableWriter};
use crate::application::monitoring_session::{CycleOutcome, MonitoringSession};
use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::alert::{AlertNotification, AlertPhase};
use crate::domain::sample::{LatestReading, SourceInfo};
use crate::domain::setpoint::Setpoints;
use crate::domain::telemetry::{ChartData, TableRow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    ConnectionFailed,
    HealthCheckFailed,
    QueryFailed,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub alert_cooldown_secs: i64,
    pub alert_history: usize,
    /// Access token must be configured before a session can start
    pub has_credentials: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub status: ConnectionStatus,
    pub monitoring: bool,
    pub last_error: Option<String>,
    pub last_updated: Option<String>,
    pub source: Option<SourceInfo>,
    pub latest: Option<LatestReading>,
    pub alert_phase: Option<AlertPhase>,
    pub rows: usize,
    pub samples: usize,
}

struct ControllerState {
    setpoints: Setpoints,
    session: Option<MonitoringSession>,
    ticker: Option<JoinHandle<()>>,
    status: ConnectionStatus,
    last_error: Option<String>,
    alert_history: VecDeque<AlertNotification>,
    next_session_id: u64,
}

impl ControllerState {
    fn fail(&mut self, status: ConnectionStatus, error: &MonitorError) {
        self.status = status;
        self.last_error = Some(error.to_string());
    }

    fn current_session_id(&self) -> Option<u64> {
        self.session.as_ref().map(MonitoringSession::id)
    }
}

#[derive(Clone)]
pub struct MonitoringService {
    repository: Arc<dyn TelemetryRepository>,
    dashboard: DashboardService,
    settings: MonitorSettings,
    state: Arc<Mutex<ControllerState>>,
    // Serializes ingestion cycles from the timer and manual refreshes
    cycle_lock: Arc<Mutex<()>>,
    alerts: broadcast::Sender<AlertNotification>,
}

impl MonitoringService {
    pub fn new(
        repository: Arc<dyn TelemetryRepository>,
        dashboard: DashboardService,
        settings: MonitorSettings,
        setpoints: Setpoints,
    ) -> Self {
        let (alerts, _) = broadcast::channel(16);
        Self {
            repository,
            dashboard,
            settings,
            state: Arc::new(Mutex::new(ControllerState {
                setpoints,
                session: None,
                ticker: None,
                status: ConnectionStatus::Disconnected,
                last_error: None,
                alert_history: VecDeque::new(),
                next_session_id: 1,
            })),
            cycle_lock: Arc::new(Mutex::new(())),
            alerts,
        }
    }

    /// Check the Data Source and begin polling. Starting twice is a no-op.
    pub async fn start(&self) -> Result<(), MonitorError> {
        if self.state.lock().await.session.is_some() {
            return Ok(());
        }

        if let Err(err) = self.connect().await {
            let status = match err {
                MonitorError::HealthCheck(_) => ConnectionStatus::HealthCheckFailed,
                _ => ConnectionStatus::ConnectionFailed,
            };
            tracing::error!("Failed to start monitoring: {}", err);
            self.state.lock().await.fail(status, &err);
            return Err(err);
        }

        let mut state = self.state.lock().await;
        // Another start may have won while the health check was in flight
        if state.session.is_some() {
            return Ok(());
        }

        let session_id = state.next_session_id;
        state.next_session_id += 1;
        state.session = Some(MonitoringSession::new(
            session_id,
            self.settings.alert_cooldown_secs,
        ));
        state.alert_history.clear();
        state.status = ConnectionStatus::Connected;
        state.last_error = None;

        let service = self.clone();
        state.ticker = Some(tokio::spawn(async move {
            service.run_ticker(session_id).await;
        }));

        tracing::info!(
            session = session_id,
            interval_secs = self.settings.poll_interval.as_secs(),
            "Monitoring started"
        );
        Ok(())
    }

    async fn connect(&self) -> Result<(), MonitorError> {
        if !self.settings.has_credentials {
            return Err(MonitorError::Connection(
                "no access token configured".to_string(),
            ));
        }

        let report = self
            .repository
            .check_health()
            .await
            .map_err(|e| MonitorError::Connection(format!("{:#}", e)))?;

        if !report.healthy {
            return Err(MonitorError::HealthCheck(report.message));
        }
        Ok(())
    }

    /// Cancel polling and discard the session. Returns whether one was running.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        let Some(session) = state.session.take() else {
            return false;
        };

        state.status = ConnectionStatus::Stopped;
        tracing::info!(session = session.id(), "Monitoring stopped");
        true
    }

    /// Run one ingestion cycle right away
    pub async fn refresh(&self) -> Result<CycleOutcome, MonitorError> {
        let session_id = self
            .state
            .lock()
            .await
            .current_session_id()
            .ok_or(MonitorError::NotMonitoring)?;
        self.run_cycle(session_id).await
    }

    async fn run_ticker(self, session_id: u64) {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match self.run_cycle(session_id).await {
                Ok(_) => {}
                Err(MonitorError::NotMonitoring) => break,
                Err(err) => tracing::warn!(session = session_id, "Monitoring cycle failed: {}", err),
            }
        }
    }

    async fn run_cycle(&self, session_id: u64) -> Result<CycleOutcome, MonitorError> {
        let _cycle = self.cycle_lock.lock().await;
        if self.state.lock().await.current_session_id() != Some(session_id) {
            return Err(MonitorError::NotMonitoring);
        }

        let result = self.repository.query_records().await;

        let mut state = self.state.lock().await;
        if state.current_session_id() != Some(session_id) {
            tracing::debug!(session = session_id, "Dropping result of a stopped session");
            return Err(MonitorError::NotMonitoring);
        }

        let records = match result {
            Ok(records) => records,
            Err(e) => {
                let err = MonitorError::Query(format!("{:#}", e));
                state.fail(ConnectionStatus::QueryFailed, &err);
                return Err(err);
            }
        };

        let setpoints = state.setpoints;
        let Some(session) = state.session.as_mut() else {
            return Err(MonitorError::NotMonitoring);
        };
        let outcome = session.ingest(records, &setpoints, Utc::now());

        state.status = ConnectionStatus::Connected;
        state.last_error = None;
        if let Some(alert) = &outcome.alert {
            self.publish_alert(&mut state, alert.clone());
        }
        Ok(outcome)
    }

    /// Validate and commit new ranges, then re-check the latest reading
    /// without waiting for the cooldown.
    pub async fn update_setpoints(
        &self,
        temp_min: f64,
        temp_max: f64,
        hum_min: f64,
        hum_max: f64,
    ) -> Result<Option<AlertNotification>, MonitorError> {
        let mut state = self.state.lock().await;
        state.setpoints.update(temp_min, temp_max, hum_min, hum_max)?;
        tracing::info!(temp_min, temp_max, hum_min, hum_max, "Setpoints updated");

        let setpoints = state.setpoints;
        let alert = state
            .session
            .as_mut()
            .and_then(|session| session.setpoints_changed(&setpoints, Utc::now()));

        if let Some(alert) = &alert {
            self.publish_alert(&mut state, alert.clone());
        }
        Ok(alert)
    }

    fn publish_alert(&self, state: &mut ControllerState, alert: AlertNotification) {
        tracing::warn!(messages = alert.messages.len(), "Alert fired:\n{}", alert.text);

        state.alert_history.push_back(alert.clone());
        while state.alert_history.len() > self.settings.alert_history {
            state.alert_history.pop_front();
        }
        // No subscribers is fine
        let _ = self.alerts.send(alert);
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertNotification> {
        self.alerts.subscribe()
    }

    pub async fn setpoints(&self) -> Setpoints {
        self.state.lock().await.setpoints
    }

    pub async fn alert_history(&self) -> Vec<AlertNotification> {
        self.state.lock().await.alert_history.iter().cloned().collect()
    }

    pub async fn status(&self) -> StatusView {
        let state = self.state.lock().await;
        let session = state.session.as_ref();

        StatusView {
            status: state.status,
            monitoring: session.is_some(),
            last_error: state.last_error.clone(),
            last_updated: session
                .and_then(MonitoringSession::last_updated)
                .map(|t| self.dashboard.local_time(t)),
            source: session.and_then(|s| s.source().cloned()),
            latest: session.map(MonitoringSession::latest),
            alert_phase: session.map(|s| s.alert_phase(Utc::now())),
            rows: session.map_or(0, |s| s.dataset().rows().len()),
            samples: session.map_or(0, |s| s.dataset().sample_count()),
        }
    }

    pub async fn charts(&self) -> Vec<ChartData> {
        let state = self.state.lock().await;
        match &state.session {
            Some(session) => self.dashboard.charts(session.dataset(), &state.setpoints),
            None => Vec::new(),
        }
    }

    pub async fn table(&self) -> Vec<TableRow> {
        let state = self.state.lock().await;
        match &state.session {
            Some(session) => self.dashboard.table(session.dataset().rows(), &state.setpoints),
            None => Vec::new(),
        }
    }

    pub async fn export(
        &self,
        writer: &dyn TableWriter,
        now: DateTime<Utc>,
    ) -> Result<ExportFile, MonitorError> {
        let rows = {
            let state = self.state.lock().await;
            let session = state.session.as_ref().ok_or(MonitorError::NoData)?;
            let rows = session.dataset().rows();
            if rows.is_empty() {
                return Err(MonitorError::NoData);
            }
            export_rows(rows, &state.setpoints, &self.dashboard)
        };

        let bytes = writer
            .write(&rows)
            .map_err(|e| MonitorError::Render(format!("{:#}", e)))?;

        let file_name = format!(
            "tank_monitoring_{}.{}",
            now.with_timezone(&self.dashboard.offset()).format("%Y%m%d_%H%M%S"),
            writer.extension()
        );
        tracing::info!(rows = rows.len(), file = %file_name, "Exported dataset");

        Ok(ExportFile {
            file_name,
            content_type: writer.content_type(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::telemetry_repository::{HealthReport, RawRecord};
    use crate::infrastructure::csv_export::CsvTableWriter;
    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Serves queued batches in order, then empty batches
    #[derive(Default)]
    struct FakeRepository {
        healthy: bool,
        unreachable: bool,
        batches: StdMutex<VecDeque<anyhow::Result<Vec<RawRecord>>>>,
        query_delay: Duration,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl FakeRepository {
        fn healthy(batches: Vec<anyhow::Result<Vec<RawRecord>>>) -> Self {
            Self {
                healthy: true,
                batches: StdMutex::new(batches.into()),
                ..Self::default()
            }
        }

        fn slow(batches: Vec<anyhow::Result<Vec<RawRecord>>>, delay: Duration) -> Self {
            Self {
                query_delay: delay,
                ..Self::healthy(batches)
            }
        }

        async fn wait_for_query(&self) {
            for _ in 0..100 {
                if self.in_flight.load(Ordering::SeqCst) > 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("no query started");
        }
    }

    #[async_trait]
    impl TelemetryRepository for FakeRepository {
        async fn check_health(&self) -> anyhow::Result<HealthReport> {
            if self.unreachable {
                anyhow::bail!("connection refused");
            }
            Ok(HealthReport {
                healthy: self.healthy,
                message: if self.healthy { "ready" } else { "database unavailable" }.to_string(),
            })
        }

        async fn query_records(&self) -> anyhow::Result<Vec<RawRecord>> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
            if !self.query_delay.is_zero() {
                tokio::time::sleep(self.query_delay).await;
            }
            let batch = self
                .batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            batch
        }
    }

    fn record(field: &str, value: f64, minute: u32) -> RawRecord {
        RawRecord {
            field: field.to_string(),
            value,
            time: Utc.with_ymd_and_hms(2025, 3, 1, 10, minute, 0).unwrap(),
            location: Some("Crude Oil Storage Tank T-101".to_string()),
            process_stage: Some("Storage".to_string()),
            sensor_id: Some("SHT20-001".to_string()),
        }
    }

    fn service(repository: FakeRepository) -> MonitoringService {
        service_with(Arc::new(repository))
    }

    fn service_with(repository: Arc<FakeRepository>) -> MonitoringService {
        MonitoringService::new(
            repository,
            DashboardService::new(FixedOffset::east_opt(7 * 3600).unwrap()),
            MonitorSettings {
                // Long interval so only the immediate first tick runs during a test
                poll_interval: Duration::from_secs(3600),
                alert_cooldown_secs: 300,
                alert_history: 2,
                has_credentials: true,
            },
            Setpoints::default(),
        )
    }

    /// Start and wait for the initial tick to consume the first batch
    async fn start_and_settle(service: &MonitoringService) {
        service.start().await.unwrap();
        for _ in 0..100 {
            if service.status().await.last_updated.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("initial cycle did not complete");
    }

    #[tokio::test]
    async fn test_start_runs_initial_cycle() {
        let service = service(FakeRepository::healthy(vec![Ok(vec![
            record("temperature_celsius", 26.0, 0),
            record("humidity_percent", 65.0, 0),
        ])]));
        start_and_settle(&service).await;

        let status = service.status().await;
        assert!(status.monitoring);
        assert_eq!(status.status, ConnectionStatus::Connected);
        assert_eq!(status.rows, 1);
        assert_eq!(status.samples, 2);
        assert_eq!(status.source.unwrap().sensor_id, "SHT20-001");
        assert!(service.alert_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_fails_when_unreachable() {
        let service = service(FakeRepository {
            unreachable: true,
            ..FakeRepository::default()
        });

        let err = service.start().await.unwrap_err();
        assert!(matches!(err, MonitorError::Connection(_)));
        let status = service.status().await;
        assert!(!status.monitoring);
        assert_eq!(status.status, ConnectionStatus::ConnectionFailed);
    }

    #[tokio::test]
    async fn test_start_fails_when_unhealthy() {
        let service = service(FakeRepository::default());

        let err = service.start().await.unwrap_err();
        assert!(matches!(err, MonitorError::HealthCheck(ref m) if m == "database unavailable"));
        assert_eq!(service.status().await.status, ConnectionStatus::HealthCheckFailed);
    }

    #[tokio::test]
    async fn test_start_requires_credentials() {
        let mut service = service(FakeRepository::healthy(Vec::new()));
        service.settings.has_credentials = false;

        assert!(matches!(service.start().await, Err(MonitorError::Connection(_))));
    }

    #[tokio::test]
    async fn test_refresh_fires_alert_and_broadcasts() {
        let service = service(FakeRepository::healthy(vec![
            Ok(vec![
                record("temperature_celsius", 26.0, 0),
                record("humidity_percent", 65.0, 0),
            ]),
            Ok(vec![record("temperature_celsius", 31.0, 10)]),
        ]));
        let mut alerts = service.subscribe_alerts();
        start_and_settle(&service).await;

        let outcome = service.refresh().await.unwrap();
        let alert = outcome.alert.expect("high temperature alert");
        assert!(alert.text.contains("HIGH TEMPERATURE"));
        assert_eq!(alerts.recv().await.unwrap(), alert);

        let table = service.table().await;
        assert_eq!(table.len(), 2);
        assert!(table[1].out_of_range);
        assert_eq!(service.status().await.alert_phase, Some(AlertPhase::Cooling));
    }

    #[tokio::test]
    async fn test_query_failure_keeps_session_alive() {
        let service = service(FakeRepository::healthy(vec![
            Ok(vec![record("temperature_celsius", 26.0, 0)]),
            Err(anyhow::anyhow!("timeout")),
        ]));
        start_and_settle(&service).await;

        let err = service.refresh().await.unwrap_err();
        assert!(matches!(err, MonitorError::Query(_)));

        let status = service.status().await;
        assert!(status.monitoring);
        assert_eq!(status.status, ConnectionStatus::QueryFailed);
        assert_eq!(status.rows, 1);

        service.refresh().await.unwrap();
        assert_eq!(service.status().await.status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_setpoint_update_reevaluates_immediately() {
        let service = service(FakeRepository::healthy(vec![Ok(vec![
            record("temperature_celsius", 31.0, 0),
            record("humidity_percent", 65.0, 0),
        ])]));
        start_and_settle(&service).await;
        assert_eq!(service.alert_history().await.len(), 1);

        // Cooling, but the new range is checked right away
        let alert = service.update_setpoints(20.0, 28.0, 50.0, 70.0).await.unwrap();
        assert!(alert.unwrap().text.contains("(Too high by 3.0°C)"));
        assert_eq!(service.alert_history().await.len(), 2);

        let err = service.update_setpoints(10.0, 5.0, 60.0, 70.0).await.unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));
        assert_eq!(service.setpoints().await.read().0.max, 28.0);
    }

    #[tokio::test]
    async fn test_setpoint_update_without_session() {
        let service = service(FakeRepository::healthy(Vec::new()));

        let alert = service.update_setpoints(24.0, 30.0, 50.0, 70.0).await.unwrap();
        assert!(alert.is_none());
        assert_eq!(service.setpoints().await, Setpoints::default());
    }

    #[tokio::test]
    async fn test_alert_history_is_bounded() {
        let service = service(FakeRepository::healthy(vec![Ok(vec![record(
            "temperature_celsius",
            31.0,
            0,
        )])]));
        start_and_settle(&service).await;

        service.update_setpoints(20.0, 29.0, 50.0, 70.0).await.unwrap();
        service.update_setpoints(20.0, 28.0, 50.0, 70.0).await.unwrap();

        let history = service.alert_history().await;
        assert_eq!(history.len(), 2);
        assert!(history[1].text.contains("Normal range: 20.0-28.0°C"));
    }

    #[tokio::test]
    async fn test_stop_discards_session() {
        let service = service(FakeRepository::healthy(vec![Ok(vec![record(
            "temperature_celsius",
            26.0,
            0,
        )])]));
        start_and_settle(&service).await;

        assert!(service.stop().await);
        assert!(!service.stop().await);

        let status = service.status().await;
        assert!(!status.monitoring);
        assert_eq!(status.status, ConnectionStatus::Stopped);
        assert!(service.table().await.is_empty());
        assert!(service.charts().await.is_empty());
        assert!(matches!(service.refresh().await, Err(MonitorError::NotMonitoring)));
    }

    #[tokio::test]
    async fn test_export() {
        let service = service(FakeRepository::healthy(vec![Ok(vec![
            record("temperature_celsius", 31.0, 0),
            record("humidity_percent", 65.0, 0),
        ])]));
        assert!(matches!(
            service.export(&CsvTableWriter, Utc::now()).await,
            Err(MonitorError::NoData)
        ));
        start_and_settle(&service).await;

        let now = Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap();
        let file = service.export(&CsvTableWriter, now).await.unwrap();
        assert_eq!(file.file_name, "tank_monitoring_20250301_180000.csv");
        let text = String::from_utf8(file.bytes).unwrap();
        assert_eq!(
            text.lines().last(),
            Some("2025-03-01 17:00:00,Crude Oil Storage Tank T-101,Storage,31,65,true")
        );
    }

    #[tokio::test]
    async fn test_result_of_stopped_session_is_dropped() {
        let repository = Arc::new(FakeRepository::slow(
            vec![
                Ok(vec![record("temperature_celsius", 26.0, 0)]),
                Ok(vec![record("temperature_celsius", 31.0, 10)]),
            ],
            Duration::from_millis(50),
        ));
        let service = service_with(repository.clone());
        start_and_settle(&service).await;

        let pending = tokio::spawn({
            let service = service.clone();
            async move { service.refresh().await }
        });
        repository.wait_for_query().await;

        // Restart while the refresh is still waiting on the Data Source
        assert!(service.stop().await);
        service.start().await.unwrap();

        let stale = pending.await.unwrap();
        assert!(matches!(stale, Err(MonitorError::NotMonitoring)));

        // Waits for the new session's first tick, then polls an empty batch
        service.refresh().await.unwrap();
        let status = service.status().await;
        assert!(status.monitoring);
        assert_eq!(status.status, ConnectionStatus::Connected);
        assert_eq!(status.rows, 0);
        assert_eq!(status.alert_phase, Some(AlertPhase::Quiet));
        assert!(service.table().await.is_empty());
        assert!(service.alert_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_waits_for_running_tick() {
        let repository = Arc::new(FakeRepository::slow(
            vec![
                Ok(vec![record("temperature_celsius", 26.0, 0)]),
                Ok(vec![record("temperature_celsius", 27.0, 10)]),
                Ok(vec![record("temperature_celsius", 28.0, 20)]),
            ],
            Duration::from_millis(50),
        ));
        let service = service_with(repository.clone());
        service.start().await.unwrap();
        // Initial tick is now querying
        repository.wait_for_query().await;

        let (first, second) = tokio::join!(service.refresh(), service.refresh());
        assert_eq!(first.unwrap().merge.inserted, 1);
        assert_eq!(second.unwrap().merge.inserted, 1);

        assert_eq!(repository.peak_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(service.status().await.rows, 3);
    }
}
