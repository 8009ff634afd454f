// Monitoring session - state owned for the lifetime of one monitoring run
use crate::application::ingestor::normalize;
use crate::application::telemetry_repository::RawRecord;
use crate::domain::alert::{evaluate, AlertNotification, AlertPhase, AlertState};
use crate::domain::dataset::{CumulativeDataset, MergeStats};
use crate::domain::sample::{LatestReading, SourceInfo};
use crate::domain::setpoint::Setpoints;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub merge: MergeStats,
    pub alert: Option<AlertNotification>,
}

#[derive(Debug)]
pub struct MonitoringSession {
    id: u64,
    dataset: CumulativeDataset,
    alert_state: AlertState,
    latest: LatestReading,
    source: Option<SourceInfo>,
    last_updated: Option<DateTime<Utc>>,
}

impl MonitoringSession {
    pub fn new(id: u64, cooldown_secs: i64) -> Self {
        Self {
            id,
            dataset: CumulativeDataset::new(),
            alert_state: AlertState::new(cooldown_secs),
            latest: LatestReading::default(),
            source: None,
            last_updated: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dataset(&self) -> &CumulativeDataset {
        &self.dataset
    }

    pub fn latest(&self) -> LatestReading {
        self.latest
    }

    pub fn source(&self) -> Option<&SourceInfo> {
        self.source.as_ref()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn alert_phase(&self, now: DateTime<Utc>) -> AlertPhase {
        self.alert_state.phase(now)
    }

    /// One ingestion cycle: normalize, merge, then evaluate alerts
    pub fn ingest(
        &mut self,
        records: Vec<RawRecord>,
        setpoints: &Setpoints,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let batch = normalize(records);

        if self.source.is_none() {
            self.source = batch.source;
        }
        self.latest = batch.latest;
        let merge = self.dataset.merge(batch.samples);
        self.last_updated = Some(now);

        tracing::debug!(
            session = self.id,
            inserted = merge.inserted,
            replaced = merge.replaced,
            rows = self.dataset.rows().len(),
            "Merged batch"
        );

        CycleOutcome {
            merge,
            alert: self.check_alerts(setpoints, now),
        }
    }

    /// Re-check the latest reading against new ranges, ignoring any cooldown
    pub fn setpoints_changed(
        &mut self,
        setpoints: &Setpoints,
        now: DateTime<Utc>,
    ) -> Option<AlertNotification> {
        self.alert_state.reset();
        self.check_alerts(setpoints, now)
    }

    fn check_alerts(&mut self, setpoints: &Setpoints, now: DateTime<Utc>) -> Option<AlertNotification> {
        let (state, messages) = evaluate(&self.latest, setpoints, self.alert_state, now);
        self.alert_state = state;

        if messages.is_empty() {
            return None;
        }
        Some(AlertNotification::new(now, messages))
    }
}
