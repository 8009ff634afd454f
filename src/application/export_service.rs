// Export use case - tabular snapshot of the pivoted dataset
use crate::application::dashboard_service::DashboardService;
use crate::domain::dataset::PivotedRow;
use crate::domain::setpoint::{is_out_of_range, Setpoints};

/// One exported line; `out_of_range` marks rows to be highlighted
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    /// Naive local time
    pub time: String,
    pub location: String,
    pub process_stage: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub out_of_range: bool,
}

pub trait TableWriter: Send + Sync {
    fn write(&self, rows: &[ExportRow]) -> anyhow::Result<Vec<u8>>;

    fn content_type(&self) -> &'static str;

    fn extension(&self) -> &'static str;
}

#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub fn export_rows(
    rows: &[PivotedRow],
    setpoints: &Setpoints,
    dashboard: &DashboardService,
) -> Vec<ExportRow> {
    rows.iter()
        .map(|row| ExportRow {
            time: dashboard.local_time(row.time),
            location: row.location.clone(),
            process_stage: row.process_stage.clone(),
            temperature: row.temperature,
            humidity: row.humidity,
            out_of_range: is_out_of_range(row, setpoints),
        })
        .collect()
}
