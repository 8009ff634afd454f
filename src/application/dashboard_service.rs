// Dashboard views - chart series and table rows built from a session
use crate::domain::dataset::{CumulativeDataset, PivotedRow};
use crate::domain::sample::Field;
use crate::domain::setpoint::{is_out_of_range, Setpoints};
use crate::domain::telemetry::{format_value, ChartData, TableRow, TimeSeriesPoint};
use chrono::{DateTime, FixedOffset, Utc};

pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy)]
pub struct DashboardService {
    offset: FixedOffset,
}

impl DashboardService {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn local_time(&self, time: DateTime<Utc>) -> String {
        time.with_timezone(&self.offset)
            .format(DISPLAY_TIME_FORMAT)
            .to_string()
    }

    /// One chart per field that has data, with its setpoint band
    pub fn charts(&self, dataset: &CumulativeDataset, setpoints: &Setpoints) -> Vec<ChartData> {
        Field::ALL
            .into_iter()
            .filter_map(|field| {
                let points: Vec<TimeSeriesPoint> = dataset
                    .series(field)
                    .into_iter()
                    .map(|(time, value)| TimeSeriesPoint::new(time.timestamp_millis(), value))
                    .collect();

                if points.is_empty() {
                    return None;
                }

                Some(ChartData::new(
                    field.id().to_string(),
                    format!("{} ({}) vs Time", field.label(), field.unit()),
                    field.unit().to_string(),
                    setpoints.range(field),
                    points,
                ))
            })
            .collect()
    }

    pub fn table(&self, rows: &[PivotedRow], setpoints: &Setpoints) -> Vec<TableRow> {
        rows.iter()
            .map(|row| TableRow {
                time: self.local_time(row.time),
                location: row.location.clone(),
                process_stage: row.process_stage.clone(),
                temperature: format_value(row.temperature),
                humidity: format_value(row.humidity),
                out_of_range: is_out_of_range(row, setpoints),
            })
            .collect()
    }
}
