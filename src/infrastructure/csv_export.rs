// CSV table writer for exports
use crate::application::export_service::{ExportRow, TableWriter};

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvTableWriter;

impl TableWriter for CsvTableWriter {
    fn write(&self, rows: &[ExportRow]) -> anyhow::Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        // Header is written explicitly so an empty export still has one
        writer.write_record([
            "time",
            "location",
            "process_stage",
            "temperature",
            "humidity",
            "out_of_range",
        ])?;

        for row in rows {
            writer.write_record([
                row.time.clone(),
                row.location.clone(),
                row.process_stage.clone(),
                row.temperature.map(|v| v.to_string()).unwrap_or_default(),
                row.humidity.map(|v| v.to_string()).unwrap_or_default(),
                row.out_of_range.to_string(),
            ])?;
        }

        writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV export: {}", e.error()))
    }

    fn content_type(&self) -> &'static str {
        "text/csv; charset=utf-8"
    }

    fn extension(&self) -> &'static str {
        "csv"
    }
}
