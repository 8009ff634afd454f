// Sample ingestor - normalizes raw Data Source records
use crate::application::telemetry_repository::RawRecord;
use crate::domain::sample::{Field, LatestReading, Sample, SourceInfo};
use chrono::{DateTime, Utc};

const MISSING_TAG: &str = "N/A";

#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub samples: Vec<Sample>,
    /// Chronologically last value of each field in this batch
    pub latest: LatestReading,
    /// Tags of the first record of the batch
    pub source: Option<SourceInfo>,
    pub dropped: usize,
}

/// Map raw records onto samples, dropping fields that are not monitored
pub fn normalize(records: Vec<RawRecord>) -> NormalizedBatch {
    let mut batch = NormalizedBatch {
        source: records.first().map(source_info),
        ..NormalizedBatch::default()
    };
    let mut latest_at: [Option<DateTime<Utc>>; 2] = [None, None];

    for record in records {
        let Some(field) = Field::from_source_name(&record.field) else {
            batch.dropped += 1;
            continue;
        };

        let slot = &mut latest_at[field as usize];
        // Ties keep the later arrival
        if slot.is_none_or(|seen| record.time >= seen) {
            *slot = Some(record.time);
            batch.latest.set(field, Some(record.value));
        }

        batch.samples.push(Sample::new(
            record.time,
            record.location.unwrap_or_else(|| MISSING_TAG.to_string()),
            record.process_stage.unwrap_or_else(|| MISSING_TAG.to_string()),
            field,
            record.value,
            record.sensor_id,
        ));
    }

    if batch.dropped > 0 {
        tracing::debug!("Dropped {} records with unmonitored fields", batch.dropped);
    }

    batch
}

fn source_info(record: &RawRecord) -> SourceInfo {
    let tag = |value: &Option<String>| value.clone().unwrap_or_else(|| MISSING_TAG.to_string());
    SourceInfo {
        location: tag(&record.location),
        process_stage: tag(&record.process_stage),
        sensor_id: tag(&record.sensor_id),
    }
}
