// Cumulative dataset - deduplicating merge and wide-format pivot
use super::sample::{Field, Sample};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One row per (time, location, process stage) with a column per field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotedRow {
    pub time: DateTime<Utc>,
    pub location: String,
    pub process_stage: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

impl PivotedRow {
    pub fn value(&self, field: Field) -> Option<f64> {
        match field {
            Field::Temperature => self.temperature,
            Field::Humidity => self.humidity,
        }
    }

    fn set(&mut self, field: Field, value: f64) {
        match field {
            Field::Temperature => self.temperature = Some(value),
            Field::Humidity => self.humidity = Some(value),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub replaced: usize,
}

/// All samples of a session, at most one per (time, field).
/// The pivoted projection is rebuilt whenever the samples change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CumulativeDataset {
    samples: BTreeMap<(DateTime<Utc>, Field), Sample>,
    rows: Vec<PivotedRow>,
}

impl CumulativeDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch, newer samples overwrite existing ones with the same key.
    /// An empty batch leaves the dataset untouched.
    pub fn merge(&mut self, batch: Vec<Sample>) -> MergeStats {
        let mut stats = MergeStats::default();
        if batch.is_empty() {
            return stats;
        }

        for sample in batch {
            match self.samples.insert((sample.time, sample.field), sample) {
                Some(_) => stats.replaced += 1,
                None => stats.inserted += 1,
            }
        }

        self.rows = pivot(self.samples.values());
        stats
    }

    pub fn rows(&self) -> &[PivotedRow] {
        &self.rows
    }

    /// Number of (time, field) samples held
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Time-ordered (time, value) pairs of one field
    pub fn series(&self, field: Field) -> Vec<(DateTime<Utc>, f64)> {
        // BTreeMap keys are ordered by time first
        self.samples
            .values()
            .filter(|s| s.field == field)
            .map(|s| (s.time, s.value))
            .collect()
    }
}

/// Group samples by (time, location, process stage) into wide rows, ordered by that key
pub fn pivot<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Vec<PivotedRow> {
    let mut groups: BTreeMap<(DateTime<Utc>, &str, &str), PivotedRow> = BTreeMap::new();

    for sample in samples {
        groups
            .entry((sample.time, sample.location.as_str(), sample.process_stage.as_str()))
            .or_insert_with(|| PivotedRow {
                time: sample.time,
                location: sample.location.clone(),
                process_stage: sample.process_stage.clone(),
                temperature: None,
                humidity: None,
            })
            .set(sample.field, sample.value);
    }

    groups.into_values().collect()
}
