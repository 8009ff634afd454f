// InfluxDB v2 repository implementation
use crate::application::telemetry_repository::{HealthReport, RawRecord, TelemetryRepository};
use crate::infrastructure::config::{InfluxSettings, QuerySettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct InfluxRepository {
    client: reqwest::Client,
    url: String,
    org: String,
    token: String,
    flux: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Column positions of one table in a Flux CSV response
#[derive(Debug, Clone, Copy)]
struct Columns {
    time: usize,
    value: usize,
    field: usize,
    location: Option<usize>,
    process_stage: Option<usize>,
    sensor_id: Option<usize>,
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> Option<Self> {
        let find = |name: &str| header.iter().position(|c| c == name);
        Some(Self {
            time: find("_time")?,
            value: find("_value")?,
            field: find("_field")?,
            location: find("location"),
            process_stage: find("process_stage"),
            sensor_id: find("sensor_id"),
        })
    }

    fn parse(&self, row: &csv::StringRecord) -> Option<RawRecord> {
        let tag = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let time = DateTime::parse_from_rfc3339(row.get(self.time)?).ok()?;
        let value = row.get(self.value)?.parse::<f64>().ok()?;

        Some(RawRecord {
            field: row.get(self.field)?.to_string(),
            value,
            time: time.with_timezone(&Utc),
            location: tag(self.location),
            process_stage: tag(self.process_stage),
            sensor_id: tag(self.sensor_id),
        })
    }
}

impl InfluxRepository {
    pub fn new(influx: &InfluxSettings, query: &QuerySettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(influx.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: influx.url.trim_end_matches('/').to_string(),
            org: influx.org.clone(),
            token: influx.token.clone(),
            flux: query.render(&influx.bucket),
        })
    }

    fn build_query_url(&self) -> String {
        format!(
            "{}/api/v2/query?org={}",
            self.url,
            urlencoding::encode(&self.org)
        )
    }

    async fn execute_query(&self, flux: &str) -> Result<String> {
        let body = serde_json::json!({
            "query": flux,
            "type": "flux",
            "dialect": { "header": true, "annotations": [], "delimiter": "," },
        });

        let response = self
            .client
            .post(self.build_query_url())
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/csv")
            .json(&body)
            .send()
            .await
            .context("Failed to send request to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {}: {}", status, body);
        }

        response
            .text()
            .await
            .context("Failed to read InfluxDB response")
    }
}

/// Parse a Flux CSV response. Each table starts with its own header row.
fn parse_flux_csv(body: &str) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(body.as_bytes());

    let mut records = Vec::new();
    let mut columns: Option<Columns> = None;
    // Position of the `error` column once an error table header is seen
    let mut error_column: Option<usize> = None;
    let mut skipped = 0usize;

    for row in reader.records() {
        let row = row.context("Malformed CSV in InfluxDB response")?;

        if let Some(idx) = error_column {
            let message = row
                .get(idx)
                .filter(|m| !m.is_empty())
                .unwrap_or("unknown error");
            anyhow::bail!("InfluxDB query error: {}", message);
        }
        if row.iter().any(|c| c == "_value") {
            columns = Columns::from_header(&row);
            continue;
        }
        if row.iter().any(|c| c == "reference") {
            if let Some(idx) = row.iter().position(|c| c == "error") {
                error_column = Some(idx);
                continue;
            }
        }

        match columns.and_then(|c| c.parse(&row)) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!("Skipped {} unparseable rows in InfluxDB response", skipped);
    }
    Ok(records)
}

#[async_trait]
impl TelemetryRepository for InfluxRepository {
    async fn check_health(&self) -> Result<HealthReport> {
        let response = self
            .client
            .get(format!("{}/health", self.url))
            .send()
            .await
            .context("Failed to reach InfluxDB")?;

        // An unhealthy instance answers 503 with the same JSON body
        let status = response.status();
        let health = response
            .json::<HealthResponse>()
            .await
            .with_context(|| format!("Unexpected health response (status {})", status))?;

        Ok(HealthReport {
            healthy: health.status == "pass",
            message: health.message.unwrap_or_else(|| health.status.clone()),
        })
    }

    async fn query_records(&self) -> Result<Vec<RawRecord>> {
        tracing::debug!("Executing Flux query: {}", self.flux);
        let body = self.execute_query(&self.flux).await?;
        let records = parse_flux_csv(&body)?;
        tracing::debug!("Fetched {} records from InfluxDB", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "\
,result,table,_start,_stop,_time,_value,_field,_measurement,location,process_stage,sensor_id\r
,raw,0,2025-03-01T00:00:00Z,2025-03-02T00:00:00Z,2025-03-01T10:00:00Z,65.2,humidity_percent,environment_monitoring,Crude Oil Storage Tank T-101,Storage,SHT20-001\r
,raw,0,2025-03-01T00:00:00Z,2025-03-02T00:00:00Z,2025-03-01T10:00:10Z,65.4,humidity_percent,environment_monitoring,Crude Oil Storage Tank T-101,Storage,SHT20-001\r
\r
,result,table,_start,_stop,_time,_value,_field,_measurement,location,process_stage,sensor_id\r
,raw,1,2025-03-01T00:00:00Z,2025-03-02T00:00:00Z,2025-03-01T10:00:00Z,26.1,temperature_celsius,environment_monitoring,Crude Oil Storage Tank T-101,Storage,\r
";

    #[test]
    fn test_parse_flux_csv() {
        let records = parse_flux_csv(RESPONSE).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].field, "humidity_percent");
        assert_eq!(records[0].value, 65.2);
        assert_eq!(records[0].time.to_rfc3339(), "2025-03-01T10:00:00+00:00");
        assert_eq!(records[0].location.as_deref(), Some("Crude Oil Storage Tank T-101"));
        assert_eq!(records[2].field, "temperature_celsius");
        assert_eq!(records[2].sensor_id, None);
    }

    #[test]
    fn test_parse_skips_annotations_and_bad_rows() {
        let body = "\
#datatype,string,long,dateTime:RFC3339,double,string\n\
,result,table,_time,_value,_field\n\
,raw,0,not-a-time,1.0,temperature_celsius\n\
,raw,0,2025-03-01T10:00:00Z,27.0,temperature_celsius\n";
        let records = parse_flux_csv(body).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 27.0);
        assert_eq!(records[0].location, None);
    }

    #[test]
    fn test_parse_error_table() {
        let body = ",error,reference\r\n,runtime error: bucket not found,897\r\n";
        let err = parse_flux_csv(body).unwrap_err();
        assert_eq!(
            err.to_string(),
            "InfluxDB query error: runtime error: bucket not found"
        );
    }

    #[test]
    fn test_parse_error_table_after_data_rejects_batch() {
        let body = format!(
            "{}\r\n,error,reference\r\n,panic: out of memory,\r\n",
            RESPONSE.trim_end()
        );
        let err = parse_flux_csv(&body).unwrap_err();
        assert!(err.to_string().contains("panic: out of memory"));
    }

    #[test]
    fn test_parse_error_table_without_message() {
        let err = parse_flux_csv(",error,reference\r\n,,\r\n").unwrap_err();
        assert!(err.to_string().contains("unknown error"));
    }

    #[test]
    fn test_parse_empty_response() {
        assert!(parse_flux_csv("").unwrap().is_empty());
        assert!(parse_flux_csv("\r\n").unwrap().is_empty());
    }

    #[test]
    fn test_build_query_url_encodes_org() {
        let influx = InfluxSettings {
            url: "http://localhost:8086/".to_string(),
            org: "INSTITUT TEKNOLOGI".to_string(),
            token: "secret".to_string(),
            bucket: "Tank T-101".to_string(),
            timeout_secs: 30,
        };
        let query = QuerySettings {
            measurement: "environment_monitoring".to_string(),
            location: "Crude Oil Storage Tank T-101".to_string(),
            process_stage: "Storage".to_string(),
            sensor_id: "SHT20-001".to_string(),
            window_hours: 24,
            flux: None,
        };
        let repo = InfluxRepository::new(&influx, &query).unwrap();

        assert_eq!(
            repo.build_query_url(),
            "http://localhost:8086/api/v2/query?org=INSTITUT%20TEKNOLOGI"
        );
        assert!(repo.flux.contains(r#"from(bucket: "Tank T-101")"#));
    }
}
