// Chart and table projections handed to the presentation layer
use super::setpoint::SetpointRange;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartData {
    pub id: String,
    pub title: String,
    pub unit: String,
    /// Setpoint reference lines
    pub band: SetpointRange,
    pub points: Vec<TimeSeriesPoint>,
}

impl ChartData {
    pub fn new(
        id: String,
        title: String,
        unit: String,
        band: SetpointRange,
        points: Vec<TimeSeriesPoint>,
    ) -> Self {
        Self {
            id,
            title,
            unit,
            band,
            points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub time: String,
    pub location: String,
    pub process_stage: String,
    pub temperature: String,
    pub humidity: String,
    pub out_of_range: bool,
}

pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(26.456)), "26.46");
        assert_eq!(format_value(Some(65.0)), "65.00");
        assert_eq!(format_value(None), "N/A");
    }
}
