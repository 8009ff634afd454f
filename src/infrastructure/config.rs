use crate::domain::setpoint::{Setpoints, ValidationError};
use anyhow::Context;
use chrono::FixedOffset;
use serde::Deserialize;
use std::collections::HashMap;

/// Longest accepted alert cooldown (one week)
pub const MAX_ALERT_COOLDOWN_SECS: i64 = 7 * 24 * 3600;

/// Flux query used when the configuration does not provide one
pub const DEFAULT_FLUX_QUERY: &str = r#"from(bucket: "${bucket}")
  |> range(start: -${window_hours}h)
  |> filter(fn: (r) => r["_measurement"] == "${measurement}")
  |> filter(fn: (r) => r["_field"] == "humidity_percent" or r["_field"] == "temperature_celsius")
  |> filter(fn: (r) => r["location"] == "${location}")
  |> filter(fn: (r) => r["process_stage"] == "${process_stage}")
  |> filter(fn: (r) => r["sensor_id"] == "${sensor_id}")
  |> filter(fn: (r) => exists r._value)
  |> yield(name: "raw")"#;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub influx: InfluxSettings,
    pub query: QuerySettings,
    #[serde(default)]
    pub monitoring: MonitoringSettings,
    #[serde(default)]
    pub setpoints: SetpointSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub url: String,
    pub org: String,
    #[serde(default)]
    pub token: String,
    pub bucket: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuerySettings {
    pub measurement: String,
    pub location: String,
    pub process_stage: String,
    pub sensor_id: String,
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    /// Flux template, see `prepare_query`
    pub flux: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitoringSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_alert_cooldown_secs")]
    pub alert_cooldown_secs: i64,
    /// Offset used for displayed and exported times (WIB by default)
    #[serde(default = "default_display_utc_offset_hours")]
    pub display_utc_offset_hours: i32,
    #[serde(default = "default_alert_history")]
    pub alert_history: usize,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            alert_cooldown_secs: default_alert_cooldown_secs(),
            display_utc_offset_hours: default_display_utc_offset_hours(),
            alert_history: default_alert_history(),
        }
    }
}

impl MonitoringSettings {
    /// Reject values that would disable the cooldown or overflow time arithmetic
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0..=MAX_ALERT_COOLDOWN_SECS).contains(&self.alert_cooldown_secs) {
            anyhow::bail!(
                "alert_cooldown_secs must be between 0 and {}, got {}",
                MAX_ALERT_COOLDOWN_SECS,
                self.alert_cooldown_secs
            );
        }
        self.display_offset()?;
        Ok(())
    }

    pub fn display_offset(&self) -> anyhow::Result<FixedOffset> {
        let hours = self.display_utc_offset_hours;
        if !(-12..=14).contains(&hours) {
            anyhow::bail!("display_utc_offset_hours must be between -12 and 14, got {}", hours);
        }
        FixedOffset::east_opt(hours * 3600)
            .with_context(|| format!("Invalid display_utc_offset_hours {}", hours))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SetpointSettings {
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
}

impl Default for SetpointSettings {
    fn default() -> Self {
        let (temperature, humidity) = Setpoints::default().read();
        Self {
            temperature_min: temperature.min,
            temperature_max: temperature.max,
            humidity_min: humidity.min,
            humidity_max: humidity.max,
        }
    }
}

impl SetpointSettings {
    pub fn to_setpoints(&self) -> Result<Setpoints, ValidationError> {
        Setpoints::new(
            self.temperature_min,
            self.temperature_max,
            self.humidity_min,
            self.humidity_max,
        )
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_window_hours() -> u32 {
    24
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_alert_cooldown_secs() -> i64 {
    300
}

fn default_display_utc_offset_hours() -> i32 {
    7
}

fn default_alert_history() -> usize {
    50
}

impl QuerySettings {
    /// Render the Flux query for `bucket` with this filter
    pub fn render(&self, bucket: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert("bucket".to_string(), bucket.to_string());
        vars.insert("window_hours".to_string(), self.window_hours.to_string());
        vars.insert("measurement".to_string(), self.measurement.clone());
        vars.insert("location".to_string(), self.location.clone());
        vars.insert("process_stage".to_string(), self.process_stage.clone());
        vars.insert("sensor_id".to_string(), self.sensor_id.clone());

        let template = self.flux.as_deref().unwrap_or(DEFAULT_FLUX_QUERY);
        prepare_query(template, &vars)
    }
}

/// Load `config/monitor.*`, overridden by `TANK_MONITOR__SECTION__KEY` variables
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/monitor"))
        .add_source(
            config::Environment::with_prefix("TANK_MONITOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = settings.try_deserialize()?;
    // Reject bad values at startup rather than on first use
    app_config.setpoints.to_setpoints()?;
    app_config.monitoring.validate()?;
    Ok(app_config)
}

/// Replace template variables in a query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
