// Alert evaluation - cooldown-gated threshold breaches
use super::sample::{Field, LatestReading};
use super::setpoint::{SetpointRange, Setpoints};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

pub const DEFAULT_COOLDOWN_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreachKind {
    Low,
    High,
}

/// Fixed consequence text per field and breach direction
struct AlertRule {
    field: Field,
    low_consequence: &'static str,
    high_consequence: &'static str,
}

const RULES: [AlertRule; 2] = [
    AlertRule {
        field: Field::Temperature,
        low_consequence: "Viscosity rises (product thickens, hard to pump)",
        high_consequence: "Overpressure → explosion risk",
    },
    AlertRule {
        field: Field::Humidity,
        low_consequence: "Static electricity build-up (spark hazard)",
        high_consequence: "Microbial growth (hydrocarbon-degrading bacteria)",
    },
];

impl AlertRule {
    fn check(&self, value: f64, range: SetpointRange) -> Option<AlertMessage> {
        let (kind, deviation, consequence) = if value < range.min {
            (BreachKind::Low, range.min - value, self.low_consequence)
        } else if value > range.max {
            (BreachKind::High, value - range.max, self.high_consequence)
        } else {
            return None;
        };

        Some(AlertMessage {
            field: self.field,
            kind,
            value,
            range,
            deviation,
            consequence,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    pub field: Field,
    pub kind: BreachKind,
    pub value: f64,
    pub range: SetpointRange,
    pub deviation: f64,
    pub consequence: &'static str,
}

impl fmt::Display for AlertMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (level, direction) = match self.kind {
            BreachKind::Low => ("LOW", "low"),
            BreachKind::High => ("HIGH", "high"),
        };
        let unit = self.field.unit();
        writeln!(
            f,
            "⚠ {} {} WARNING ⚠",
            level,
            self.field.label().to_uppercase()
        )?;
        writeln!(f, "Current {}: {:.1}{}", self.field.id(), self.value, unit)?;
        writeln!(f, "Normal range: {:.1}-{:.1}{}", self.range.min, self.range.max, unit)?;
        writeln!(f, "(Too {} by {:.1}{})", direction, self.deviation, unit)?;
        write!(f, "Impact: {}", self.consequence)
    }
}

/// Messages of one evaluation, surfaced together
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertNotification {
    pub fired_at: DateTime<Utc>,
    pub messages: Vec<AlertMessage>,
    pub text: String,
}

impl AlertNotification {
    pub fn new(fired_at: DateTime<Utc>, messages: Vec<AlertMessage>) -> Self {
        let text = messages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            fired_at,
            messages,
            text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPhase {
    Quiet,
    Cooling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertState {
    pub last_alert_time: Option<DateTime<Utc>>,
    pub cooldown: Duration,
}

impl Default for AlertState {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_SECS)
    }
}

impl AlertState {
    pub fn new(cooldown_secs: i64) -> Self {
        Self {
            last_alert_time: None,
            cooldown: Duration::seconds(cooldown_secs),
        }
    }

    /// Cooling lapses passively once the cooldown has fully elapsed
    pub fn phase(&self, now: DateTime<Utc>) -> AlertPhase {
        match self.last_alert_time {
            Some(last) if now - last < self.cooldown => AlertPhase::Cooling,
            _ => AlertPhase::Quiet,
        }
    }

    /// Force Quiet, e.g. after the setpoints changed
    pub fn reset(&mut self) {
        self.last_alert_time = None;
    }
}

/// Check every present reading against its range. While cooling nothing is
/// checked; a non-empty result moves the state into Cooling at `now`.
pub fn evaluate(
    reading: &LatestReading,
    setpoints: &Setpoints,
    state: AlertState,
    now: DateTime<Utc>,
) -> (AlertState, Vec<AlertMessage>) {
    if state.phase(now) == AlertPhase::Cooling {
        return (state, Vec::new());
    }

    let messages: Vec<AlertMessage> = RULES
        .iter()
        .filter_map(|rule| {
            let value = reading.get(rule.field)?;
            rule.check(value, setpoints.range(rule.field))
        })
        .collect();

    let next = if messages.is_empty() {
        state
    } else {
        AlertState {
            last_alert_time: Some(now),
            ..state
        }
    };
    (next, messages)
}
