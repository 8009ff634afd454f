// Setpoint ranges governing alerting and highlighting
use super::dataset::PivotedRow;
use super::sample::Field;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{} minimum must be lower than maximum (got {min}-{max})", .field.label())]
    InvertedRange { field: Field, min: f64, max: f64 },

    #[error("{} range must lie within {lo}-{hi}{} (got {min}-{max})", .field.label(), .field.unit())]
    OutOfDomain {
        field: Field,
        min: f64,
        max: f64,
        lo: f64,
        hi: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointRange {
    pub min: f64,
    pub max: f64,
}

impl SetpointRange {
    /// Build a range for `field`, enforcing `min < max` and the field's domain
    pub fn new(field: Field, min: f64, max: f64) -> Result<Self, ValidationError> {
        // Negated comparisons so NaN is rejected too
        if !(min < max) {
            return Err(ValidationError::InvertedRange { field, min, max });
        }
        let (lo, hi) = field.domain();
        if !(min >= lo && max <= hi) {
            return Err(ValidationError::OutOfDomain {
                field,
                min,
                max,
                lo,
                hi,
            });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// The two live ranges. Only replaced as a pair through `update`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Setpoints {
    temperature: SetpointRange,
    humidity: SetpointRange,
}

impl Default for Setpoints {
    fn default() -> Self {
        Self {
            temperature: SetpointRange { min: 24.0, max: 30.0 },
            humidity: SetpointRange { min: 50.0, max: 70.0 },
        }
    }
}

impl Setpoints {
    pub fn new(
        temp_min: f64,
        temp_max: f64,
        hum_min: f64,
        hum_max: f64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            temperature: SetpointRange::new(Field::Temperature, temp_min, temp_max)?,
            humidity: SetpointRange::new(Field::Humidity, hum_min, hum_max)?,
        })
    }

    /// Validate both ranges first, then commit them together
    pub fn update(
        &mut self,
        temp_min: f64,
        temp_max: f64,
        hum_min: f64,
        hum_max: f64,
    ) -> Result<(), ValidationError> {
        *self = Self::new(temp_min, temp_max, hum_min, hum_max)?;
        Ok(())
    }

    pub fn read(&self) -> (SetpointRange, SetpointRange) {
        (self.temperature, self.humidity)
    }

    pub fn range(&self, field: Field) -> SetpointRange {
        match field {
            Field::Temperature => self.temperature,
            Field::Humidity => self.humidity,
        }
    }

    pub fn is_breach(&self, field: Field, value: f64) -> bool {
        !self.range(field).contains(value)
    }
}

/// Shared highlight predicate for the table view and the exporter.
/// A missing value never flags its field.
pub fn is_out_of_range(row: &PivotedRow, setpoints: &Setpoints) -> bool {
    Field::ALL.into_iter().any(|field| {
        row.value(field)
            .is_some_and(|value| setpoints.is_breach(field, value))
    })
}
