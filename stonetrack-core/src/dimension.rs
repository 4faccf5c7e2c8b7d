//! Measured dimensions.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Centimetres per inch.
pub const CM_PER_INCH: f64 = 2.54;

/// Unit a dimension was measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Inch,
    Cm,
    Ton,
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Units::Inch => "inch",
            Units::Cm => "cm",
            Units::Ton => "ton",
        };
        f.write_str(s)
    }
}

/// A single measurement. A zero value means "not yet measured".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimension {
    pub value: f64,
    #[serde(default)]
    pub units: Units,
}

impl Dimension {
    pub fn new(value: f64, units: Units) -> Self {
        Self { value, units }
    }

    pub fn inches(value: f64) -> Self {
        Self::new(value, Units::Inch)
    }

    pub fn cm(value: f64) -> Self {
        Self::new(value, Units::Cm)
    }

    pub fn tons(value: f64) -> Self {
        Self::new(value, Units::Ton)
    }

    /// Checks that the value is finite and non-negative.
    pub fn validate(&self, field: &'static str) -> Result<(), CoreError> {
        check(field, self.value).map(|_| ())
    }

    /// Returns true once a non-zero value has been recorded.
    pub fn is_measured(&self) -> bool {
        self.value > 0.0
    }

    /// Converts a length dimension to inches.
    pub fn to_inches(&self, field: &'static str) -> Result<f64, CoreError> {
        let value = check(field, self.value)?;
        match self.units {
            Units::Inch => Ok(value),
            Units::Cm => Ok(value / CM_PER_INCH),
            Units::Ton => Err(CoreError::InvalidDimension { field, value }),
        }
    }

    /// Converts a length dimension to centimetres.
    pub fn to_cm(&self, field: &'static str) -> Result<f64, CoreError> {
        let value = check(field, self.value)?;
        match self.units {
            Units::Inch => Ok(value * CM_PER_INCH),
            Units::Cm => Ok(value),
            Units::Ton => Err(CoreError::InvalidDimension { field, value }),
        }
    }
}

/// Rejects negative and non-finite numeric input.
pub(crate) fn check(field: &'static str, value: f64) -> Result<f64, CoreError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(CoreError::InvalidDimension { field, value })
    }
}

pub(crate) fn check_opt(field: &'static str, value: Option<f64>) -> Result<Option<f64>, CoreError> {
    value.map(|v| check(field, v)).transpose()
}
