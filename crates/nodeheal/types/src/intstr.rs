//! Integer-or-percentage values such as `maxUnavailable: 1` or `"25%"`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::QuantityError;

/// Either an absolute count or a percentage string like `"25%"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrPercent {
    Int(i64),
    String(String),
}

impl IntOrPercent {
    pub fn percent(percent: i64) -> Self {
        Self::String(format!("{}%", percent))
    }

    /// Resolve against `total`.
    ///
    /// Integers pass through unchanged. Strings must be an integer followed
    /// by `%`; the scaled value is floored unless `round_up` is set.
    pub fn scaled_value(&self, total: i64, round_up: bool) -> Result<i64, QuantityError> {
        match self {
            IntOrPercent::Int(v) => Ok(*v),
            IntOrPercent::String(s) => {
                let percent = parse_percent(s)?;
                let scaled = percent as f64 * total as f64 / 100.0;
                Ok(if round_up {
                    scaled.ceil() as i64
                } else {
                    scaled.floor() as i64
                })
            }
        }
    }
}

fn parse_percent(raw: &str) -> Result<i64, QuantityError> {
    let number = raw.strip_suffix('%').ok_or(QuantityError::NotAPercentage)?;
    number
        .parse::<i64>()
        .map_err(|_| QuantityError::InvalidPercentage(raw.to_string()))
}

impl From<i64> for IntOrPercent {
    fn from(v: i64) -> Self {
        IntOrPercent::Int(v)
    }
}

impl From<&str> for IntOrPercent {
    fn from(v: &str) -> Self {
        IntOrPercent::String(v.to_string())
    }
}

impl fmt::Display for IntOrPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntOrPercent::Int(v) => write!(f, "{}", v),
            IntOrPercent::String(s) => write!(f, "{}", s),
        }
    }
}
