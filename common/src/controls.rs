use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single camera control value as it appears in config files and JSON
/// request bodies (`"ExposureTime": 20000`, `"AwbEnable": true`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ControlValue {
    /// Numeric view used for range checks. Booleans map to 0/1.
    pub fn as_f64(&self) -> f64 {
        match *self {
            ControlValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            ControlValue::Int(i) => i as f64,
            ControlValue::Float(f) => f,
        }
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlValue::Bool(b) => write!(f, "{b}"),
            ControlValue::Int(i) => write!(f, "{i}"),
            ControlValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Control name -> value, ordered so responses and persisted files are stable.
pub type ControlMap = BTreeMap<String, ControlValue>;
