use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use camera_panel_common::controls::{ControlMap, ControlValue};

use crate::CameraError;

/// Range advertised by the driver for one control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlInfo {
    pub min: ControlValue,
    pub max: ControlValue,
    pub default: ControlValue,
}

impl ControlInfo {
    pub fn new(min: ControlValue, max: ControlValue, default: ControlValue) -> Self {
        Self { min, max, default }
    }

    pub fn contains(&self, value: ControlValue) -> bool {
        let v = value.as_f64();
        v >= self.min.as_f64() && v <= self.max.as_f64()
    }
}

pub type ControlRanges = BTreeMap<String, ControlInfo>;

/// Reject unknown controls and values outside the advertised range.
pub fn validate(ranges: &ControlRanges, controls: &ControlMap) -> Result<(), CameraError> {
    for (name, value) in controls {
        let info = ranges
            .get(name)
            .ok_or_else(|| CameraError::UnknownControl(name.clone()))?;
        if !info.contains(*value) {
            return Err(CameraError::ControlOutOfRange {
                name: name.clone(),
                value: *value,
                min: info.min,
                max: info.max,
            });
        }
    }
    Ok(())
}

/// Keep only the controls the camera knows about. Dropped names are logged.
pub fn retain_supported(ranges: &ControlRanges, controls: &ControlMap) -> ControlMap {
    controls
        .iter()
        .filter(|(name, _)| {
            let known = ranges.contains_key(name.as_str());
            if !known {
                warn!(control = name.as_str(), "camera does not support control, ignoring");
            }
            known
        })
        .map(|(name, value)| (name.clone(), *value))
        .collect()
}
