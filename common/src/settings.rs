use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;
use crate::controls::ControlMap;

/// Settings changed through the panel at runtime, persisted as JSON and
/// overlaid on the TOML config at the next start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_mode: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make_raw: Option<bool>,
    #[serde(default, skip_serializing_if = "ControlMap::is_empty")]
    pub controls: ControlMap,
}

impl PersistedSettings {
    /// Read the state file. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Option<Self>, SettingsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no persisted settings");
                return Ok(None);
            }
            Err(e) => return Err(SettingsError::Read(path.display().to_string(), e)),
        };
        let settings = serde_json::from_str(&content)
            .map_err(|e| SettingsError::Parse(path.display().to_string(), e))?;
        Ok(Some(settings))
    }

    /// Write the state file through a temporary sibling and a rename so a
    /// crash never leaves a half-written file behind.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self).map_err(SettingsError::Serialize)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| SettingsError::Write(tmp.display().to_string(), e))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| SettingsError::Write(path.display().to_string(), e))?;
        debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Overlay these settings on a freshly loaded config.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(mode) = self.sensor_mode {
            config.camera.sensor_mode = mode;
        }
        if let Some(index) = self.resolution {
            if config.capture.size_at(index).is_some() {
                config.capture.resolution = index;
            }
        }
        if let Some(make_raw) = self.make_raw {
            config.capture.make_raw = make_raw;
        }
        for (name, value) in &self.controls {
            config.camera.controls.insert(name.clone(), *value);
        }
        info!(
            sensor_mode = config.camera.sensor_mode,
            resolution = config.capture.resolution,
            controls = self.controls.len(),
            "applied persisted settings"
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file {0}: {1}")]
    Read(String, std::io::Error),
    #[error("failed to write settings file {0}: {1}")]
    Write(String, std::io::Error),
    #[error("failed to parse settings file {0}: {1}")]
    Parse(String, serde_json::Error),
    #[error("failed to serialize settings: {0}")]
    Serialize(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::ControlValue;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PersistedSettings::load(&dir.path().join("absent.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn save_then_load_and_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera-settings.json");

        let mut settings = PersistedSettings {
            sensor_mode: Some(3),
            resolution: Some(0),
            ..Default::default()
        };
        settings
            .controls
            .insert("Brightness".into(), ControlValue::Float(0.25));
        settings.save(&path).unwrap();

        let loaded = PersistedSettings::load(&path).unwrap().unwrap();
        assert_eq!(loaded, settings);

        let mut config = Config::default();
        loaded.apply_to(&mut config);
        assert_eq!(config.camera.sensor_mode, 3);
        assert_eq!(config.capture.resolution, 0);
        assert_eq!(
            config.camera.controls.get("Brightness"),
            Some(&ControlValue::Float(0.25))
        );
    }

    #[test]
    fn out_of_range_resolution_is_ignored() {
        let mut config = Config::default();
        let before = config.capture.resolution;
        PersistedSettings {
            resolution: Some(99),
            ..Default::default()
        }
        .apply_to(&mut config);
        assert_eq!(config.capture.resolution, before);
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera-settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PersistedSettings::load(&path),
            Err(SettingsError::Parse(..))
        ));
    }
}
