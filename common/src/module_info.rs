use serde::{Deserialize, Serialize};
use std::path::Path;

/// Catalogue of camera modules the panel can describe, keyed by the sensor
/// model the driver reports (e.g. `imx477`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleCatalogue {
    pub camera_modules: Vec<CameraModule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraModule {
    pub sensor_model: String,
    /// Free-form descriptive fields (name, resolution, lens, ...).
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl ModuleCatalogue {
    pub fn load(path: &Path) -> Result<Self, ModuleInfoError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModuleInfoError::ReadFile(path.display().to_string(), e))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ModuleInfoError> {
        serde_json::from_str(content).map_err(ModuleInfoError::Parse)
    }

    pub fn find(&self, sensor_model: &str) -> Option<&CameraModule> {
        self.camera_modules
            .iter()
            .find(|m| m.sensor_model == sensor_model)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModuleInfoError {
    #[error("failed to read module info file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse module info: {0}")]
    Parse(serde_json::Error),
}
