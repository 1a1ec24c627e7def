use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::controls::ControlMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub gallery: GalleryConfig,
    #[serde(default)]
    pub edges: EdgeConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_sensor_mode", alias = "sensor-mode")]
    pub sensor_mode: usize,
    /// Live controls applied once streaming has started.
    #[serde(default)]
    pub controls: ControlMap,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RotationConfig {
    #[serde(default)]
    pub hflip: bool,
    #[serde(default)]
    pub vflip: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Index into `available_resolutions` used for the preview stream.
    #[serde(default = "default_resolution", alias = "Resolution")]
    pub resolution: usize,
    #[serde(default = "default_available_resolutions", alias = "available-resolutions")]
    pub available_resolutions: Vec<[u32; 2]>,
    #[serde(default, alias = "makeRaw")]
    pub make_raw: bool,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default = "default_quality")]
    pub quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GalleryConfig {
    #[serde(default = "default_gallery_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f32,
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    /// JSON file holding settings changed at runtime.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// JSON catalogue of known camera modules.
    #[serde(default = "default_module_info_path")]
    pub module_info_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sensor_mode: default_sensor_mode(),
            controls: ControlMap::new(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            available_resolutions: default_available_resolutions(),
            make_raw: false,
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl CaptureConfig {
    /// The preview size selected by `resolution`, if the index is in range.
    pub fn selected_size(&self) -> Option<(u32, u32)> {
        self.size_at(self.resolution)
    }

    pub fn size_at(&self, index: usize) -> Option<(u32, u32)> {
        self.available_resolutions
            .get(index)
            .map(|&[w, h]| (w, h))
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            quality: default_quality(),
        }
    }
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            dir: default_gallery_dir(),
            page_size: default_page_size(),
        }
    }
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            low_threshold: default_low_threshold(),
            high_threshold: default_high_threshold(),
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            module_info_path: default_module_info_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.available_resolutions.is_empty() {
            return Err(ConfigError::Invalid(
                "capture.available_resolutions must not be empty".into(),
            ));
        }
        if self.capture.selected_size().is_none() {
            return Err(ConfigError::Invalid(format!(
                "capture.resolution {} is out of range (0..{})",
                self.capture.resolution,
                self.capture.available_resolutions.len()
            )));
        }
        if self
            .capture
            .available_resolutions
            .iter()
            .any(|&[w, h]| w == 0 || h == 0)
        {
            return Err(ConfigError::Invalid(
                "capture.available_resolutions contains a zero dimension".into(),
            ));
        }
        if !(self.stream.fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "stream.fps must be positive, got {}",
                self.stream.fps
            )));
        }
        if self.edges.low_threshold > self.edges.high_threshold {
            return Err(ConfigError::Invalid(format!(
                "edges.low_threshold ({}) exceeds edges.high_threshold ({})",
                self.edges.low_threshold, self.edges.high_threshold
            )));
        }
        if self.gallery.page_size == 0 {
            return Err(ConfigError::Invalid("gallery.page_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_backend() -> String {
    "synthetic".into()
}
fn default_sensor_mode() -> usize {
    1
}
fn default_resolution() -> usize {
    1
}
fn default_available_resolutions() -> Vec<[u32; 2]> {
    vec![[640, 480], [1280, 720], [1920, 1080], [4056, 3040]]
}
fn default_jpeg_quality() -> u8 {
    90
}
fn default_fps() -> f64 {
    15.0
}
fn default_quality() -> u8 {
    80
}
fn default_gallery_dir() -> PathBuf {
    PathBuf::from("static/gallery")
}
fn default_page_size() -> usize {
    15
}
fn default_low_threshold() -> f32 {
    100.0
}
fn default_high_threshold() -> f32 {
    200.0
}
fn default_state_path() -> PathBuf {
    PathBuf::from("camera-settings.json")
}
fn default_module_info_path() -> PathBuf {
    PathBuf::from("camera-module-info.json")
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::ControlValue;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.capture.selected_size(), Some((1280, 720)));
        assert_eq!(config.gallery.page_size, 15);
        assert_eq!(config.edges.low_threshold, 100.0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parses_sections_and_controls() {
        let config = Config::from_toml_str(
            r#"
            [server]
            port = 9000

            [camera]
            sensor_mode = 2

            [camera.controls]
            ExposureTime = 10000
            AnalogueGain = 2.0
            AwbEnable = true

            [rotation]
            vflip = true

            [capture]
            resolution = 0
            available_resolutions = [[320, 240], [640, 480]]
            makeRaw = true
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.camera.sensor_mode, 2);
        assert_eq!(config.camera.controls["ExposureTime"], ControlValue::Int(10000));
        assert_eq!(config.camera.controls["AnalogueGain"], ControlValue::Float(2.0));
        assert!(config.rotation.vflip);
        assert!(!config.rotation.hflip);
        assert!(config.capture.make_raw);
        assert_eq!(config.capture.selected_size(), Some((320, 240)));
    }

    #[test]
    fn rejects_out_of_range_resolution() {
        let config = Config::from_toml_str("[capture]\nresolution = 9\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let config =
            Config::from_toml_str("[edges]\nlow_threshold = 300.0\nhigh_threshold = 10.0\n")
                .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/camera-panel.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile(..)));
    }
}
