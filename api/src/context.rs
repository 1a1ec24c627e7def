use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use camera_panel_common::config::{Config, RotationConfig};
use camera_panel_common::module_info::ModuleCatalogue;
use camera_panel_common::settings::{PersistedSettings, SettingsError};
use camera_panel_gallery::{EdgeDetector, EdgeError, GalleryError, GalleryStore};
use camera_panel_producer::controls::retain_supported;
use camera_panel_producer::{open_driver, CameraError, CameraSession, StreamFormat};

/// Capture settings as exposed to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSettings {
    #[serde(rename = "Resolution")]
    pub resolution: usize,
    #[serde(rename = "available-resolutions")]
    pub available_resolutions: Vec<[u32; 2]>,
    #[serde(rename = "makeRaw")]
    pub make_raw: bool,
}

impl CaptureSettings {
    pub fn size_at(&self, index: usize) -> Option<(u32, u32)> {
        self.available_resolutions.get(index).map(|&[w, h]| (w, h))
    }
}

/// Everything a request handler needs, shared through axum `State`.
pub struct AppContext {
    pub camera: Arc<CameraSession>,
    pub gallery: GalleryStore,
    pub edges: EdgeDetector,
    pub modules: Option<ModuleCatalogue>,
    pub rotation: RotationConfig,
    pub jpeg_quality: u8,
    /// Serialises settings updates; held across camera reconfiguration.
    pub capture: Mutex<CaptureSettings>,
    settings_path: PathBuf,
}

impl AppContext {
    /// Open the camera, start streaming and prepare the gallery.
    ///
    /// Blocking: call before the runtime starts serving, or from
    /// `spawn_blocking`.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let driver = open_driver(&config.camera.backend)?;
        let controls = retain_supported(&driver.controls(), &config.camera.controls);

        let size = config
            .capture
            .selected_size()
            .ok_or(StartupError::Resolution(config.capture.resolution))?;
        let format = StreamFormat {
            size,
            sensor_mode: config.camera.sensor_mode,
            hflip: config.rotation.hflip,
            vflip: config.rotation.vflip,
            fps: config.stream.fps,
            jpeg_quality: config.stream.quality,
        };

        let camera = Arc::new(CameraSession::new(driver, format)?);
        let model = camera.properties().model;
        camera.start_streaming()?;
        if !controls.is_empty() {
            if let Err(e) = camera.set_controls(&controls) {
                warn!(error = %e, "failed to apply configured controls");
            }
        }

        let gallery = GalleryStore::open(&config.gallery.dir, config.gallery.page_size)?;
        let edges = EdgeDetector::new(config.edges.low_threshold, config.edges.high_threshold)?;

        let modules = match ModuleCatalogue::load(&config.settings.module_info_path) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %e, "camera module catalogue unavailable");
                None
            }
        };

        info!(
            model,
            width = size.0,
            height = size.1,
            sensor_mode = config.camera.sensor_mode,
            controls = controls.len(),
            gallery = %gallery.dir().display(),
            "camera context ready"
        );

        Ok(Self {
            camera,
            gallery,
            edges,
            modules,
            rotation: config.rotation,
            jpeg_quality: config.capture.jpeg_quality,
            capture: Mutex::new(CaptureSettings {
                resolution: config.capture.resolution,
                available_resolutions: config.capture.available_resolutions.clone(),
                make_raw: config.capture.make_raw,
            }),
            settings_path: config.settings.state_path.clone(),
        })
    }

    /// Snapshot the runtime settings for persisting. Blocking file I/O.
    pub fn persist(&self, capture: &CaptureSettings) -> Result<(), SettingsError> {
        PersistedSettings {
            sensor_mode: Some(self.camera.format().sensor_mode),
            resolution: Some(capture.resolution),
            make_raw: Some(capture.make_raw),
            controls: self.camera.applied_controls(),
        }
        .save(&self.settings_path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("gallery: {0}")]
    Gallery(#[from] GalleryError),
    #[error("edge detector: {0}")]
    Edges(#[from] EdgeError),
    #[error("capture resolution index {0} is out of range")]
    Resolution(usize),
}
