pub mod controls;
pub mod driver;
pub mod session;
pub mod synthetic;

use camera_panel_common::codec::CodecError;
use camera_panel_common::controls::ControlValue;

pub use driver::{CameraDriver, CameraProperties, SensorMode, StillRequest, StreamFormat};
pub use session::CameraSession;
pub use synthetic::SyntheticCamera;

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("unknown camera backend {0:?}")]
    UnknownBackend(String),
    #[error("sensor mode {index} does not exist (camera has {available})")]
    InvalidSensorMode { index: usize, available: usize },
    #[error("unsupported frame size {0}x{1}")]
    InvalidSize(u32, u32),
    #[error("unknown control {0}")]
    UnknownControl(String),
    #[error("control {name} value {value} outside [{min}, {max}]")]
    ControlOutOfRange {
        name: String,
        value: ControlValue,
        min: ControlValue,
        max: ControlValue,
    },
    #[error("camera is not configured")]
    NotConfigured,
    #[error("camera is already streaming")]
    AlreadyStreaming,
    #[error("camera is not streaming")]
    NotStreaming,
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] CodecError),
    #[error("failed to spawn capture thread: {0}")]
    Thread(std::io::Error),
}

/// Open the camera backend named in the config.
pub fn open_driver(backend: &str) -> Result<Box<dyn CameraDriver>, CameraError> {
    match backend {
        "synthetic" => Ok(Box::new(SyntheticCamera::new())),
        other => Err(CameraError::UnknownBackend(other.to_string())),
    }
}
