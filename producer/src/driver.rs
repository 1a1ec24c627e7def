use image::RgbImage;
use serde::Serialize;

use camera_panel_common::controls::ControlMap;

use crate::controls::ControlRanges;
use crate::CameraError;

#[derive(Debug, Clone, Serialize)]
pub struct CameraProperties {
    /// Sensor model as reported by the driver, e.g. `imx477`.
    pub model: String,
    pub pixel_array_size: (u32, u32),
}

/// One native readout mode of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorMode {
    pub size: (u32, u32),
    pub bit_depth: u8,
    pub fps: f64,
    /// (x, y, width, height) of the sensor area used by this mode.
    pub crop_limits: (u32, u32, u32, u32),
}

/// Configuration of the preview stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamFormat {
    /// Output size of the main (JPEG) stream.
    pub size: (u32, u32),
    /// Index into [`CameraDriver::sensor_modes`].
    pub sensor_mode: usize,
    pub hflip: bool,
    pub vflip: bool,
    pub fps: f64,
    pub jpeg_quality: u8,
}

/// A single full-resolution still capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StillRequest {
    pub size: (u32, u32),
    pub hflip: bool,
    pub vflip: bool,
}

pub type CaptureResult = Result<Vec<u8>, CameraError>;

/// Callback receiving every encoded preview frame, invoked on the driver's
/// streaming thread.
pub type FrameSink = Box<dyn FnMut(CaptureResult) + Send + 'static>;

/// The native camera stack, seen from the panel.
///
/// Implementations own the sensor. `configure` is only called while the
/// stream is stopped.
pub trait CameraDriver: Send {
    fn properties(&self) -> CameraProperties;

    fn sensor_modes(&self) -> Vec<SensorMode>;

    fn controls(&self) -> ControlRanges;

    fn configure(&mut self, format: &StreamFormat) -> Result<(), CameraError>;

    fn start_streaming(&mut self, sink: FrameSink) -> Result<(), CameraError>;

    fn stop_streaming(&mut self) -> Result<(), CameraError>;

    fn capture_still(&mut self, request: &StillRequest) -> Result<RgbImage, CameraError>;

    fn set_controls(&mut self, controls: &ControlMap) -> Result<(), CameraError>;
}
