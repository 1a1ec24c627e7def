use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::{imageops, Rgb, RgbImage};
use tracing::{debug, info, warn};

use camera_panel_common::codec::{encode_rgb, ImageFormat};
use camera_panel_common::controls::{ControlMap, ControlValue};

use crate::controls::{self, ControlInfo, ControlRanges};
use crate::driver::{
    CameraDriver, CameraProperties, FrameSink, SensorMode, StillRequest, StreamFormat,
};
use crate::CameraError;

const MODEL: &str = "imx477";
const PIXEL_ARRAY: (u32, u32) = (4056, 3040);
const DEFAULT_EXPOSURE_US: f64 = 20_000.0;

/// A software sensor producing a moving test pattern.
///
/// It mimics the modes and control ranges of a 12MP rolling-shutter sensor
/// so the panel can run, and be tested, without camera hardware. Exposure,
/// gain and brightness visibly change the rendered pattern.
pub struct SyntheticCamera {
    modes: Vec<SensorMode>,
    ranges: ControlRanges,
    shared: Arc<Mutex<Shared>>,
    format: Option<StreamFormat>,
    worker: Option<Worker>,
    fail_every: u64,
}

struct Shared {
    controls: ControlMap,
    tick: u64,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            modes: default_modes(),
            ranges: default_ranges(),
            shared: Arc::new(Mutex::new(Shared {
                controls: ControlMap::new(),
                tick: 0,
            })),
            format: None,
            worker: None,
            fail_every: 0,
        }
    }

    /// Make every `n`th streamed frame fail, to exercise error paths.
    pub fn with_failures_every(mut self, n: u64) -> Self {
        self.fail_every = n;
        self
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    fn halt_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Release);
            worker.handle.thread().unpark();
            if worker.handle.join().is_err() {
                warn!("synthetic camera worker panicked");
            }
        }
    }
}

impl CameraDriver for SyntheticCamera {
    fn properties(&self) -> CameraProperties {
        CameraProperties {
            model: MODEL.into(),
            pixel_array_size: PIXEL_ARRAY,
        }
    }

    fn sensor_modes(&self) -> Vec<SensorMode> {
        self.modes.clone()
    }

    fn controls(&self) -> ControlRanges {
        self.ranges.clone()
    }

    fn configure(&mut self, format: &StreamFormat) -> Result<(), CameraError> {
        if self.worker.is_some() {
            return Err(CameraError::AlreadyStreaming);
        }
        if format.sensor_mode >= self.modes.len() {
            return Err(CameraError::InvalidSensorMode {
                index: format.sensor_mode,
                available: self.modes.len(),
            });
        }
        check_size(format.size)?;
        debug!(
            width = format.size.0,
            height = format.size.1,
            sensor_mode = format.sensor_mode,
            "synthetic camera configured"
        );
        self.format = Some(*format);
        Ok(())
    }

    fn start_streaming(&mut self, mut sink: FrameSink) -> Result<(), CameraError> {
        if self.worker.is_some() {
            return Err(CameraError::AlreadyStreaming);
        }
        let format = self.format.ok_or(CameraError::NotConfigured)?;
        let interval = Duration::from_secs_f64(1.0 / format.fps.max(0.1));
        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&self.shared);
        let fail_every = self.fail_every;
        let worker_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("synthetic-camera".into())
            .spawn(move || {
                while !worker_stop.load(Ordering::Acquire) {
                    let started = Instant::now();
                    let (tick, controls) = {
                        let mut state = lock(&shared);
                        state.tick += 1;
                        (state.tick, state.controls.clone())
                    };

                    let result = if fail_every > 0 && tick % fail_every == 0 {
                        Err(CameraError::Capture(format!("injected failure at frame {tick}")))
                    } else {
                        let img = render(
                            format.size,
                            tick,
                            &controls,
                            format.hflip,
                            format.vflip,
                        );
                        encode_rgb(&img, ImageFormat::Jpeg, format.jpeg_quality)
                            .map_err(CameraError::from)
                    };
                    sink(result);

                    if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                        thread::park_timeout(remaining);
                    }
                }
            })
            .map_err(CameraError::Thread)?;

        info!(
            width = format.size.0,
            height = format.size.1,
            fps = format.fps,
            "synthetic camera streaming"
        );
        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<(), CameraError> {
        if self.worker.is_none() {
            return Err(CameraError::NotStreaming);
        }
        self.halt_worker();
        info!("synthetic camera stopped");
        Ok(())
    }

    fn capture_still(&mut self, request: &StillRequest) -> Result<RgbImage, CameraError> {
        check_size(request.size)?;
        let (tick, controls) = {
            let state = self.shared();
            (state.tick, state.controls.clone())
        };
        Ok(render(
            request.size,
            tick,
            &controls,
            request.hflip,
            request.vflip,
        ))
    }

    fn set_controls(&mut self, controls: &ControlMap) -> Result<(), CameraError> {
        controls::validate(&self.ranges, controls)?;
        let mut state = self.shared();
        for (name, value) in controls {
            state.controls.insert(name.clone(), *value);
        }
        Ok(())
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.halt_worker();
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check_size((width, height): (u32, u32)) -> Result<(), CameraError> {
    if width == 0 || height == 0 || width > PIXEL_ARRAY.0 || height > PIXEL_ARRAY.1 {
        return Err(CameraError::InvalidSize(width, height));
    }
    Ok(())
}

/// Gradient background with a vertical bar that advances every frame.
fn render(
    (width, height): (u32, u32),
    tick: u64,
    controls: &ControlMap,
    hflip: bool,
    vflip: bool,
) -> RgbImage {
    let gain = exposure_gain(controls);
    let offset = control_f64(controls, "Brightness", 0.0) * 128.0;
    let bar_x = ((tick * 8) % u64::from(width)) as u32;

    let scale = |v: u32| -> u8 { (f64::from(v) * gain + offset).clamp(0.0, 255.0) as u8 };

    let mut img = RgbImage::from_fn(width, height, |x, y| {
        if x.abs_diff(bar_x) < 4 {
            return Rgb([scale(255), scale(255), scale(255)]);
        }
        Rgb([
            scale(x * 255 / width),
            scale(y * 255 / height),
            scale(128),
        ])
    });

    if hflip {
        imageops::flip_horizontal_in_place(&mut img);
    }
    if vflip {
        imageops::flip_vertical_in_place(&mut img);
    }
    img
}

fn exposure_gain(controls: &ControlMap) -> f64 {
    let exposure = control_f64(controls, "ExposureTime", DEFAULT_EXPOSURE_US);
    let analogue = control_f64(controls, "AnalogueGain", 1.0);
    (exposure / DEFAULT_EXPOSURE_US * analogue).clamp(0.05, 8.0)
}

fn control_f64(controls: &ControlMap, name: &str, default: f64) -> f64 {
    controls.get(name).map(ControlValue::as_f64).unwrap_or(default)
}

fn default_modes() -> Vec<SensorMode> {
    vec![
        SensorMode {
            size: (1332, 990),
            bit_depth: 10,
            fps: 120.03,
            crop_limits: (696, 528, 2664, 1980),
        },
        SensorMode {
            size: (2028, 1080),
            bit_depth: 12,
            fps: 50.03,
            crop_limits: (0, 440, 4056, 2160),
        },
        SensorMode {
            size: (2028, 1520),
            bit_depth: 12,
            fps: 40.01,
            crop_limits: (0, 0, 4056, 3040),
        },
        SensorMode {
            size: (4056, 3040),
            bit_depth: 12,
            fps: 10.0,
            crop_limits: (0, 0, 4056, 3040),
        },
    ]
}

fn default_ranges() -> ControlRanges {
    use ControlValue::{Bool, Float, Int};

    let mut ranges = ControlRanges::new();
    ranges.insert(
        "ExposureTime".into(),
        ControlInfo::new(Int(31), Int(667_234_896), Int(20_000)),
    );
    ranges.insert(
        "AnalogueGain".into(),
        ControlInfo::new(Float(1.0), Float(22.26), Float(1.0)),
    );
    ranges.insert(
        "Brightness".into(),
        ControlInfo::new(Float(-1.0), Float(1.0), Float(0.0)),
    );
    ranges.insert(
        "Contrast".into(),
        ControlInfo::new(Float(0.0), Float(32.0), Float(1.0)),
    );
    ranges.insert(
        "Saturation".into(),
        ControlInfo::new(Float(0.0), Float(32.0), Float(1.0)),
    );
    ranges.insert(
        "Sharpness".into(),
        ControlInfo::new(Float(0.0), Float(16.0), Float(1.0)),
    );
    ranges.insert("AeEnable".into(), ControlInfo::new(Bool(false), Bool(true), Bool(true)));
    ranges.insert("AwbEnable".into(), ControlInfo::new(Bool(false), Bool(true), Bool(true)));
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn format(size: (u32, u32)) -> StreamFormat {
        StreamFormat {
            size,
            sensor_mode: 1,
            hflip: false,
            vflip: false,
            fps: 100.0,
            jpeg_quality: 70,
        }
    }

    #[test]
    fn streams_jpeg_frames_until_stopped() {
        let mut camera = SyntheticCamera::new();
        camera.configure(&format((64, 48))).unwrap();

        let (tx, rx) = mpsc::channel();
        camera
            .start_streaming(Box::new(move |r| {
                let _ = tx.send(r);
            }))
            .unwrap();

        for _ in 0..3 {
            let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
            assert_eq!(&frame[..2], &[0xFF, 0xD8]);
        }
        camera.stop_streaming().unwrap();
        assert!(matches!(camera.stop_streaming(), Err(CameraError::NotStreaming)));
    }

    #[test]
    fn configure_rejected_while_streaming_and_for_bad_mode() {
        let mut camera = SyntheticCamera::new();
        let mut bad = format((64, 48));
        bad.sensor_mode = 17;
        assert!(matches!(
            camera.configure(&bad),
            Err(CameraError::InvalidSensorMode { index: 17, available: 4 })
        ));

        camera.configure(&format((64, 48))).unwrap();
        camera.start_streaming(Box::new(|_| {})).unwrap();
        assert!(matches!(
            camera.configure(&format((32, 32))),
            Err(CameraError::AlreadyStreaming)
        ));
    }

    #[test]
    fn start_requires_configuration() {
        let mut camera = SyntheticCamera::new();
        assert!(matches!(
            camera.start_streaming(Box::new(|_| {})),
            Err(CameraError::NotConfigured)
        ));
    }

    #[test]
    fn injected_failures_reach_the_sink() {
        let mut camera = SyntheticCamera::new().with_failures_every(2);
        camera.configure(&format((16, 16))).unwrap();
        let (tx, rx) = mpsc::channel();
        camera
            .start_streaming(Box::new(move |r| {
                let _ = tx.send(r.is_ok());
            }))
            .unwrap();
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn exposure_brightens_stills() {
        let mut camera = SyntheticCamera::new();
        let request = StillRequest {
            size: (32, 32),
            hflip: false,
            vflip: false,
        };
        let dark = camera.capture_still(&request).unwrap();

        let mut controls = ControlMap::new();
        controls.insert("ExposureTime".into(), ControlValue::Int(80_000));
        camera.set_controls(&controls).unwrap();
        let bright = camera.capture_still(&request).unwrap();

        let sum = |img: &RgbImage| img.as_raw().iter().map(|&v| u64::from(v)).sum::<u64>();
        assert!(sum(&bright) > sum(&dark));
    }

    #[test]
    fn hflip_mirrors_the_pattern() {
        let mut camera = SyntheticCamera::new();
        let request = StillRequest {
            size: (40, 8),
            hflip: false,
            vflip: false,
        };
        let plain = camera.capture_still(&request).unwrap();
        let flipped = camera
            .capture_still(&StillRequest {
                hflip: true,
                ..request
            })
            .unwrap();
        assert_eq!(plain.get_pixel(0, 3), flipped.get_pixel(39, 3));
    }

    #[test]
    fn still_size_limits() {
        let mut camera = SyntheticCamera::new();
        let request = StillRequest {
            size: (0, 10),
            hflip: false,
            vflip: false,
        };
        assert!(matches!(
            camera.capture_still(&request),
            Err(CameraError::InvalidSize(0, 10))
        ));
    }
}
