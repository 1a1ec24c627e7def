//! Owns the camera driver and the live frame relay.
//!
//! Every operation that reconfigures the sensor follows the same sequence:
//! stop the stream, close the current relay (ending all live consumers),
//! reconfigure, then restart with a fresh relay.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use image::RgbImage;
use tracing::{debug, error, info, warn};

use camera_panel_common::controls::{ControlMap, ControlValue};
use camera_panel_common::relay::{FrameRelay, RelayClosed};

use crate::controls::{self, ControlRanges};
use crate::driver::{
    CameraDriver, CameraProperties, CaptureResult, FrameSink, SensorMode, StillRequest,
    StreamFormat,
};
use crate::CameraError;

const EXPOSURE_CONTROL: &str = "ExposureTime";

pub struct CameraSession {
    inner: Mutex<Inner>,
    relay: RwLock<Arc<FrameRelay>>,
}

struct Inner {
    driver: Box<dyn CameraDriver>,
    format: StreamFormat,
    streaming: bool,
    /// Controls applied so far, re-applied after every restart.
    controls: ControlMap,
}

impl CameraSession {
    pub fn new(driver: Box<dyn CameraDriver>, format: StreamFormat) -> Result<Self, CameraError> {
        check_format(driver.as_ref(), &format)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                driver,
                format,
                streaming: false,
                controls: ControlMap::new(),
            }),
            relay: RwLock::new(Arc::new(FrameRelay::new())),
        })
    }

    /// The relay currently fed by the stream. Consumers should fetch it
    /// once per connection; it is replaced on every restart.
    pub fn relay(&self) -> Arc<FrameRelay> {
        Arc::clone(&self.relay.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn properties(&self) -> CameraProperties {
        self.lock().driver.properties()
    }

    pub fn sensor_modes(&self) -> Vec<SensorMode> {
        self.lock().driver.sensor_modes()
    }

    pub fn control_ranges(&self) -> ControlRanges {
        self.lock().driver.controls()
    }

    pub fn format(&self) -> StreamFormat {
        self.lock().format
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().streaming
    }

    pub fn applied_controls(&self) -> ControlMap {
        self.lock().controls.clone()
    }

    /// Configure the sensor with the current format and start streaming
    /// into a fresh relay. A no-op when already streaming.
    pub fn start_streaming(&self) -> Result<(), CameraError> {
        let mut inner = self.lock();
        if inner.streaming {
            debug!("start requested while already streaming");
            return Ok(());
        }
        self.start_locked(&mut inner)
    }

    /// Stop the stream and close the relay. A no-op when already stopped.
    pub fn stop_streaming(&self) -> Result<(), CameraError> {
        let mut inner = self.lock();
        self.stop_locked(&mut inner)
    }

    /// Change the stream format, pausing the stream around the change.
    ///
    /// If the camera rejects the new format the previous one is restored.
    pub fn reconfigure<F>(&self, update: F) -> Result<StreamFormat, CameraError>
    where
        F: FnOnce(&mut StreamFormat),
    {
        let mut inner = self.lock();
        let previous = inner.format;
        let mut next = previous;
        update(&mut next);
        check_format(inner.driver.as_ref(), &next)?;

        let was_streaming = inner.streaming;
        self.stop_locked(&mut inner)?;
        inner.format = next;

        if was_streaming {
            if let Err(e) = self.start_locked(&mut inner) {
                error!(error = %e, "restart with new format failed, restoring previous format");
                inner.format = previous;
                if let Err(e) = self.start_locked(&mut inner) {
                    error!(error = %e, "failed to restart stream with previous format");
                }
                return Err(e);
            }
        }

        info!(
            width = next.size.0,
            height = next.size.1,
            sensor_mode = next.sensor_mode,
            "stream reconfigured"
        );
        Ok(next)
    }

    /// Validate and apply controls to the running camera. No stream pause.
    pub fn set_controls(&self, controls: &ControlMap) -> Result<(), CameraError> {
        let mut inner = self.lock();
        controls::validate(&inner.driver.controls(), controls)?;
        inner.driver.set_controls(controls)?;
        for (name, value) in controls {
            inner.controls.insert(name.clone(), *value);
        }
        debug!(count = controls.len(), "controls applied");
        Ok(())
    }

    /// Capture a still at the stream's current size without pausing it.
    pub fn capture_still(&self) -> Result<RgbImage, CameraError> {
        let mut inner = self.lock();
        let request = StillRequest {
            size: inner.format.size,
            hflip: inner.format.hflip,
            vflip: inner.format.vflip,
        };
        inner.driver.capture_still(&request)
    }

    /// Capture a still with its own size and optional exposure time (in
    /// microseconds). The stream is paused for the capture and restarted
    /// afterwards, even if the capture failed.
    pub fn capture_still_with(
        &self,
        size: (u32, u32),
        exposure_us: Option<i64>,
    ) -> Result<RgbImage, CameraError> {
        let mut inner = self.lock();
        let was_streaming = inner.streaming;
        self.stop_locked(&mut inner)?;

        let request = StillRequest {
            size,
            hflip: inner.format.hflip,
            vflip: inner.format.vflip,
        };
        let result = Self::capture_with_exposure(&mut inner, &request, exposure_us);

        if was_streaming {
            self.start_locked(&mut inner)?;
        }
        result
    }

    fn capture_with_exposure(
        inner: &mut Inner,
        request: &StillRequest,
        exposure_us: Option<i64>,
    ) -> Result<RgbImage, CameraError> {
        let Some(exposure) = exposure_us else {
            return inner.driver.capture_still(request);
        };

        let ranges = inner.driver.controls();
        let mut override_map = ControlMap::new();
        override_map.insert(EXPOSURE_CONTROL.into(), ControlValue::Int(exposure));
        controls::validate(&ranges, &override_map)?;
        inner.driver.set_controls(&override_map)?;

        let result = inner.driver.capture_still(request);

        // Put back whatever exposure the stream was using.
        let restore = inner
            .controls
            .get(EXPOSURE_CONTROL)
            .copied()
            .or_else(|| ranges.get(EXPOSURE_CONTROL).map(|info| info.default));
        if let Some(value) = restore {
            let mut restore_map = ControlMap::new();
            restore_map.insert(EXPOSURE_CONTROL.into(), value);
            if let Err(e) = inner.driver.set_controls(&restore_map) {
                warn!(error = %e, "failed to restore exposure after still capture");
            }
        }
        result
    }

    fn start_locked(&self, inner: &mut Inner) -> Result<(), CameraError> {
        let format = inner.format;
        inner.driver.configure(&format)?;

        let relay = Arc::new(FrameRelay::new());
        inner.driver.start_streaming(frame_sink(Arc::clone(&relay)))?;

        if !inner.controls.is_empty() {
            let controls = inner.controls.clone();
            if let Err(e) = inner.driver.set_controls(&controls) {
                warn!(error = %e, "failed to re-apply controls after start");
            }
        }

        let previous = std::mem::replace(
            &mut *self.relay.write().unwrap_or_else(PoisonError::into_inner),
            relay,
        );
        previous.close();
        inner.streaming = true;
        info!(
            width = format.size.0,
            height = format.size.1,
            sensor_mode = format.sensor_mode,
            "streaming started"
        );
        Ok(())
    }

    fn stop_locked(&self, inner: &mut Inner) -> Result<(), CameraError> {
        if !inner.streaming {
            return Ok(());
        }
        inner.driver.stop_streaming()?;
        inner.streaming = false;
        self.relay().close();
        info!("streaming stopped");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        let mut inner = self.lock();
        if inner.streaming {
            if let Err(e) = inner.driver.stop_streaming() {
                warn!(error = %e, "failed to stop camera on shutdown");
            }
            inner.streaming = false;
        }
        drop(inner);
        self.relay().close();
    }
}

fn check_format(driver: &dyn CameraDriver, format: &StreamFormat) -> Result<(), CameraError> {
    let available = driver.sensor_modes().len();
    if format.sensor_mode >= available {
        return Err(CameraError::InvalidSensorMode {
            index: format.sensor_mode,
            available,
        });
    }
    if format.size.0 == 0 || format.size.1 == 0 {
        return Err(CameraError::InvalidSize(format.size.0, format.size.1));
    }
    Ok(())
}

/// Build the callback handed to the driver: successful frames go to the
/// relay, capture errors are logged and skipped.
fn frame_sink(relay: Arc<FrameRelay>) -> FrameSink {
    let mut consecutive_errors: u32 = 0;
    Box::new(move |result: CaptureResult| match result {
        Ok(jpeg) => {
            consecutive_errors = 0;
            if let Err(RelayClosed) = relay.publish(jpeg) {
                debug!("frame dropped, relay closed");
            }
        }
        Err(e) => {
            consecutive_errors += 1;
            warn!(error = %e, consecutive_errors, "camera capture failed, frame skipped");
        }
    })
}
