use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use camera_panel_common::controls::{ControlMap, ControlValue};
use camera_panel_producer::controls::{self, ControlRanges};
use camera_panel_producer::CameraError;

use super::blocking;
use crate::context::AppContext;
use crate::error::{ApiError, Result};

/// A validated settings request.
#[derive(Debug, Default, PartialEq)]
struct SettingsUpdate {
    resolution: Option<usize>,
    make_raw: Option<bool>,
    sensor_mode: Option<usize>,
    controls: ControlMap,
}

impl SettingsUpdate {
    /// Parse every key before anything is applied. Unknown keys reject the
    /// whole request.
    fn parse(body: &Map<String, Value>, ranges: &ControlRanges) -> Result<Self> {
        if body.is_empty() {
            return Err(ApiError::BadRequest("No settings provided".into()));
        }

        let mut update = SettingsUpdate::default();
        let mut unknown = Vec::new();
        for (key, value) in body {
            match key.as_str() {
                "Resolution" => update.resolution = Some(index_value(key, value)?),
                "sensor_mode" => update.sensor_mode = Some(index_value(key, value)?),
                "makeRaw" => {
                    let flag = value.as_bool().ok_or_else(|| invalid(key))?;
                    update.make_raw = Some(flag);
                }
                name if ranges.contains_key(name) => {
                    let parsed: ControlValue =
                        serde_json::from_value(value.clone()).map_err(|_| invalid(key))?;
                    update.controls.insert(name.to_string(), parsed);
                }
                other => unknown.push(other.to_string()),
            }
        }

        if !unknown.is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Unknown settings: {}",
                unknown.join(", ")
            )));
        }
        Ok(update)
    }

    /// Check values against what the camera supports, so a request is either
    /// applied in full or not at all.
    fn check(&self, ranges: &ControlRanges, sensor_modes: usize) -> Result<()> {
        if let Some(index) = self.sensor_mode {
            if index >= sensor_modes {
                return Err(CameraError::InvalidSensorMode {
                    index,
                    available: sensor_modes,
                }
                .into());
            }
        }
        controls::validate(ranges, &self.controls)?;
        Ok(())
    }
}

/// Non-negative integer, given as a JSON number or a numeric string.
fn index_value(key: &str, value: &Value) -> Result<usize> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(key))
}

fn invalid(key: &str) -> ApiError {
    ApiError::BadRequest(format!("Invalid value for {key}"))
}

/// Apply live, capture and sensor settings, then persist them.
///
/// Controls are applied without pausing the stream. A resolution or sensor
/// mode change restarts it, which ends every open `/video_feed` response.
/// Nothing is changed unless every key in the request is valid.
pub async fn update_live_settings(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Value>> {
    let mut capture = ctx.capture.lock().await;

    let camera = Arc::clone(&ctx.camera);
    let (ranges, sensor_modes) =
        blocking(move || Ok((camera.control_ranges(), camera.sensor_modes().len()))).await?;
    let update = SettingsUpdate::parse(&body, &ranges)?;
    update.check(&ranges, sensor_modes)?;

    let mut next = capture.clone();
    let size = match update.resolution {
        Some(index) => {
            let size = next.size_at(index).ok_or_else(|| {
                ApiError::BadRequest(format!("Resolution index {index} is out of range"))
            })?;
            next.resolution = index;
            Some(size)
        }
        None => None,
    };
    if let Some(flag) = update.make_raw {
        next.make_raw = flag;
    }

    let worker = Arc::clone(&ctx);
    let persisted_settings = next.clone();
    let (sensor_mode, live, persisted) = blocking(move || {
        let camera = &worker.camera;
        if size.is_some() || update.sensor_mode.is_some() {
            camera.reconfigure(|format| {
                if let Some(size) = size {
                    format.size = size;
                }
                if let Some(mode) = update.sensor_mode {
                    format.sensor_mode = mode;
                }
            })?;
        }
        if !update.controls.is_empty() {
            camera.set_controls(&update.controls)?;
        }

        let persisted = match worker.persist(&persisted_settings) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist camera settings");
                false
            }
        };
        Ok((camera.format().sensor_mode, camera.applied_controls(), persisted))
    })
    .await?;

    *capture = next;
    info!(
        resolution = capture.resolution,
        make_raw = capture.make_raw,
        sensor_mode,
        keys = body.len(),
        "settings updated"
    );

    Ok(Json(json!({
        "success": true,
        "message": "Settings updated successfully",
        "settings": *capture,
        "sensor_mode": sensor_mode,
        "live_settings": live,
        "persisted": persisted,
    })))
}
