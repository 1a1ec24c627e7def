use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use camera_panel_common::controls::ControlMap;

use super::blocking;
use crate::context::AppContext;
use crate::error::{ApiError, Result};

pub async fn index() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /home",
            "GET /video_feed",
            "POST /capture_photo",
            "GET /get_photo/:resolution/:exposure/:format",
            "POST /detect_edges",
            "GET /image_gallery?page=N",
            "GET /view_image/:filename",
            "GET /download_image/:filename",
            "DELETE /delete_image/:filename",
            "GET /camera_info",
            "POST /update_live_settings",
        ],
    }))
}

/// Everything the control panel page renders.
pub async fn home(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>> {
    let capture = ctx.capture.lock().await.clone();
    let rotation = ctx.rotation;
    let camera = Arc::clone(&ctx.camera);

    let (ranges, live, format, streaming, relay) = blocking(move || {
        let ranges = camera.control_ranges();
        // Unset controls show their driver defaults.
        let mut live: ControlMap = ranges
            .iter()
            .map(|(name, info)| (name.clone(), info.default))
            .collect();
        live.extend(camera.applied_controls());
        Ok((
            ranges,
            live,
            camera.format(),
            camera.is_streaming(),
            camera.relay(),
        ))
    })
    .await?;

    Ok(Json(json!({
        "title": "Camera Stream",
        "live_settings": live,
        "rotation_settings": {
            "hflip": rotation.hflip,
            "vflip": rotation.vflip,
        },
        "settings_from_camera": ranges,
        "capture_settings": capture,
        "sensor_mode": format.sensor_mode,
        "streaming": streaming,
        "stream": {
            "width": format.size.0,
            "height": format.size.1,
            "fps": format.fps,
            "generation": relay.generation(),
            "subscribers": relay.subscriber_count(),
            "latest_frame_at": relay.latest().map(|frame| frame.captured_at().to_rfc3339()),
        },
    })))
}

/// Catalogue entry for the connected sensor plus its readout modes.
pub async fn camera_info(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>> {
    let camera = Arc::clone(&ctx.camera);
    let (properties, modes, format) = blocking(move || {
        Ok((camera.properties(), camera.sensor_modes(), camera.format()))
    })
    .await?;

    let module = ctx
        .modules
        .as_ref()
        .and_then(|catalogue| catalogue.find(&properties.model))
        .ok_or_else(|| ApiError::NotFound("Camera module data not found".into()))?;

    Ok(Json(json!({
        "title": "Camera Info",
        "connected_camera_data": module,
        "camera_properties": properties,
        "camera_modes": modes,
        "sensor_mode": format.sensor_mode,
    })))
}
