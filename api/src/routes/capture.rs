use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use camera_panel_common::codec::{encode_rgb, ImageFormat};
use camera_panel_gallery::GalleryStore;

use super::blocking;
use crate::context::AppContext;
use crate::error::{ApiError, Result};

/// Still at the current stream size, saved as JPEG. The stream keeps running.
pub async fn capture_photo(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>> {
    let filename = blocking(move || {
        let image = ctx.camera.capture_still()?;
        let data = encode_rgb(&image, ImageFormat::Jpeg, ctx.jpeg_quality)?;
        let name = GalleryStore::capture_name(Utc::now(), ImageFormat::Jpeg.extension());
        ctx.gallery.save(&name, &data)?;
        Ok(name)
    })
    .await?;

    info!(filename = %filename, "photo captured");
    Ok(Json(json!({
        "success": true,
        "message": "Image captured successfully",
        "filename": filename,
    })))
}

/// Full-resolution still with an explicit exposure, returned as a download.
pub async fn get_photo(
    State(ctx): State<Arc<AppContext>>,
    Path((resolution, exposure, format)): Path<(String, String, String)>,
) -> Result<Response> {
    let size = parse_resolution(&resolution).ok_or_else(|| {
        ApiError::BadRequest("Invalid resolution format. Use <width>x<height>.".into())
    })?;
    let exposure: i64 = exposure
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid exposure value.".into()))?;
    let format: ImageFormat = format
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid format. Use 'jpeg' or 'png'.".into()))?;

    let (filename, data) = blocking(move || {
        let image = ctx.camera.capture_still_with(size, Some(exposure))?;
        let data = encode_rgb(&image, format, ctx.jpeg_quality)?;
        let name = GalleryStore::capture_name(Utc::now(), format.extension());
        ctx.gallery.save(&name, &data)?;
        Ok((name, data))
    })
    .await?;

    info!(
        filename = %filename,
        width = size.0,
        height = size.1,
        exposure_us = exposure,
        "still captured"
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.mime_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        data,
    )
        .into_response())
}

/// Capture, then store a Canny edge map next to the capture.
pub async fn detect_edges(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>> {
    let (image_name, edges_name) = blocking(move || {
        let image = ctx.camera.capture_still()?;
        let data = encode_rgb(&image, ImageFormat::Jpeg, ctx.jpeg_quality)?;
        let now = Utc::now();
        let image_name = GalleryStore::capture_name(now, ImageFormat::Jpeg.extension());
        ctx.gallery.save(&image_name, &data)?;

        let edges = ctx.edges.detect_encoded(&data)?;
        let edges_name = GalleryStore::edges_name(now);
        ctx.gallery.save(&edges_name, &edges)?;
        Ok((image_name, edges_name))
    })
    .await?;

    info!(image = %image_name, edges = %edges_name, "edge detection saved");
    Ok(Json(json!({
        "success": true,
        "image": image_name,
        "edge_image": edges_name,
    })))
}

/// `1920x1080` -> (1920, 1080)
fn parse_resolution(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once('x')?;
    let size = (w.parse().ok()?, h.parse().ok()?);
    (size.0 > 0 && size.1 > 0).then_some(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::spawn_app;

    #[test]
    fn resolution_parsing() {
        assert_eq!(parse_resolution("640x480"), Some((640, 480)));
        assert_eq!(parse_resolution("640X480"), None);
        assert_eq!(parse_resolution("640x"), None);
        assert_eq!(parse_resolution("0x480"), None);
        assert_eq!(parse_resolution("-1x480"), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn capture_photo_saves_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let app = spawn_app(dir.path()).await;

        let resp = app
            .client
            .post(app.url("/capture_photo"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);

        let filename = body["filename"].as_str().unwrap();
        assert!(filename.starts_with("pimage_") && filename.ends_with(".jpg"));
        let saved = std::fs::read(dir.path().join("gallery").join(filename)).unwrap();
        assert_eq!(&saved[..2], &[0xFF, 0xD8]);
        assert!(app.ctx.camera.is_streaming());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn get_photo_returns_attachment_and_resumes_stream() {
        let dir = tempfile::tempdir().unwrap();
        let app = spawn_app(dir.path()).await;

        let resp = app
            .client
            .get(app.url("/get_photo/128x96/10000/png"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "image/png");
        let disposition = resp.headers()["content-disposition"]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"pimage_"));
        assert!(disposition.ends_with(".png\""));

        let data = resp.bytes().await.unwrap();
        let decoded = image::load_from_memory(&data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (128, 96));
        assert!(app.ctx.camera.is_streaming());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn get_photo_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let app = spawn_app(dir.path()).await;

        let cases = [
            ("/get_photo/640by480/1000/jpeg", "Invalid resolution format. Use <width>x<height>."),
            ("/get_photo/640x480/fast/jpeg", "Invalid exposure value."),
            ("/get_photo/640x480/1000/gif", "Invalid format. Use 'jpeg' or 'png'."),
        ];
        for (path, message) in cases {
            let resp = app.client.get(app.url(path)).send().await.unwrap();
            assert_eq!(resp.status(), 400, "{path}");
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["success"], false);
            assert_eq!(body["message"], message);
        }

        // Outside the sensor's exposure range.
        let resp = app
            .client
            .get(app.url("/get_photo/640x480/1/jpeg"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert!(app.ctx.camera.is_streaming());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn detect_edges_saves_both_images() {
        let dir = tempfile::tempdir().unwrap();
        let app = spawn_app(dir.path()).await;

        let resp = app
            .client
            .post(app.url("/detect_edges"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        let image = body["image"].as_str().unwrap();
        let edges = body["edge_image"].as_str().unwrap();
        assert!(edges.starts_with("pimage_edges_"));
        assert_eq!(
            image.trim_start_matches("pimage_"),
            edges.trim_start_matches("pimage_edges_")
        );

        let gallery = dir.path().join("gallery");
        assert!(gallery.join(image).is_file());
        let edge_img = image::open(gallery.join(edges)).unwrap();
        assert_eq!((edge_img.width(), edge_img.height()), (64, 48));
    }
}
