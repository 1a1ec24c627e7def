use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use camera_panel_gallery::GalleryPage;

use super::blocking;
use crate::context::AppContext;
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct GalleryQuery {
    page: Option<usize>,
}

pub async fn image_gallery(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<GalleryQuery>,
) -> Result<Json<GalleryPage>> {
    let page = query.page.unwrap_or(1);
    let listing = blocking(move || Ok(ctx.gallery.page(page)?)).await?;
    Ok(Json(listing))
}

pub async fn delete_image(
    State(ctx): State<Arc<AppContext>>,
    Path(filename): Path<String>,
) -> Result<Json<Value>> {
    blocking(move || Ok(ctx.gallery.delete(&filename)?)).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Image deleted successfully",
    })))
}

pub async fn view_image(
    State(ctx): State<Arc<AppContext>>,
    Path(filename): Path<String>,
) -> Result<Response> {
    serve(ctx, filename, "inline").await
}

pub async fn download_image(
    State(ctx): State<Arc<AppContext>>,
    Path(filename): Path<String>,
) -> Result<Response> {
    serve(ctx, filename, "attachment").await
}

async fn serve(ctx: Arc<AppContext>, filename: String, disposition: &str) -> Result<Response> {
    let mime = mime_for(&filename);
    let disposition = format!("{disposition}; filename=\"{filename}\"");
    let data = blocking(move || Ok(ctx.gallery.read(&filename)?)).await?;
    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

fn mime_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("dng") => "image/x-adobe-dng",
        _ => "application/octet-stream",
    }
}
