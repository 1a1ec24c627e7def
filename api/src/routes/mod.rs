mod capture;
mod gallery;
mod info;
mod settings;
mod stream;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::context::AppContext;
use crate::error::{ApiError, Result};

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(info::index))
        .route("/home", get(info::home))
        .route("/camera_info", get(info::camera_info))
        .route("/video_feed", get(stream::video_feed))
        .route("/capture_photo", post(capture::capture_photo))
        .route(
            "/get_photo/:resolution/:exposure/:format",
            get(capture::get_photo),
        )
        .route("/detect_edges", post(capture::detect_edges))
        .route("/image_gallery", get(gallery::image_gallery))
        .route("/delete_image/:filename", delete(gallery::delete_image))
        .route("/view_image/:filename", get(gallery::view_image))
        .route("/download_image/:filename", get(gallery::download_image))
        .route("/update_live_settings", post(settings::update_live_settings))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Run camera or filesystem work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support;
