use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use camera_panel_common::codec::CodecError;
use camera_panel_gallery::{EdgeError, GalleryError};
use camera_panel_producer::CameraError;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// The camera stream is not running.
    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Gallery(#[from] GalleryError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Edge(#[from] EdgeError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Camera(e) => match e {
                CameraError::InvalidSensorMode { .. }
                | CameraError::InvalidSize(..)
                | CameraError::UnknownControl(_)
                | CameraError::ControlOutOfRange { .. } => StatusCode::BAD_REQUEST,
                CameraError::NotConfigured
                | CameraError::AlreadyStreaming
                | CameraError::NotStreaming => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Gallery(e) => match e {
                GalleryError::InvalidName(_) => StatusCode::BAD_REQUEST,
                GalleryError::NotFound(_) => StatusCode::NOT_FOUND,
                GalleryError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Codec(CodecError::UnknownFormat(_)) => StatusCode::BAD_REQUEST,
            ApiError::Codec(_) | ApiError::Edge(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, message = %message, "request failed");
        } else {
            tracing::warn!(status = %status, message = %message, "request rejected");
        }

        let body = Json(json!({
            "success": false,
            "message": message,
        }));
        (status, body).into_response()
    }
}
