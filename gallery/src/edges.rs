use image::GrayImage;
use tracing::debug;

use camera_panel_common::codec::{decode_gray, encode_gray, CodecError, ImageFormat};

const EDGE_JPEG_QUALITY: u8 = 95;

/// Canny edge detection over grayscale captures.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    low_threshold: f32,
    high_threshold: f32,
}

impl EdgeDetector {
    pub fn new(low_threshold: f32, high_threshold: f32) -> Result<Self, EdgeError> {
        if !(low_threshold >= 0.0 && low_threshold <= high_threshold) {
            return Err(EdgeError::Thresholds(low_threshold, high_threshold));
        }
        Ok(Self {
            low_threshold,
            high_threshold,
        })
    }

    pub fn detect(&self, gray: &GrayImage) -> GrayImage {
        imageproc::edges::canny(gray, self.low_threshold, self.high_threshold)
    }

    /// Decode an encoded capture, detect edges and return them as JPEG.
    pub fn detect_encoded(&self, data: &[u8]) -> Result<Vec<u8>, EdgeError> {
        let gray = decode_gray(data)?;
        let edges = self.detect(&gray);
        debug!(
            width = edges.width(),
            height = edges.height(),
            low = self.low_threshold,
            high = self.high_threshold,
            "edge detection done"
        );
        Ok(encode_gray(&edges, ImageFormat::Jpeg, EDGE_JPEG_QUALITY)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error("invalid Canny thresholds low={0} high={1}")]
    Thresholds(f32, f32),
    #[error(transparent)]
    Codec(#[from] CodecError),
}
