use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, GrayImage, ImageEncoder, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::str::FromStr;

/// Output formats offered for still captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            other => Err(CodecError::UnknownFormat(other.to_string())),
        }
    }
}

/// Encode an RGB buffer. `quality` only applies to JPEG.
pub fn encode_rgb(img: &RgbImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, CodecError> {
    encode_raw(
        img.as_raw(),
        img.width(),
        img.height(),
        ExtendedColorType::Rgb8,
        format,
        quality,
    )
}

/// Encode an 8-bit grayscale buffer. `quality` only applies to JPEG.
pub fn encode_gray(
    img: &GrayImage,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, CodecError> {
    encode_raw(
        img.as_raw(),
        img.width(),
        img.height(),
        ExtendedColorType::L8,
        format,
        quality,
    )
}

fn encode_raw(
    buf: &[u8],
    width: u32,
    height: u32,
    color: ExtendedColorType,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(buf.len() / 4);
    match format {
        ImageFormat::Jpeg => JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .write_image(buf, width, height, color)?,
        ImageFormat::Png => PngEncoder::new(&mut out).write_image(buf, width, height, color)?,
    }
    Ok(out)
}

/// Decode any supported encoded image and convert it to 8-bit luma.
pub fn decode_gray(data: &[u8]) -> Result<GrayImage, CodecError> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;
    Ok(img.to_luma8())
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unsupported image format {0:?}, expected 'jpeg' or 'png'")]
    UnknownFormat(String),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error while decoding: {0}")]
    Io(#[from] std::io::Error),
}
