//! Resize and re-encode for recognition

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use super::CodecError;
use crate::capture::CapturePayload;

/// Longest side, in pixels, sent to the OCR service
pub const MAX_DIMENSION: u32 = 1600;

/// JPEG quality for uploaded images (0-100)
pub const JPEG_QUALITY: u8 = 87;

/// A JPEG ready for upload, base64 without a data-URL prefix
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

/// Output dimensions for an input of `width` x `height`
///
/// Never upscales. When the longer side exceeds [`MAX_DIMENSION`] it becomes
/// exactly [`MAX_DIMENSION`] and the shorter side is scaled and rounded.
pub fn target_dimensions(width: u32, height: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= MAX_DIMENSION {
        return (width, height);
    }

    let scale = MAX_DIMENSION as f64 / longer as f64;
    let scaled = |side: u32| -> u32 {
        if side == longer {
            MAX_DIMENSION
        } else {
            ((side as f64 * scale).round() as u32).max(1)
        }
    };

    (scaled(width), scaled(height))
}

/// Decode encoded image bytes of any supported format
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Bound the image to [`MAX_DIMENSION`] and encode it as base64 JPEG
pub fn resize_for_recognition(image: &DynamicImage) -> Result<EncodedImage, CodecError> {
    let (width, height) = target_dimensions(image.width(), image.height());

    let resized = if (width, height) == (image.width(), image.height()) {
        image.to_rgb8()
    } else {
        image
            .resize_exact(width, height, FilterType::Lanczos3)
            .to_rgb8()
    };

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode_image(&resized)
        .map_err(|e| CodecError::Encode(e.to_string()))?;

    Ok(EncodedImage {
        base64: base64::engine::general_purpose::STANDARD.encode(&buffer),
        width,
        height,
    })
}

/// Decode (if needed), resize and encode a captured payload off the async runtime
pub async fn prepare_payload(payload: CapturePayload) -> Result<EncodedImage, CodecError> {
    tokio::task::spawn_blocking(move || match payload {
        CapturePayload::Encoded { bytes, .. } => resize_for_recognition(&decode(&bytes)?),
        CapturePayload::Frame { image, .. } => resize_for_recognition(&image),
    })
    .await
    .map_err(|e| CodecError::Worker(e.to_string()))?
}
