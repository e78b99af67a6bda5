//! Image Codec
//!
//! Prepares captured images for upload and recognition: decode, bound the
//! longer side to an OCR-friendly resolution, re-encode as base64 JPEG.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gridscan::codec::prepare_payload;
//!
//! let encoded = prepare_payload(payload).await?;
//! let recognition = recognizer.recognize(&encoded.base64).await?;
//! ```

mod resize;

pub use resize::{
    decode, prepare_payload, resize_for_recognition, target_dimensions, EncodedImage,
    JPEG_QUALITY, MAX_DIMENSION,
};

/// Codec error types
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Image worker failed: {0}")]
    Worker(String),
}
