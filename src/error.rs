//! Error types for Gridscan
//!
//! Each module owns its error enum; `AppError` is the crate-wide umbrella
//! used at startup and by the import binary.

use thiserror::Error;

use crate::capture::CaptureError;
use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::ocr::RecognitionError;
use crate::store::StoreError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Image error: {0}")]
    Codec(#[from] CodecError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
