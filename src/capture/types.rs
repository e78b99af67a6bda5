//! Capture types

use image::DynamicImage;
use serde::Serialize;

/// A raw image ready for processing, not yet uploaded
#[derive(Debug, Clone)]
pub enum CapturePayload {
    /// Encoded file contents from the file picker
    Encoded { file_name: String, bytes: Vec<u8> },
    /// A decoded camera frame
    Frame { file_name: String, image: DynamicImage },
}

impl CapturePayload {
    /// Wrap a camera frame, named after the capture time
    pub fn from_frame(image: DynamicImage) -> Self {
        Self::Frame {
            file_name: format!("camera-{}.jpg", chrono::Utc::now().timestamp_millis()),
            image,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            Self::Encoded { file_name, .. } | Self::Frame { file_name, .. } => file_name,
        }
    }
}

/// Camera capture state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureState {
    /// No stream; the file picker is the only source
    Idle,
    /// Stream acquired, frames not yet flowing
    Camera,
    /// Frames have nonzero dimensions; capture is enabled
    VideoReady,
    /// A frame is held for confirmation or retake
    Captured,
}

/// Which camera to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    User,
    Environment,
}

/// Stream request constraints
#[derive(Debug, Clone)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub ideal_size: (u32, u32),
    pub max_size: (u32, u32),
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal_size: (1280, 720),
            max_size: (1920, 1080),
        }
    }
}

/// Capture error types
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("No camera available")]
    Unavailable,

    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera device error: {0}")]
    Device(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Camera is not ready")]
    NotReady,

    #[error("No camera stream is open")]
    NotStreaming,

    #[error("No captured image to confirm")]
    NothingCaptured,

    #[error("Captured frame is empty")]
    EmptyFrame,

    #[error("Not an image file: {0}")]
    UnsupportedFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
