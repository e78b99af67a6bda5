//! Camera device traits
//!
//! Platform camera backends implement these; the capture session only sees
//! the traits.

use async_trait::async_trait;
use image::DynamicImage;

use super::types::{CaptureError, StreamConstraints};

/// A camera that can hand out live video streams
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Request a stream; this is where permission prompts happen
    async fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn VideoStream>, CaptureError>;
}

/// A live video stream
#[async_trait]
pub trait VideoStream: Send {
    /// Start playback; may fail under autoplay restrictions
    async fn play(&mut self) -> Result<(), CaptureError>;

    /// Natural frame size, `(0, 0)` until frames flow
    fn frame_size(&self) -> (u32, u32);

    /// Copy the current frame
    fn grab_frame(&mut self) -> Result<DynamicImage, CaptureError>;

    fn is_live(&self) -> bool;

    /// Release every track of the stream
    fn stop(&mut self);
}
