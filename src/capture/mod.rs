//! Capture Module
//!
//! Image sources for the grid: a live camera stream with bulk capture, and a
//! file picker fallback for hosts without a usable camera.
//!
//! No platform camera backend ships with this crate. [`Capabilities::detect`]
//! attaches none, so the camera states only run when an embedder implements
//! [`CameraDevice`] and passes it in through [`Capabilities::with_camera`].
//! Without one every session goes straight to the file picker.
//!
//! [`Capabilities::detect`]: crate::capability::Capabilities::detect
//! [`Capabilities::with_camera`]: crate::capability::Capabilities::with_camera

mod device;
mod picker;
mod policy;
mod session;
mod types;

pub use device::{CameraDevice, VideoStream};
pub use picker::{list_image_files, read_image_file};
pub use policy::PlaybackPolicy;
pub use session::{CaptureSession, CaptureSink};
pub use types::{CaptureError, CapturePayload, CaptureState, FacingMode, StreamConstraints};

#[cfg(test)]
pub(crate) use device::fake::FakeCamera;
