//! Capture session
//!
//! Drives one camera stream through `Idle -> Camera -> VideoReady -> Captured`
//! and hands confirmed captures to a [`CaptureSink`] at an advancing cursor.
//! When no camera can be opened the file picker stays available.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::device::{CameraDevice, VideoStream};
use super::picker;
use super::policy::PlaybackPolicy;
use super::types::{CaptureError, CapturePayload, CaptureState, StreamConstraints};
use crate::capability::Capabilities;
use crate::grid::GridPosition;

/// Receives confirmed captures
pub trait CaptureSink: Send + Sync {
    fn stage_capture(&self, order: u32, payload: CapturePayload);
}

pub struct CaptureSession {
    camera: Option<Arc<dyn CameraDevice>>,
    stream: Option<Box<dyn VideoStream>>,
    sink: Arc<dyn CaptureSink>,
    policy: PlaybackPolicy,
    constraints: StreamConstraints,
    state: CaptureState,
    captured: Option<CapturePayload>,
    columns: u32,
    cursor: u32,
    manual_start_required: bool,
}

impl CaptureSession {
    pub fn new(
        capabilities: &Capabilities,
        sink: Arc<dyn CaptureSink>,
        policy: PlaybackPolicy,
        columns: u32,
        start_order: u32,
    ) -> Self {
        Self {
            camera: capabilities.camera(),
            stream: None,
            sink,
            policy,
            constraints: StreamConstraints::default(),
            state: CaptureState::Idle,
            captured: None,
            columns: columns.max(1),
            cursor: start_order,
            manual_start_required: false,
        }
    }

    pub fn with_constraints(mut self, constraints: StreamConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Order the next capture lands on
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn position(&self) -> GridPosition {
        GridPosition::of(self.cursor, self.columns)
    }

    pub fn captured(&self) -> Option<&CapturePayload> {
        self.captured.as_ref()
    }

    /// True when no stream is open and files are the only source
    pub fn file_fallback_available(&self) -> bool {
        self.state == CaptureState::Idle
    }

    /// Automatic playback gave up; the user has to start the camera
    pub fn manual_start_required(&self) -> bool {
        self.manual_start_required
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_live())
    }

    /// Acquire a camera stream, releasing any previous one first
    pub async fn open(&mut self) -> Result<(), CaptureError> {
        self.stop_stream();
        self.captured = None;
        self.manual_start_required = false;

        let camera = self.camera.clone().ok_or(CaptureError::Unavailable)?;
        match camera.open_stream(&self.constraints).await {
            Ok(stream) => {
                info!(order = self.cursor, "Camera stream opened");
                self.stream = Some(stream);
                self.state = CaptureState::Camera;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to open camera, falling back to file picker: {}", e);
                self.state = CaptureState::Idle;
                Err(e)
            }
        }
    }

    /// Start playback and wait for frames
    ///
    /// Returns `Ok(false)` when frames never arrived; check
    /// [`manual_start_required`](Self::manual_start_required) for whether
    /// playback itself failed.
    pub async fn await_ready(&mut self) -> Result<bool, CaptureError> {
        match self.state {
            CaptureState::VideoReady => return Ok(true),
            CaptureState::Camera => {}
            CaptureState::Captured => return Err(CaptureError::NotReady),
            CaptureState::Idle => return Err(CaptureError::NotStreaming),
        }

        let stream = self.stream.as_mut().ok_or(CaptureError::NotStreaming)?;
        let mut attempt = 1;
        let played = loop {
            let Some(delay) = self.policy.delay_before(attempt) else {
                break false;
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match stream.play().await {
                Ok(()) => break true,
                Err(e) => debug!(attempt, "Playback attempt failed: {}", e),
            }
            attempt += 1;
        };

        if !played {
            warn!(
                attempts = self.policy.max_attempts,
                "Camera playback failed, manual start required"
            );
            self.manual_start_required = true;
            return Ok(false);
        }

        self.manual_start_required = false;
        Ok(self.poll_ready().await)
    }

    /// User-initiated playback after automatic attempts gave up
    pub async fn manual_start(&mut self) -> Result<bool, CaptureError> {
        if self.state != CaptureState::Camera {
            return self.await_ready().await;
        }

        let stream = self.stream.as_mut().ok_or(CaptureError::NotStreaming)?;
        stream.play().await?;
        self.manual_start_required = false;
        Ok(self.poll_ready().await)
    }

    async fn poll_ready(&mut self) -> bool {
        if self.check_ready() {
            return true;
        }
        for wait in self.policy.readiness_waits() {
            tokio::time::sleep(wait).await;
            if self.check_ready() {
                return true;
            }
        }
        debug!("Video never reported frame dimensions");
        false
    }

    fn check_ready(&mut self) -> bool {
        let ready = self.stream.as_ref().is_some_and(|stream| {
            let (w, h) = stream.frame_size();
            stream.is_live() && w > 0 && h > 0
        });
        if ready {
            self.state = CaptureState::VideoReady;
        }
        ready
    }

    /// Grab the current frame and hold it for confirmation
    pub fn capture(&mut self) -> Result<&CapturePayload, CaptureError> {
        if self.state != CaptureState::VideoReady {
            return Err(CaptureError::NotReady);
        }
        let stream = self.stream.as_mut().ok_or(CaptureError::NotStreaming)?;
        let frame = stream.grab_frame()?;
        if frame.width() == 0 || frame.height() == 0 {
            return Err(CaptureError::EmptyFrame);
        }

        self.state = CaptureState::Captured;
        Ok(&*self.captured.insert(CapturePayload::from_frame(frame)))
    }

    /// Drop the held frame and go back to the live stream
    pub fn retake(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Captured {
            return Err(CaptureError::NothingCaptured);
        }
        self.captured = None;
        self.state = CaptureState::Camera;
        Ok(())
    }

    /// Hand the held frame to the sink and advance; returns the order it went to
    pub fn confirm(&mut self) -> Result<u32, CaptureError> {
        let payload = self.captured.take().ok_or(CaptureError::NothingCaptured)?;
        let order = self.cursor;

        self.sink.stage_capture(order, payload);
        self.cursor += 1;
        self.state = if self.is_streaming() {
            CaptureState::Camera
        } else {
            CaptureState::Idle
        };

        info!(order, next = self.cursor, "Capture confirmed");
        Ok(order)
    }

    /// Advance the cursor without producing a capture
    pub fn skip(&mut self) -> u32 {
        self.cursor += 1;
        debug!(next = self.cursor, "Position skipped");
        self.cursor
    }

    /// Read an image file and hand it to the sink at the cursor
    pub async fn upload_file(&mut self, path: &Path) -> Result<u32, CaptureError> {
        let payload = picker::read_image_file(path).await?;
        let order = self.cursor;

        self.sink.stage_capture(order, payload);
        self.cursor += 1;

        info!(order, file = %path.display(), "File staged");
        Ok(order)
    }

    /// Release the camera
    pub fn close(&mut self) {
        self.stop_stream();
        self.captured = None;
        self.manual_start_required = false;
        self.state = CaptureState::Idle;
    }

    fn stop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!("Camera stream stopped");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop_stream();
    }
}
