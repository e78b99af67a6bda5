//! Host capabilities
//!
//! Built once at startup and handed to whatever needs to know about the
//! platform. Camera backends are injected; without one, capture falls back to
//! the file picker.

use std::sync::Arc;

use serde::Serialize;

use crate::capture::CameraDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Android,
    Ios,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            "android" => Self::Android,
            "ios" => Self::Ios,
            _ => Self::Other,
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, Self::Android | Self::Ios)
    }
}

#[derive(Clone)]
pub struct Capabilities {
    pub platform: Platform,
    camera: Option<Arc<dyn CameraDevice>>,
}

impl Capabilities {
    /// Capabilities of the host, with no camera attached
    ///
    /// There is no built-in camera backend; attach one with [`Self::with_camera`].
    pub fn detect() -> Self {
        Self {
            platform: Platform::current(),
            camera: None,
        }
    }

    pub fn with_camera(mut self, camera: Arc<dyn CameraDevice>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn camera(&self) -> Option<Arc<dyn CameraDevice>> {
        self.camera.clone()
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("platform", &self.platform)
            .field("camera", &self.has_camera())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FakeCamera;

    #[test]
    fn test_detect_has_no_camera() {
        let caps = Capabilities::detect();
        assert!(!caps.has_camera());
        assert_eq!(caps.platform, Platform::current());
    }

    #[test]
    fn test_with_camera() {
        let caps = Capabilities::detect().with_camera(Arc::new(FakeCamera::new()));
        assert!(caps.has_camera());
        assert!(caps.camera().is_some());
    }
}
