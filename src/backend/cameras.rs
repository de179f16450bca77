use std::fmt::{Debug, Display};

use thiserror::Error;

use super::imaging::normalize::RawFrame;

#[cfg(feature = "camera_nokhwa")]
pub mod nokhwa;
pub mod test_pattern;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera access was denied: {0}")]
    PermissionDenied(String),
    #[error("no camera found: {0}")]
    DeviceNotFound(String),
    #[error("camera is in use by another application: {0}")]
    DeviceBusy(String),
    #[error("camera failed: {0}")]
    Capture(String),
}

impl CameraError {
    /// Sort a driver message into the error the guest can do something about.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
            Self::PermissionDenied(message)
        } else if lower.contains("busy") || lower.contains("in use") {
            Self::DeviceBusy(message)
        } else if lower.contains("not found") || lower.contains("no such") || lower.contains("no device") {
            Self::DeviceNotFound(message)
        } else {
            Self::Capture(message)
        }
    }

    /// What to tell the person at the booth.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => {
                "Allow camera access for this app in your system settings, then press Start again."
            }
            Self::DeviceNotFound(_) => "Connect a camera and press Start again.",
            Self::DeviceBusy(_) => "Close any other app using the camera, then press Start again.",
            Self::Capture(_) => "Check the camera connection and try again.",
        }
    }
}

pub trait CameraBackend: Clone + Debug + Send + 'static {
    type EnumeratedCamera: Debug + Display + PartialEq + Clone + Send;
    type Camera: CameraBackendCamera;

    fn initialize() -> Result<(), CameraError> {
        Ok(())
    }
    fn enumerate_cameras() -> Result<Vec<Self::EnumeratedCamera>, CameraError>;
    fn open_camera(item: Self::EnumeratedCamera) -> Result<Self::Camera, CameraError>;
}

pub trait CameraBackendCamera: Send {
    /// A quick preview frame.
    fn capture_video_frame(&mut self) -> Result<image::RgbaImage, CameraError>;
    /// A full-quality frame for a shot, possibly still encoded.
    fn capture_still_frame(&mut self) -> Result<RawFrame, CameraError>;
}

#[cfg(feature = "camera_nokhwa")]
pub type DefaultCameraBackend = nokhwa::NokhwaBackend;
#[cfg(not(feature = "camera_nokhwa"))]
pub type DefaultCameraBackend = test_pattern::TestPatternBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_messages_are_classified() {
        assert!(matches!(
            CameraError::classify("Permission denied (os error 13)"),
            CameraError::PermissionDenied(_)
        ));
        assert!(matches!(
            CameraError::classify("Device or resource busy"),
            CameraError::DeviceBusy(_)
        ));
        assert!(matches!(
            CameraError::classify("Could not find camera: index not found"),
            CameraError::DeviceNotFound(_)
        ));
        assert!(matches!(CameraError::classify("timeout"), CameraError::Capture(_)));
    }
}
