use nokhwa::{
    self,
    pixel_format::RgbAFormat,
    utils::{CameraIndex, CameraInfo, RequestedFormat, RequestedFormatType},
    Camera, NokhwaError,
};

use super::{CameraBackendCamera, CameraError};
use crate::backend::imaging::normalize::RawFrame;

impl From<NokhwaError> for CameraError {
    fn from(err: NokhwaError) -> Self {
        CameraError::classify(err.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NokhwaBackend {}

impl super::CameraBackend for NokhwaBackend {
    type EnumeratedCamera = CameraInfo;
    type Camera = NokhwaCamera;

    fn initialize() -> Result<(), CameraError> {
        nokhwa::nokhwa_initialize(|granted| {
            if !granted {
                log::error!("camera access was not granted");
            }
        });
        // permission arrives asynchronously on macOS; a denial surfaces on open
        Ok(())
    }

    fn enumerate_cameras() -> Result<Vec<CameraInfo>, CameraError> {
        if !nokhwa::nokhwa_check() {
            return Err(CameraError::PermissionDenied(
                "camera access has not been granted".into(),
            ));
        }
        let cameras = nokhwa::query(nokhwa::utils::ApiBackend::Auto)?;
        log::debug!("found {} camera(s)", cameras.len());
        Ok(cameras)
    }

    fn open_camera(item: Self::EnumeratedCamera) -> Result<NokhwaCamera, CameraError> {
        log::info!("opening camera {}", item.human_name());
        Ok(NokhwaCamera::new(item.index().clone()))
    }
}

/// A webcam opened lazily in one of two modes: highest frame rate for the
/// preview, highest resolution for stills. Switching mode reopens the stream.
pub struct NokhwaCamera {
    index: CameraIndex,
    video_camera: Option<Camera>,
    still_camera: Option<Camera>,
}

impl NokhwaCamera {
    pub fn new(index: CameraIndex) -> Self {
        NokhwaCamera {
            index,
            video_camera: None,
            still_camera: None,
        }
    }

    fn open(&self, format: RequestedFormatType) -> Result<Camera, CameraError> {
        let mut camera = Camera::new(self.index.clone(), RequestedFormat::new::<RgbAFormat>(format))?;
        camera.open_stream()?;
        Ok(camera)
    }
}

impl CameraBackendCamera for NokhwaCamera {
    fn capture_still_frame(&mut self) -> Result<RawFrame, CameraError> {
        let camera = match self.still_camera.take() {
            Some(camera) => camera,
            None => {
                self.video_camera = None; // drop the preview stream first
                self.open(RequestedFormatType::AbsoluteHighestResolution)?
            }
        };
        let camera = self.still_camera.insert(camera);
        Ok(RawFrame::Rgba(camera.frame()?.decode_image::<RgbAFormat>()?))
    }

    fn capture_video_frame(&mut self) -> Result<image::RgbaImage, CameraError> {
        let camera = match self.video_camera.take() {
            Some(camera) => camera,
            None => {
                self.still_camera = None; // drop the high-res still stream
                self.open(RequestedFormatType::AbsoluteHighestFrameRate)?
            }
        };
        let camera = self.video_camera.insert(camera);
        Ok(camera.frame()?.decode_image::<RgbAFormat>()?)
    }
}
