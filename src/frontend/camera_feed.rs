use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use iced::widget::image::Handle;
use iced::Task;
use image::RgbaImage;

use crate::backend::{
    cameras::{CameraBackend, CameraBackendCamera, CameraError},
    imaging::normalize::{fit_exact, RawFrame},
};

/// Previews wider than this are downscaled before display.
const PREVIEW_MAX_WIDTH: u32 = 960;
const RETRY_DELAY: Duration = Duration::from_millis(500);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An opened camera shared between the UI and blocking capture tasks.
pub struct SharedCamera<C>(Arc<Mutex<C>>);

impl<C> SharedCamera<C> {
    pub fn new(camera: C) -> Self {
        Self(Arc::new(Mutex::new(camera)))
    }
}

impl<C> Clone for SharedCamera<C> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<C> fmt::Debug for SharedCamera<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedCamera")
    }
}

/// The outcome of opening a camera of backend `C`, as carried in messages.
///
/// Spelled out so message enums can derive `Clone` and `Debug` over `C`
/// without asking the same of `C::Camera`.
pub struct OpenedCamera<C: CameraBackend>(pub Result<SharedCamera<C::Camera>, CameraError>);

impl<C: CameraBackend> Clone for OpenedCamera<C> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<C: CameraBackend> fmt::Debug for OpenedCamera<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpenedCamera").field(&self.0).finish()
    }
}

#[derive(Debug, Clone)]
pub enum CameraMessage {
    CaptureFrame { generation: u64 },
    NewFrame {
        generation: u64,
        frame: Result<Handle, CameraError>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct CameraFeedOptions {
    pub mirror: bool,
    /// How many recent preview frames to keep for live clips.
    pub motion_frames: usize,
    pub motion_size: (u32, u32),
}

impl Default for CameraFeedOptions {
    fn default() -> Self {
        Self {
            mirror: false,
            motion_frames: 0,
            motion_size: (320, 240),
        }
    }
}

/// Camera feed.
pub struct CameraFeed<C: CameraBackendCamera + 'static> {
    camera: Option<SharedCamera<C>>,
    current_frame: Option<Handle>,
    motion: Arc<Mutex<VecDeque<RgbaImage>>>,
    options: CameraFeedOptions,
    /// Bumped whenever the camera is swapped, so frames from the old stream
    /// are dropped.
    generation: u64,
    error: Option<CameraError>,
}

impl<C: CameraBackendCamera + 'static> CameraFeed<C> {
    pub fn new(camera: SharedCamera<C>, options: CameraFeedOptions) -> (Self, Task<CameraMessage>) {
        (
            CameraFeed {
                camera: Some(camera),
                current_frame: None,
                motion: Arc::new(Mutex::new(VecDeque::with_capacity(options.motion_frames))),
                options,
                generation: 0,
                error: None,
            },
            Task::done(CameraMessage::CaptureFrame { generation: 0 }),
        )
    }

    /// Drop the current stream. The feed shows the "camera off" placeholder
    /// until [`CameraFeed::attach`] is called.
    pub fn detach(&mut self) {
        self.generation += 1;
        self.camera = None;
        self.current_frame = None;
        self.error = None;
        lock(&self.motion).clear();
    }

    pub fn attach(&mut self, camera: SharedCamera<C>) -> Task<CameraMessage> {
        self.detach();
        self.camera = Some(camera);
        Task::done(CameraMessage::CaptureFrame {
            generation: self.generation,
        })
    }

    pub fn is_live(&self) -> bool {
        self.camera.is_some() && self.current_frame.is_some()
    }

    pub fn error(&self) -> Option<&CameraError> {
        self.error.as_ref()
    }

    /// Take a full-quality still along with the motion frames that led up to
    /// it.
    pub fn capture_still(
        &self,
    ) -> impl std::future::Future<Output = Result<(RawFrame, Arc<Vec<RgbaImage>>), CameraError>>
           + Send
           + 'static {
        let camera = self.camera.clone();
        let motion = self.motion.clone();
        async move {
            let camera = camera.ok_or_else(|| CameraError::Capture("the camera is off".into()))?;
            tokio::task::spawn_blocking(move || {
                let still = lock(&camera.0).capture_still_frame()?;
                let motion: Vec<RgbaImage> = lock(&motion).iter().cloned().collect();
                Ok::<_, CameraError>((still, Arc::new(motion)))
            })
            .await
            .map_err(|err| CameraError::Capture(format!("capture task failed: {err}")))?
        }
    }

    pub fn update(&mut self, message: CameraMessage) -> Task<CameraMessage> {
        match message {
            CameraMessage::CaptureFrame { generation } => {
                let Some(camera) = self.camera.clone().filter(|_| generation == self.generation)
                else {
                    return Task::none();
                };
                let motion = self.motion.clone();
                let options = self.options;
                Task::perform(
                    async move {
                        tokio::task::spawn_blocking(move || {
                            let frame = lock(&camera.0).capture_video_frame()?;
                            let frame = postprocess(frame, options);
                            if options.motion_frames > 0 {
                                let (width, height) = options.motion_size;
                                let small = fit_exact(&frame, width, height);
                                let mut motion = lock(&motion);
                                if motion.len() == options.motion_frames {
                                    motion.pop_front();
                                }
                                motion.push_back(small);
                            }
                            Ok::<_, CameraError>(Handle::from_rgba(
                                frame.width(),
                                frame.height(),
                                frame.into_raw(),
                            ))
                        })
                        .await
                        .map_err(|err| CameraError::Capture(format!("preview task failed: {err}")))?
                    },
                    move |frame| CameraMessage::NewFrame { generation, frame },
                )
            }
            CameraMessage::NewFrame { generation, frame } => {
                if generation != self.generation {
                    return Task::none();
                }
                match frame {
                    Ok(handle) => {
                        self.current_frame = Some(handle);
                        self.error = None;
                        Task::done(CameraMessage::CaptureFrame { generation })
                    }
                    Err(err) => {
                        if self.error.as_ref() != Some(&err) {
                            log::error!("preview frame failed: {err}");
                        }
                        self.error = Some(err);
                        Task::perform(tokio::time::sleep(RETRY_DELAY), move |_| {
                            CameraMessage::CaptureFrame { generation }
                        })
                    }
                }
            }
        }
    }

    /// The latest frame, if the camera is streaming.
    pub fn handle(&self) -> Option<Handle> {
        self.current_frame.clone()
    }
}

fn postprocess(mut frame: RgbaImage, options: CameraFeedOptions) -> RgbaImage {
    if options.mirror {
        image::imageops::flip_horizontal_in_place(&mut frame);
    }
    if frame.width() > PREVIEW_MAX_WIDTH {
        let height = frame.height() * PREVIEW_MAX_WIDTH / frame.width();
        frame = image::imageops::thumbnail(&frame, PREVIEW_MAX_WIDTH, height.max(1));
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cameras::{
        test_pattern::{TestPattern, TestPatternBackend},
        CameraBackend,
    };

    fn feed(motion_frames: usize) -> CameraFeed<<TestPatternBackend as CameraBackend>::Camera> {
        let camera = TestPatternBackend::open_camera(TestPattern::Front).unwrap();
        CameraFeed::new(
            SharedCamera::new(camera),
            CameraFeedOptions {
                mirror: true,
                motion_frames,
                motion_size: (32, 24),
            },
        )
        .0
    }

    #[test]
    fn previews_are_downscaled() {
        let frame = postprocess(RgbaImage::new(1920, 1080), CameraFeedOptions::default());
        assert_eq!(frame.dimensions(), (960, 540));
    }

    #[tokio::test]
    async fn frames_from_a_detached_camera_are_ignored() {
        let mut feed = feed(2);
        feed.detach();
        let stale = CameraMessage::NewFrame {
            generation: 0,
            frame: Ok(Handle::from_rgba(1, 1, vec![0; 4])),
        };
        let _ = feed.update(stale);
        assert!(feed.handle().is_none());
        assert!(!feed.is_live());
        assert!(matches!(
            feed.capture_still().await,
            Err(CameraError::Capture(_))
        ));
    }

    #[tokio::test]
    async fn stills_carry_the_buffered_motion() {
        let feed = feed(2);
        lock(&feed.motion).extend([RgbaImage::new(32, 24), RgbaImage::new(32, 24)]);
        let (still, motion) = feed.capture_still().await.unwrap();
        assert!(matches!(still, RawFrame::Encoded(_)));
        assert_eq!(motion.len(), 2);
    }
}
