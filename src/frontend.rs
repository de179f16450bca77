use std::{future::Future, sync::Arc};

use iced::Task;

use crate::{
    backend::{
        cameras::{CameraBackend, CameraError},
        imaging::caption::CaptionFont,
    },
    config::BoothConfig,
};

use self::camera_feed::{OpenedCamera, SharedCamera};

pub mod camera_feed;
pub mod find;
pub mod main_app;
pub mod setup;
pub mod title_overlay;

/// What every page is handed: the loaded configuration, the server and the
/// caption font (loaded once at start-up).
pub struct BoothContext<S> {
    pub config: Arc<BoothConfig>,
    pub server: S,
    pub font: Option<Arc<CaptionFont>>,
}

impl<S: Clone> Clone for BoothContext<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            server: self.server.clone(),
            font: self.font.clone(),
        }
    }
}

/// Open a camera without blocking the UI thread.
pub fn open_camera<C: CameraBackend>(
    item: C::EnumeratedCamera,
) -> impl Future<Output = OpenedCamera<C>> + Send + 'static {
    async move {
        let opened = tokio::task::spawn_blocking(move || C::open_camera(item).map(SharedCamera::new))
            .await
            .map_err(|err| CameraError::Capture(format!("camera task failed: {err}")))
            .and_then(|result| result);
        OpenedCamera(opened)
    }
}

pub fn enter_fullscreen<T: Send + 'static>() -> Task<T> {
    iced::window::get_latest().and_then(|id| {
        Task::batch([
            iced::window::change_mode(id, iced::window::Mode::Fullscreen),
            iced::window::toggle_decorations(id),
        ])
    })
}

pub fn leave_fullscreen<T: Send + 'static>() -> Task<T> {
    iced::window::get_latest().and_then(|id| {
        Task::batch([
            iced::window::change_mode(id, iced::window::Mode::Windowed),
            iced::window::toggle_decorations(id),
        ])
    })
}
