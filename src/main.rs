use std::{sync::Arc, time::Duration};

use backend::{
    cameras::{CameraBackend, DefaultCameraBackend},
    servers::{mock::MockBackend, BoothServer, ServerBackend},
};
use config::BoothConfig;
use frontend::{
    find::{Find, FindMessage},
    main_app::{MainApp, MainAppMessage},
    setup::{Setup, SetupMessage},
    BoothContext,
};
use iced::{
    keyboard::{key::Named, Key},
    Task,
};

mod backend;
mod config;
mod frontend;

enum AppPage<C: CameraBackend, S: ServerBackend> {
    Setup(Setup<C, S>),
    MainApp(MainApp<C, S>),
    Find(Find<C, S>),
}

struct PhotoBoothApplication<C: CameraBackend, S: ServerBackend> {
    page: AppPage<C, S>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMessage {
    Space,
    Retake,
    Escape,
    SwitchCamera,
}

#[derive(Debug, Clone)]
enum PhotoBoothMessage<C: CameraBackend> {
    Setup(SetupMessage<C>),
    MainApp(MainAppMessage<C>),
    Find(FindMessage),
    Tick,
    KeyReleased(KeyMessage),
}

/// Run `update` on the current page and switch pages if it asked to.
macro_rules! update_page {
    ($self:ident, $page:ident, $update:expr, $wrap:path) => {{
        let update_task = $update.map($wrap);
        if let Some(new_page) = $page.new_page.take() {
            let (new_page, new_task) = *new_page;
            $self.page = new_page;
            update_task.chain(new_task)
        } else {
            update_task
        }
    }};
}

impl<C: CameraBackend, S: ServerBackend> PhotoBoothApplication<C, S> {
    fn update(&mut self, message: PhotoBoothMessage<C>) -> Task<PhotoBoothMessage<C>> {
        match message {
            PhotoBoothMessage::Setup(msg) => match &mut self.page {
                AppPage::Setup(page) => {
                    update_page!(self, page, page.update(msg), PhotoBoothMessage::Setup)
                }
                _ => Task::none(),
            },
            PhotoBoothMessage::MainApp(msg) => match &mut self.page {
                AppPage::MainApp(page) => {
                    update_page!(self, page, page.update(msg), PhotoBoothMessage::MainApp)
                }
                _ => Task::none(),
            },
            PhotoBoothMessage::Find(msg) => match &mut self.page {
                AppPage::Find(page) => {
                    update_page!(self, page, page.update(msg), PhotoBoothMessage::Find)
                }
                _ => Task::none(),
            },
            PhotoBoothMessage::Tick => match &mut self.page {
                AppPage::MainApp(page) => page
                    .update(MainAppMessage::Tick)
                    .map(PhotoBoothMessage::MainApp),
                _ => Task::none(),
            },
            PhotoBoothMessage::KeyReleased(key) => match &mut self.page {
                AppPage::MainApp(page) => update_page!(
                    self,
                    page,
                    page.update(MainAppMessage::KeyReleased(key)),
                    PhotoBoothMessage::MainApp
                ),
                AppPage::Find(page) => update_page!(
                    self,
                    page,
                    page.update(FindMessage::KeyReleased(key)),
                    PhotoBoothMessage::Find
                ),
                AppPage::Setup(_) => Task::none(),
            },
        }
    }

    fn view(&self) -> iced::Element<PhotoBoothMessage<C>> {
        match &self.page {
            AppPage::MainApp(page) => page.view().map(PhotoBoothMessage::MainApp),
            AppPage::Setup(page) => page.view().map(PhotoBoothMessage::Setup),
            AppPage::Find(page) => page.view().map(PhotoBoothMessage::Find),
        }
    }

    fn subscription(&self) -> iced::Subscription<PhotoBoothMessage<C>> {
        const FPS: f32 = 30.0;
        iced::Subscription::batch([
            iced::time::every(Duration::from_secs_f32(1.0 / FPS))
                .map(|_tick| PhotoBoothMessage::Tick),
            iced::keyboard::on_key_release(|key, _modifiers| {
                let key = match key.as_ref() {
                    Key::Named(Named::Space) => KeyMessage::Space,
                    Key::Named(Named::Escape) => KeyMessage::Escape,
                    Key::Character("r") => KeyMessage::Retake,
                    Key::Character("c") => KeyMessage::SwitchCamera,
                    _ => return None,
                };
                Some(PhotoBoothMessage::KeyReleased(key))
            }),
        ])
    }
}

fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match BoothConfig::load() {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            std::process::exit(2);
        }
    };

    let server = BoothServer::from_settings(&config.server).unwrap_or_else(|err| {
        log::error!("{err}; photos will only be kept in memory");
        BoothServer::Mock(MockBackend::new(config.server.max_upload_bytes))
    });

    if let Err(err) = DefaultCameraBackend::initialize() {
        log::error!("failed to initialize camera backend: {err}");
    }

    let font = config.caption_font();
    let context = BoothContext {
        config: Arc::new(config),
        server,
        font,
    };

    iced::application(
        "Photo Booth",
        PhotoBoothApplication::update,
        PhotoBoothApplication::view,
    )
    .subscription(PhotoBoothApplication::subscription)
    .theme(|_| iced::Theme::Dark)
    .run_with(move || {
        (
            PhotoBoothApplication::<DefaultCameraBackend, BoothServer> {
                page: AppPage::Setup(Setup::new(context)),
            },
            Task::none(),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use super::*;
    use crate::backend::cameras::test_pattern::TestPatternBackend;

    fn routable<M: Clone + Debug + Send + 'static>() {}

    #[test]
    fn messages_are_routable_for_every_camera_backend() {
        routable::<PhotoBoothMessage<DefaultCameraBackend>>();
        routable::<PhotoBoothMessage<TestPatternBackend>>();
        routable::<SetupMessage<DefaultCameraBackend>>();
        routable::<MainAppMessage<DefaultCameraBackend>>();
    }
}
