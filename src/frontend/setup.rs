use iced::{
    widget::{button, column, container, pick_list, row, text},
    Alignment, Element, Length, Task,
};

use crate::{
    backend::{
        cameras::{CameraBackend, CameraError},
        capture::{CaptureMode, CountdownDuration, Notice},
        render_take::LayoutKind,
        servers::ServerBackend,
    },
    config::ServerKind,
    AppPage, PhotoBoothMessage,
};

use super::{
    camera_feed::OpenedCamera,
    enter_fullscreen,
    find::Find,
    main_app::{BoothSettings, MainApp},
    open_camera,
    title_overlay::notice_banner,
    BoothContext,
};

#[derive(Debug, Clone)]
pub enum SetupMessage<C: CameraBackend> {
    CameraSelected(C::EnumeratedCamera),
    LayoutSelected(LayoutKind),
    ModeSelected(CaptureMode),
    CountdownSelected(CountdownDuration),
    RefreshCameras,
    StartPressed,
    CameraOpened(OpenedCamera<C>),
    FindPressed,
}

pub struct Setup<C: CameraBackend, S: ServerBackend> {
    context: BoothContext<S>,
    camera_options: Vec<C::EnumeratedCamera>,
    camera_option: Option<C::EnumeratedCamera>,
    settings: BoothSettings,
    opening: bool,
    error: Option<CameraError>,
    pub new_page: Option<Box<(AppPage<C, S>, Task<PhotoBoothMessage<C>>)>>,
}

impl<C: CameraBackend, S: ServerBackend> Setup<C, S> {
    pub fn new(context: BoothContext<S>) -> Self {
        let capture = &context.config.capture;
        let settings = BoothSettings {
            mode: capture.mode,
            layout: context.config.layout.kind,
            countdown: context.config.countdown(),
        };
        let mut setup = Self {
            context,
            camera_options: Vec::new(),
            camera_option: None,
            settings,
            opening: false,
            error: None,
            new_page: None,
        };
        setup.refresh_cameras();
        setup
    }

    fn refresh_cameras(&mut self) {
        match C::enumerate_cameras() {
            Ok(cameras) => {
                self.error = cameras
                    .is_empty()
                    .then(|| CameraError::DeviceNotFound("no cameras are connected".into()));
                if self
                    .camera_option
                    .as_ref()
                    .map_or(true, |selected| !cameras.contains(selected))
                {
                    self.camera_option = cameras.first().cloned();
                }
                self.camera_options = cameras;
            }
            Err(err) => {
                log::error!("could not list cameras: {err}");
                self.camera_options.clear();
                self.camera_option = None;
                self.error = Some(err);
            }
        }
    }

    pub fn update(&mut self, message: SetupMessage<C>) -> Task<SetupMessage<C>> {
        match message {
            SetupMessage::CameraSelected(new) => {
                self.camera_option = Some(new);
                Task::none()
            }
            SetupMessage::LayoutSelected(layout) => {
                self.settings.layout = layout;
                Task::none()
            }
            SetupMessage::ModeSelected(mode) => {
                self.settings.mode = mode;
                Task::none()
            }
            SetupMessage::CountdownSelected(countdown) => {
                self.settings.countdown = countdown;
                Task::none()
            }
            SetupMessage::RefreshCameras => {
                self.refresh_cameras();
                Task::none()
            }
            SetupMessage::StartPressed => {
                let Some(camera) = self.camera_option.clone() else {
                    return Task::none();
                };
                self.opening = true;
                self.error = None;
                Task::perform(open_camera::<C>(camera), SetupMessage::CameraOpened)
            }
            SetupMessage::CameraOpened(OpenedCamera(Ok(camera))) => {
                self.opening = false;
                let camera_index = self
                    .camera_option
                    .as_ref()
                    .and_then(|selected| self.camera_options.iter().position(|c| c == selected))
                    .unwrap_or(0);
                let (page, task) = MainApp::new(
                    self.context.clone(),
                    camera,
                    self.camera_options.clone(),
                    camera_index,
                    self.settings,
                );
                self.new_page = Some(Box::new((
                    AppPage::MainApp(page),
                    task.map(PhotoBoothMessage::MainApp),
                )));
                enter_fullscreen()
            }
            SetupMessage::CameraOpened(OpenedCamera(Err(err))) => {
                log::error!("could not open camera: {err}");
                self.opening = false;
                self.error = Some(err);
                Task::none()
            }
            SetupMessage::FindPressed => {
                self.new_page = Some(Box::new((
                    AppPage::Find(Find::new(self.context.clone())),
                    Task::none(),
                )));
                Task::none()
            }
        }
    }

    pub fn view(&self) -> Element<SetupMessage<C>> {
        let mut content = column([
            text("Photo Booth").size(32).into(),
            row([
                pick_list(
                    self.camera_options.as_slice(),
                    self.camera_option.as_ref(),
                    SetupMessage::CameraSelected,
                )
                .placeholder("No camera")
                .width(Length::Fill)
                .into(),
                button("Refresh").on_press(SetupMessage::RefreshCameras).into(),
            ])
            .spacing(8)
            .into(),
            labelled(
                "Layout",
                pick_list(LayoutKind::ALL, Some(self.settings.layout), SetupMessage::LayoutSelected),
            ),
            labelled(
                "Mode",
                pick_list(CaptureMode::ALL, Some(self.settings.mode), SetupMessage::ModeSelected),
            ),
            labelled(
                "Countdown",
                pick_list(
                    CountdownDuration::ALL,
                    Some(self.settings.countdown),
                    SetupMessage::CountdownSelected,
                ),
            ),
        ])
        .align_x(Alignment::Center)
        .spacing(12);

        if let Some(error) = &self.error {
            content = content.push(
                column([
                    text(error.to_string()).size(14).into(),
                    text(error.remediation()).size(14).into(),
                ])
                .spacing(4),
            );
        }

        content = content.push(
            row([
                button(if self.opening { "Opening camera…" } else { "Start" })
                    .on_press_maybe(
                        (self.camera_option.is_some() && !self.opening)
                            .then_some(SetupMessage::StartPressed),
                    )
                    .into(),
                button("Find a photo")
                    .style(button::secondary)
                    .on_press(SetupMessage::FindPressed)
                    .into(),
            ])
            .spacing(8),
        );

        let server = &self.context.config.server;
        if server.kind == ServerKind::Mock || server.url.is_none() || server.anon_key.is_none() {
            content = content.push(notice_banner(&Notice::Info(
                "No server is configured: photos are kept on this machine only.".into(),
            )));
        }

        container(
            container(content)
                .padding(16)
                .max_width(520)
                .style(container::rounded_box),
        )
        .center_x(Length::Fill)
        .center_y(Length::Fill)
        .into()
    }
}

fn labelled<'a, Message: 'a>(
    label: &'static str,
    control: impl Into<Element<'a, Message>>,
) -> Element<'a, Message> {
    row([text(label).width(120).into(), control.into()])
        .align_y(Alignment::Center)
        .spacing(8)
        .into()
}
