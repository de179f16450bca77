use std::{path::PathBuf, sync::Arc, time::Duration};

use anim::Animation;
use chrono::Local;
use iced::{
    widget::{
        button, column, container, image::Handle, pick_list, qr_code, row, stack, text,
        vertical_space, Column, Space,
    },
    Alignment, Border, Color, ContentFit, Element, Length, Task,
};
use image::{Rgba, RgbaImage};

use crate::{
    backend::{
        cameras::CameraBackend,
        capture::{
            CaptureMachine, CaptureMode, CapturePhase, CountdownDuration, Effect, Notice, Session,
            Timer, Trigger,
        },
        export::{generate_filename, save_bytes},
        imaging::filters::PhotoFilter,
        live_clip::{encode_clip, negotiate, AvailableEncoders, ClipBlob, ClipRequest, ClipSource},
        pipeline::{finish_shot, load_overlay, render_composite, ShotOptions},
        render_take::{CompositeImage, LayoutKind, LayoutOptions, SHOT_COUNT},
        servers::{
            share_link, ClipUpload, EncodedPhoto, ServerBackend, ServerError, UploadReceipt,
        },
    },
    AppPage, KeyMessage, PhotoBoothMessage,
};

use super::{
    camera_feed::{CameraFeed, CameraFeedOptions, CameraMessage, OpenedCamera, SharedCamera},
    leave_fullscreen, open_camera,
    setup::Setup,
    title_overlay::{camera_off, notice_banner, supporting_text, title_overlay, title_text},
    BoothContext,
};

mod animations;

const THUMBNAIL_WIDTH: u32 = 240;
const PANEL_WIDTH: f32 = 272.0;

/// Choices carried over from the setup page.
#[derive(Debug, Clone, Copy)]
pub struct BoothSettings {
    pub mode: CaptureMode,
    pub layout: LayoutKind,
    pub countdown: CountdownDuration,
}

/// An entry of the frame picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayChoice {
    id: Option<String>,
    name: String,
}

impl std::fmt::Display for OverlayChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

enum UploadState {
    Idle,
    Uploading,
    Uploaded {
        link: String,
        code: String,
        qr: Option<qr_code::Data>,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClipStatus {
    Off,
    Encoding,
    Encoded,
    Attaching,
    Attached,
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum MainAppMessage<C: CameraBackend> {
    Camera(CameraMessage),
    Tick,
    KeyReleased(KeyMessage),
    Trigger(Trigger),
    ModeSelected(CaptureMode),
    OverlaySelected(OverlayChoice),
    SwitchCamera,
    CameraOpened(OpenedCamera<C>),
    /// Results below carry the take they belong to; late ones are dropped.
    Uploaded {
        take: u64,
        result: Result<UploadReceipt, ServerError>,
    },
    RetryUpload,
    ClipEncoded {
        take: u64,
        result: Result<ClipBlob, String>,
    },
    ClipAttached {
        take: u64,
        result: Result<String, ServerError>,
    },
    Save,
    Saved(Result<Vec<PathBuf>, String>),
    Exit,
}

/// The booth itself: a projection of the [`CaptureMachine`] over the live
/// camera feed.
pub struct MainApp<C: CameraBackend, S: ServerBackend> {
    context: BoothContext<S>,
    feed: CameraFeed<C::Camera>,
    cameras: Vec<C::EnumeratedCamera>,
    camera_index: usize,
    switching_camera: bool,
    machine: CaptureMachine,
    mode: CaptureMode,
    overlays: Vec<OverlayChoice>,
    thumbnails: Vec<Handle>,
    review: Option<Handle>,
    composite: Option<Handle>,
    countdown_timeline: Option<anim::Timeline<animations::countdown_circle::AnimationState>>,
    flash_timeline: Option<anim::Timeline<animations::capture_flash::AnimationState>>,
    notice: Option<Notice>,
    take: u64,
    upload: UploadState,
    receipt: Option<UploadReceipt>,
    clip: Option<ClipBlob>,
    clip_status: ClipStatus,
    pub new_page: Option<Box<(AppPage<C, S>, Task<PhotoBoothMessage<C>>)>>,
}

impl<C: CameraBackend, S: ServerBackend> MainApp<C, S> {
    pub fn new(
        context: BoothContext<S>,
        camera: SharedCamera<C::Camera>,
        cameras: Vec<C::EnumeratedCamera>,
        camera_index: usize,
        settings: BoothSettings,
    ) -> (Self, Task<MainAppMessage<C>>) {
        let config = context.config.clone();
        let (feed, task) = CameraFeed::new(
            camera,
            CameraFeedOptions {
                mirror: config.capture.mirror,
                motion_frames: if config.clip.enabled {
                    config.capture.motion_buffer_frames
                } else {
                    0
                },
                motion_size: (config.clip.cell_width, config.clip.cell_height),
            },
        );

        let mut session = Session::new(settings.layout, config.background());
        session.mode = settings.mode;
        session.filter = config.layout.filter;
        let machine = CaptureMachine::new(session, settings.countdown, config.advance_pause());

        let overlays = std::iter::once(OverlayChoice {
            id: None,
            name: "No frame".into(),
        })
        .chain(config.frames.iter().map(|frame| OverlayChoice {
            id: Some(frame.id.clone()),
            name: frame.name.clone(),
        }))
        .collect();

        (
            Self {
                context,
                feed,
                cameras,
                camera_index,
                switching_camera: false,
                machine,
                mode: settings.mode,
                overlays,
                thumbnails: Vec::with_capacity(SHOT_COUNT),
                review: None,
                composite: None,
                countdown_timeline: None,
                flash_timeline: None,
                notice: None,
                take: 0,
                upload: UploadState::Idle,
                receipt: None,
                clip: None,
                clip_status: ClipStatus::Off,
                new_page: None,
            },
            task.map(MainAppMessage::Camera),
        )
    }

    pub fn update(&mut self, message: MainAppMessage<C>) -> Task<MainAppMessage<C>> {
        match message {
            MainAppMessage::Camera(msg) => self.feed.update(msg).map(MainAppMessage::Camera),
            MainAppMessage::Tick => {
                // the countdown timeline is replaced on every tick of the timer
                if let Some(timeline) = &mut self.countdown_timeline {
                    timeline.update();
                }
                if let Some(timeline) = &mut self.flash_timeline {
                    if timeline.update().is_completed() {
                        self.flash_timeline = None;
                    }
                }
                Task::none()
            }
            MainAppMessage::KeyReleased(key) => self.key_released(key),
            MainAppMessage::Trigger(trigger) => self.fire(trigger),
            MainAppMessage::ModeSelected(mode) => {
                self.mode = mode;
                Task::none()
            }
            MainAppMessage::OverlaySelected(choice) => self.fire(Trigger::SelectOverlay(choice.id)),
            MainAppMessage::SwitchCamera => {
                if self.cameras.len() < 2
                    || self.switching_camera
                    || matches!(self.machine.phase(), CapturePhase::Capturing { .. })
                {
                    return Task::none();
                }
                self.switching_camera = true;
                self.camera_index = (self.camera_index + 1) % self.cameras.len();
                self.feed.detach();
                let next = self.cameras[self.camera_index].clone();
                log::info!("switching to camera {next}");
                Task::perform(open_camera::<C>(next), MainAppMessage::CameraOpened)
            }
            MainAppMessage::CameraOpened(OpenedCamera(result)) => {
                self.switching_camera = false;
                match result {
                    Ok(camera) => self.feed.attach(camera).map(MainAppMessage::Camera),
                    Err(err) => {
                        log::error!("could not open camera: {err}");
                        self.notice = Some(Notice::Error(format!("{err}. {}", err.remediation())));
                        Task::none()
                    }
                }
            }
            MainAppMessage::Uploaded { take, result } if take == self.take => match result {
                Ok(receipt) => {
                    let link = share_link(&self.context.config.server.public_base_url, &receipt.code);
                    let qr = qr_code::Data::new(&link)
                        .map_err(|err| log::warn!("could not make a QR code for {link}: {err}"))
                        .ok();
                    self.upload = UploadState::Uploaded {
                        link,
                        code: receipt.code.to_string(),
                        qr,
                    };
                    self.receipt = Some(receipt);
                    self.attach_clip()
                }
                Err(err) => {
                    log::error!("upload failed: {err}");
                    self.upload = UploadState::Failed(err.to_string());
                    Task::none()
                }
            },
            MainAppMessage::RetryUpload => {
                let composite = match (&self.upload, self.machine.composite()) {
                    (UploadState::Failed(_), Some(composite)) => composite.clone(),
                    _ => return Task::none(),
                };
                log::info!("retrying upload");
                self.upload_composite(&composite)
            }
            MainAppMessage::ClipEncoded { take, result } if take == self.take => match result {
                Ok(blob) => {
                    log::info!(
                        "live clip ready: {} frames of {}, {} KiB",
                        blob.frame_count,
                        blob.codec,
                        blob.bytes.len() / 1024
                    );
                    self.clip = Some(blob);
                    self.clip_status = ClipStatus::Encoded;
                    self.attach_clip()
                }
                Err(err) => {
                    log::warn!("live clip failed: {err}");
                    self.clip_status = ClipStatus::Failed(err);
                    Task::none()
                }
            },
            MainAppMessage::ClipAttached { take, result } if take == self.take => {
                match result {
                    Ok(url) => {
                        log::info!("live clip uploaded to {url}");
                        self.clip_status = ClipStatus::Attached;
                    }
                    Err(err) => {
                        log::warn!("live clip upload failed: {err}");
                        self.clip_status = ClipStatus::Failed(err.to_string());
                    }
                }
                Task::none()
            }
            MainAppMessage::Uploaded { .. }
            | MainAppMessage::ClipEncoded { .. }
            | MainAppMessage::ClipAttached { .. } => {
                log::debug!("dropping a result from an earlier take");
                Task::none()
            }
            MainAppMessage::Save => {
                let Some(composite) = self.machine.composite() else {
                    return Task::none();
                };
                let photo = composite.encoded.clone();
                let clip = self.clip.clone();
                let dir = self.context.config.output.save_dir.clone();
                let now = Local::now();
                Task::perform(
                    async move {
                        let name = generate_filename("photobooth", "jpg", now);
                        let mut saved = vec![save_bytes(&dir, &name, &photo).await?];
                        if let Some(clip) = clip {
                            let name = generate_filename("photobooth", clip.codec.extension(), now);
                            saved.push(save_bytes(&dir, &name, &clip.bytes).await?);
                        }
                        Ok::<_, std::io::Error>(saved)
                    },
                    |result| MainAppMessage::Saved(result.map_err(|err| err.to_string())),
                )
            }
            MainAppMessage::Saved(result) => {
                self.notice = Some(match result {
                    Ok(paths) => Notice::Info(format!(
                        "Saved {}",
                        paths
                            .iter()
                            .map(|path| path.display().to_string())
                            .collect::<Vec<_>>()
                            .join(" and ")
                    )),
                    Err(err) => Notice::Error(format!("Couldn't save: {err}")),
                });
                Task::none()
            }
            MainAppMessage::Exit => {
                if !matches!(self.machine.phase(), CapturePhase::Idle | CapturePhase::Done) {
                    return Task::none();
                }
                self.feed.detach();
                self.new_page = Some(Box::new((
                    AppPage::Setup(Setup::new(self.context.clone())),
                    Task::none(),
                )));
                leave_fullscreen()
            }
        }
    }

    fn key_released(&mut self, key: KeyMessage) -> Task<MainAppMessage<C>> {
        let phase = self.machine.phase();
        let auto = self.machine.session().mode == CaptureMode::Auto;
        match (key, phase) {
            (KeyMessage::Space, CapturePhase::Idle | CapturePhase::Done) => {
                self.fire(Trigger::Start(self.mode))
            }
            (KeyMessage::Space, CapturePhase::Ready { .. }) => self.fire(Trigger::Shutter),
            (KeyMessage::Space, CapturePhase::Review { .. }) => self.fire(Trigger::Proceed),
            (KeyMessage::Retake, CapturePhase::Review { .. }) => self.fire(Trigger::Retake),
            (KeyMessage::Escape, CapturePhase::Ready { .. } | CapturePhase::Countdown { .. })
                if auto =>
            {
                self.fire(Trigger::Cancel)
            }
            (KeyMessage::Escape, CapturePhase::Idle | CapturePhase::Done) => {
                self.update(MainAppMessage::Exit)
            }
            (KeyMessage::Escape, _) => self.fire(Trigger::RetakeAll),
            (KeyMessage::SwitchCamera, _) => self.update(MainAppMessage::SwitchCamera),
            _ => Task::none(),
        }
    }

    /// Feed a trigger to the machine and run whatever it asks for.
    fn fire(&mut self, trigger: Trigger) -> Task<MainAppMessage<C>> {
        let starting = matches!(trigger, Trigger::Start(_));
        let effects = match self.machine.handle(trigger) {
            Ok(effects) => effects,
            Err(err) => {
                log::debug!("ignored: {err}");
                return Task::none();
            }
        };
        if starting {
            self.reset_take();
        }
        self.sync_previews();
        let tasks: Vec<_> = effects
            .into_iter()
            .map(|effect| self.run_effect(effect))
            .collect();
        Task::batch(tasks)
    }

    fn reset_take(&mut self) {
        self.take += 1;
        self.notice = None;
        self.composite = None;
        self.upload = UploadState::Idle;
        self.receipt = None;
        self.clip = None;
        self.clip_status = ClipStatus::Off;
    }

    /// Keep the shot thumbnails in step with the session.
    fn sync_previews(&mut self) {
        let shots = &self.machine.session().shots;
        self.thumbnails.truncate(shots.len());
        for shot in &shots[self.thumbnails.len()..] {
            self.thumbnails.push(thumbnail(&shot.pixels));
        }
        self.review = self.machine.pending().map(|frame| thumbnail(&frame.pixels));
        if !matches!(self.machine.phase(), CapturePhase::Countdown { .. }) {
            self.countdown_timeline = None;
        }
    }

    fn run_effect(&mut self, effect: Effect) -> Task<MainAppMessage<C>> {
        match effect {
            Effect::StartTimer {
                epoch,
                timer,
                delay,
            } => {
                if timer == Timer::CountdownTick {
                    self.countdown_timeline =
                        Some(animations::countdown_circle::animation().begin_animation());
                }
                Task::perform(tokio::time::sleep(delay), move |_| {
                    MainAppMessage::Trigger(Trigger::TimerElapsed { epoch, timer })
                })
            }
            Effect::CaptureStill { index } => {
                log::debug!("capturing shot {}", index + 1);
                self.flash_timeline = Some(animations::capture_flash::animation().begin_animation());
                let capture = self.feed.capture_still();
                let options = ShotOptions {
                    target: self.context.config.normalize_target(),
                    mirror: self.context.config.capture.mirror,
                };
                Task::perform(
                    async move {
                        let (raw, motion) = capture.await.map_err(|err| err.to_string())?;
                        let shot = tokio::task::spawn_blocking(move || finish_shot(raw, options))
                            .await
                            .map_err(|err| err.to_string())?
                            .map_err(|err| err.to_string())?;
                        Ok::<_, String>((shot, motion))
                    },
                    |result| {
                        MainAppMessage::Trigger(match result {
                            Ok((shot, motion)) => Trigger::CaptureSucceeded {
                                pixels: Arc::new(shot),
                                motion,
                            },
                            Err(message) => Trigger::CaptureFailed(message),
                        })
                    },
                )
            }
            Effect::Compose(request) => {
                let config = self.context.config.clone();
                let options = config.layout_options(self.context.font.clone(), Local::now().date_naive());
                Task::perform(
                    async move {
                        tokio::task::spawn_blocking(move || {
                            render_composite(
                                &request,
                                &config.frames,
                                &options,
                                config.output.jpeg_quality,
                            )
                        })
                        .await
                        .map_err(|err| err.to_string())?
                        .map_err(|err| err.to_string())
                    },
                    |result| {
                        MainAppMessage::Trigger(match result {
                            Ok(composite) => Trigger::CompositeReady(Arc::new(composite)),
                            Err(message) => Trigger::CompositeFailed(message),
                        })
                    },
                )
            }
            Effect::Publish(composite) => {
                self.composite = Some(Handle::from_bytes(composite.encoded.clone()));
                let upload = self.upload_composite(&composite);
                let clip = if self.context.config.clip.enabled {
                    self.encode_clip()
                } else {
                    Task::none()
                };
                Task::batch([upload, clip])
            }
            Effect::Notify(notice) => {
                self.notice = Some(notice);
                Task::none()
            }
        }
    }

    fn upload_composite(&mut self, composite: &CompositeImage) -> Task<MainAppMessage<C>> {
        self.upload = UploadState::Uploading;
        let take = self.take;
        Task::perform(
            self.context
                .server
                .clone()
                .upload_composite(EncodedPhoto::from(composite)),
            move |result| MainAppMessage::Uploaded { take, result },
        )
    }

    fn encode_clip(&mut self) -> Task<MainAppMessage<C>> {
        let config = self.context.config.clone();
        let session = self.machine.session();
        let sources: Vec<ClipSource> = session
            .shots
            .iter()
            .map(|shot| ClipSource {
                still: shot.pixels.clone(),
                motion: shot.motion.clone(),
            })
            .collect();
        let options = LayoutOptions {
            background: session.background,
            ..config.clip_layout_options(self.context.font.clone(), Local::now().date_naive())
        };
        let layout = session.layout;
        let filter = session.filter;
        let overlay_id = session.overlay.clone();
        let take = self.take;
        self.clip_status = ClipStatus::Encoding;

        Task::perform(
            async move {
                let frames = config.frames.clone();
                let overlay = tokio::task::spawn_blocking(move || load_overlay(overlay_id.as_deref(), &frames))
                    .await
                    .map_err(|err| err.to_string())?;
                let codec = negotiate(&config.clip.codecs, &AvailableEncoders::probe().await)
                    .map_err(|err| err.to_string())?;
                let request = ClipRequest {
                    sources,
                    layout,
                    options,
                    overlay,
                    filter,
                    duration: Duration::from_secs(config.clip.duration_secs),
                    fps: config.clip.fps,
                    source_fps: config.clip.source_fps,
                };
                encode_clip(request, codec).await.map_err(|err| err.to_string())
            },
            move |result| MainAppMessage::ClipEncoded { take, result },
        )
    }

    /// Upload the clip once both it and the photo row exist.
    fn attach_clip(&mut self) -> Task<MainAppMessage<C>> {
        let (Some(receipt), Some(clip), ClipStatus::Encoded) =
            (&self.receipt, &self.clip, &self.clip_status)
        else {
            return Task::none();
        };
        let upload = ClipUpload {
            bytes: clip.bytes.clone(),
            content_type: clip.codec.mime_type(),
            extension: clip.codec.extension(),
        };
        let task = self
            .context
            .server
            .clone()
            .attach_clip(receipt.id.clone(), upload);
        let take = self.take;
        self.clip_status = ClipStatus::Attaching;
        Task::perform(task, move |result| MainAppMessage::ClipAttached { take, result })
    }

    pub fn view(&self) -> Element<MainAppMessage<C>> {
        let phase = self.machine.phase();
        let feed: Element<_> = match self.feed.handle() {
            Some(handle) => iced::widget::image(handle)
                .content_fit(ContentFit::Cover)
                .width(Length::Fill)
                .height(Length::Fill)
                .into(),
            None => camera_off(
                self.feed
                    .error()
                    .map(|err| format!("{err}. {}", err.remediation())),
            ),
        };

        let mut layers = vec![feed, self.phase_view(phase)];
        if let Some(timeline) = &self.flash_timeline {
            layers.push(animations::capture_flash::view(timeline.value()).into());
        }
        if let Some(notice) = &self.notice {
            layers.push(
                container(notice_banner(notice))
                    .padding(16)
                    .center_x(Length::Fill)
                    .into(),
            );
        }

        row([
            stack(layers).width(Length::Fill).height(Length::Fill).into(),
            self.side_panel(phase),
        ])
        .into()
    }

    fn phase_view(&self, phase: CapturePhase) -> Element<MainAppMessage<C>> {
        let auto = self.machine.session().mode == CaptureMode::Auto;
        match phase {
            CapturePhase::Idle => title_overlay(
                column([
                    title_text("Press space to start").into(),
                    supporting_text(format!(
                        "{} · {} · {} countdown",
                        self.mode,
                        self.machine.session().layout,
                        self.machine.countdown()
                    ))
                    .into(),
                ])
                .spacing(8),
                true,
            ),
            CapturePhase::Ready { index } => title_overlay(
                column([
                    title_text(format!("Photo {} of {SHOT_COUNT}", index + 1)).into(),
                    supporting_text(if auto {
                        "Get ready… press space to go now"
                    } else {
                        "Press space to take the photo"
                    })
                    .into(),
                ])
                .spacing(8),
                true,
            ),
            CapturePhase::Countdown { index, remaining } => match &self.countdown_timeline {
                Some(timeline) => animations::countdown_circle::view(
                    remaining,
                    index,
                    SHOT_COUNT,
                    timeline.value(),
                )
                .into(),
                None => Space::new(Length::Fill, Length::Fill).into(),
            },
            CapturePhase::Capturing { .. } => Space::new(Length::Fill, Length::Fill).into(),
            CapturePhase::Review { index } => title_overlay(
                column([
                    match &self.review {
                        Some(handle) => iced::widget::image(handle.clone())
                            .content_fit(ContentFit::Contain)
                            .height(Length::Fill)
                            .into(),
                        None => Space::new(0, 0).into(),
                    },
                    title_text(format!("Keep photo {} of {SHOT_COUNT}?", index + 1)).into(),
                    row([
                        button("Keep (space)")
                            .on_press(MainAppMessage::Trigger(Trigger::Proceed))
                            .into(),
                        button("Retake (R)")
                            .style(button::secondary)
                            .on_press(MainAppMessage::Trigger(Trigger::Retake))
                            .into(),
                    ])
                    .spacing(12)
                    .into(),
                ])
                .spacing(12)
                .align_x(Alignment::Center),
                false,
            ),
            CapturePhase::Composing => title_overlay(
                column([
                    title_text("Putting your photos together…").into(),
                    supporting_text("This only takes a moment.").into(),
                ])
                .spacing(8),
                false,
            ),
            CapturePhase::Done => title_overlay(self.done_view(), false),
        }
    }

    fn done_view(&self) -> Element<MainAppMessage<C>> {
        let composite: Element<_> = match &self.composite {
            Some(handle) => iced::widget::image(handle.clone())
                .content_fit(ContentFit::Contain)
                .height(Length::Fill)
                .into(),
            None => Space::new(0, 0).into(),
        };

        let share: Element<_> = match &self.upload {
            UploadState::Idle | UploadState::Uploading => column([
                title_text("Uploading…").into(),
                supporting_text("Your code will appear here.").into(),
            ])
            .spacing(8)
            .into(),
            UploadState::Uploaded { link, code, qr } => {
                let mut share = Column::new().spacing(8).align_x(Alignment::Center);
                if let Some(qr) = qr {
                    share = share.push(qr_code(qr).cell_size(6));
                }
                share
                    .push(title_text(code.clone()))
                    .push(supporting_text(link.clone()))
                    .into()
            }
            UploadState::Failed(err) => column([
                title_text("Upload failed").into(),
                supporting_text(err.clone()).into(),
                button("Try again")
                    .on_press(MainAppMessage::RetryUpload)
                    .into(),
            ])
            .spacing(8)
            .align_x(Alignment::Center)
            .into(),
        };

        let clip_line = match &self.clip_status {
            ClipStatus::Off => None,
            ClipStatus::Encoding => Some("Recording your live clip…".to_owned()),
            ClipStatus::Encoded | ClipStatus::Attaching => Some("Uploading your live clip…".to_owned()),
            ClipStatus::Attached => Some("Live clip added to your photo".to_owned()),
            ClipStatus::Failed(err) => Some(format!("No live clip this time: {err}")),
        };

        let mut info = column([share]).spacing(16).align_x(Alignment::Center).width(Length::Fill);
        if let Some(line) = clip_line {
            info = info.push(supporting_text(line));
        }
        info = info.push(
            row([
                button("Save").on_press(MainAppMessage::Save).into(),
                button("New session (space)")
                    .on_press(MainAppMessage::Trigger(Trigger::Start(self.mode)))
                    .into(),
            ])
            .spacing(12),
        );

        row([composite, info.into()])
            .spacing(24)
            .align_y(Alignment::Center)
            .into()
    }

    fn side_panel(&self, phase: CapturePhase) -> Element<MainAppMessage<C>> {
        let session = self.machine.session();
        let idle = matches!(phase, CapturePhase::Idle | CapturePhase::Done);
        let busy = matches!(phase, CapturePhase::Capturing { .. } | CapturePhase::Composing);

        let mut panel = column([text("Your photos").size(20).into()])
            .spacing(12)
            .padding(16)
            .width(PANEL_WIDTH);

        for index in 0..SHOT_COUNT {
            panel = panel.push(match self.thumbnails.get(index) {
                Some(handle) => Element::from(
                    iced::widget::image(handle.clone())
                        .width(Length::Fill)
                        .content_fit(ContentFit::Contain),
                ),
                None => container(text(format!("{}", index + 1)).size(24))
                    .center_x(Length::Fill)
                    .height(PANEL_WIDTH * 0.5)
                    .style(container::rounded_box)
                    .into(),
            });
        }
        panel = panel.push(vertical_space());

        let selected_overlay = self
            .overlays
            .iter()
            .find(|choice| choice.id == session.overlay);
        panel = panel
            .push(text("Frame").size(14))
            .push(
                pick_list(
                    self.overlays.as_slice(),
                    selected_overlay,
                    MainAppMessage::OverlaySelected,
                )
                .width(Length::Fill),
            )
            .push(text("Filter").size(14))
            .push(
                pick_list(PhotoFilter::ALL, Some(session.filter), |filter| {
                    MainAppMessage::Trigger(Trigger::SelectFilter(filter))
                })
                .width(Length::Fill),
            )
            .push(text("Background").size(14))
            .push(
                row(self.context.config.background_palette().into_iter().map(|color| {
                    Element::from(swatch::<C>(color, color == session.background, !busy))
                }))
                .spacing(8),
            );

        if idle {
            panel = panel
                .push(text("Layout").size(14))
                .push(
                    pick_list(LayoutKind::ALL, Some(session.layout), |layout| {
                        MainAppMessage::Trigger(Trigger::SelectLayout(layout))
                    })
                    .width(Length::Fill),
                )
                .push(
                    row([
                        pick_list(CaptureMode::ALL, Some(self.mode), MainAppMessage::ModeSelected)
                            .into(),
                        pick_list(
                            CountdownDuration::ALL,
                            Some(self.machine.countdown()),
                            |countdown| MainAppMessage::Trigger(Trigger::SetCountdown(countdown)),
                        )
                        .into(),
                    ])
                    .spacing(8),
                );
        }

        panel = panel.push(self.controls(phase));
        if self.cameras.len() > 1 {
            panel = panel.push(
                button("Switch camera (C)")
                    .style(button::secondary)
                    .width(Length::Fill)
                    .on_press_maybe(
                        (!self.switching_camera && !busy).then_some(MainAppMessage::SwitchCamera),
                    ),
            );
        }
        if idle {
            panel = panel.push(
                button("Exit (Esc)")
                    .style(button::text)
                    .on_press(MainAppMessage::Exit),
            );
        }
        panel.into()
    }

    /// The buttons mirroring the keyboard triggers for the current phase.
    fn controls(&self, phase: CapturePhase) -> Element<MainAppMessage<C>> {
        let auto = self.machine.session().mode == CaptureMode::Auto;
        let action = |label: &'static str, trigger: Trigger| {
            button(label)
                .width(Length::Fill)
                .on_press(MainAppMessage::Trigger(trigger))
        };
        let buttons: Vec<Element<_>> = match phase {
            CapturePhase::Idle => vec![action("Start", Trigger::Start(self.mode)).into()],
            CapturePhase::Ready { .. } if auto => vec![
                action("Go now", Trigger::Shutter).into(),
                action("Cancel", Trigger::Cancel)
                    .style(button::secondary)
                    .into(),
            ],
            CapturePhase::Countdown { .. } if auto => vec![action("Cancel", Trigger::Cancel)
                .style(button::secondary)
                .into()],
            CapturePhase::Ready { .. } => vec![
                action("Take photo", Trigger::Shutter).into(),
                action("Start over", Trigger::RetakeAll)
                    .style(button::secondary)
                    .into(),
            ],
            CapturePhase::Review { .. } => vec![action("Start over", Trigger::RetakeAll)
                .style(button::secondary)
                .into()],
            CapturePhase::Countdown { .. }
            | CapturePhase::Capturing { .. }
            | CapturePhase::Composing
            | CapturePhase::Done => vec![],
        };
        column(buttons).spacing(8).into()
    }
}

fn shrink(shot: &RgbaImage) -> RgbaImage {
    let height = (shot.height() * THUMBNAIL_WIDTH / shot.width().max(1)).max(1);
    image::imageops::thumbnail(shot, THUMBNAIL_WIDTH, height)
}

fn thumbnail(shot: &RgbaImage) -> Handle {
    let small = shrink(shot);
    Handle::from_rgba(small.width(), small.height(), small.into_raw())
}

fn swatch<'a, C: CameraBackend>(
    color: Rgba<u8>,
    selected: bool,
    enabled: bool,
) -> iced::widget::Button<'a, MainAppMessage<C>> {
    let [r, g, b, a] = color.0;
    let fill = Color::from_rgba8(r, g, b, a as f32 / 255.0);
    button(Space::new(24, 24))
        .style(move |theme: &iced::Theme, _status| button::Style {
            background: Some(fill.into()),
            border: Border {
                color: if selected {
                    theme.extended_palette().primary.strong.color
                } else {
                    theme.extended_palette().background.strong.color
                },
                width: if selected { 3.0 } else { 1.0 },
                radius: 9999.0.into(),
            },
            ..Default::default()
        })
        .padding(0)
        .on_press_maybe(enabled.then_some(MainAppMessage::Trigger(Trigger::SelectBackground(color))))
}
