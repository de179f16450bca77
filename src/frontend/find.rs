use std::path::PathBuf;

use bytes::Bytes;
use chrono::Local;
use iced::{
    widget::{button, column, container, image::Handle, row, text, text_input},
    Alignment, ContentFit, Element, Length, Task,
};

use crate::{
    backend::{
        cameras::CameraBackend,
        capture::Notice,
        export::{generate_filename, save_bytes},
        servers::{PhotoRecord, ServerBackend, ServerError, ShortCode, CODE_LENGTH},
    },
    AppPage, KeyMessage, PhotoBoothMessage,
};

use super::{setup::Setup, title_overlay::notice_banner, BoothContext};

#[derive(Debug, Clone)]
pub enum FindMessage {
    CodeChanged(String),
    Submit,
    /// Lookup results carry the search they answer; late ones are dropped.
    Found {
        search: u64,
        result: Result<PhotoRecord, ServerError>,
    },
    Downloaded {
        search: u64,
        result: Result<Bytes, ServerError>,
    },
    Save,
    Saved(Result<PathBuf, String>),
    KeyReleased(KeyMessage),
    Back,
}

enum FindState {
    Idle,
    Searching,
    Found {
        record: PhotoRecord,
        photo: Option<(Bytes, Handle)>,
    },
}

/// Look up a finished photo by the code printed under its QR.
pub struct Find<C: CameraBackend, S: ServerBackend> {
    context: BoothContext<S>,
    code: String,
    state: FindState,
    search: u64,
    notice: Option<Notice>,
    pub new_page: Option<Box<(AppPage<C, S>, Task<PhotoBoothMessage<C>>)>>,
}

impl<C: CameraBackend, S: ServerBackend> Find<C, S> {
    pub fn new(context: BoothContext<S>) -> Self {
        Self {
            context,
            code: String::new(),
            state: FindState::Idle,
            search: 0,
            notice: None,
            new_page: None,
        }
    }

    pub fn update(&mut self, message: FindMessage) -> Task<FindMessage> {
        match message {
            FindMessage::CodeChanged(code) => {
                // letters and digits only, never more than a code's worth
                self.code = code
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .take(CODE_LENGTH)
                    .collect::<String>()
                    .to_ascii_uppercase();
                Task::none()
            }
            FindMessage::Submit => {
                if matches!(self.state, FindState::Searching) {
                    return Task::none();
                }
                let code = match ShortCode::parse(&self.code) {
                    Ok(code) => code,
                    Err(err) => {
                        self.notice = Some(Notice::Error(err.to_string()));
                        return Task::none();
                    }
                };
                log::info!("looking up {code}");
                self.notice = None;
                self.state = FindState::Searching;
                self.search += 1;
                let search = self.search;
                Task::perform(
                    self.context.server.clone().find_by_code(code),
                    move |result| FindMessage::Found { search, result },
                )
            }
            FindMessage::Found { search, result } if search == self.search => match result {
                Ok(record) => {
                    let download = self.context.server.clone().download(record.file_url.clone());
                    self.state = FindState::Found {
                        record,
                        photo: None,
                    };
                    Task::perform(download, move |result| FindMessage::Downloaded { search, result })
                }
                Err(err) => {
                    log::warn!("lookup failed: {err}");
                    self.state = FindState::Idle;
                    self.notice = Some(Notice::Error(err.to_string()));
                    Task::none()
                }
            },
            FindMessage::Downloaded { search, result } if search == self.search => {
                if let FindState::Found { photo, .. } = &mut self.state {
                    match result {
                        Ok(bytes) => *photo = Some((bytes.clone(), Handle::from_bytes(bytes))),
                        Err(err) => {
                            log::warn!("download failed: {err}");
                            self.notice = Some(Notice::Error(err.to_string()));
                        }
                    }
                }
                Task::none()
            }
            FindMessage::Found { .. } | FindMessage::Downloaded { .. } => {
                log::debug!("dropping a result from an earlier search");
                Task::none()
            }
            FindMessage::Save => {
                let FindState::Found {
                    photo: Some((bytes, _)),
                    ..
                } = &self.state
                else {
                    return Task::none();
                };
                let bytes = bytes.clone();
                let dir = self.context.config.output.save_dir.clone();
                let name = generate_filename("photobooth", "jpg", Local::now());
                Task::perform(
                    async move { save_bytes(&dir, &name, &bytes).await },
                    |result| FindMessage::Saved(result.map_err(|err| err.to_string())),
                )
            }
            FindMessage::Saved(result) => {
                self.notice = Some(match result {
                    Ok(path) => Notice::Info(format!("Saved to {}", path.display())),
                    Err(err) => Notice::Error(format!("Couldn't save the photo: {err}")),
                });
                Task::none()
            }
            FindMessage::KeyReleased(KeyMessage::Escape) | FindMessage::Back => {
                self.new_page = Some(Box::new((
                    AppPage::Setup(Setup::new(self.context.clone())),
                    Task::none(),
                )));
                Task::none()
            }
            FindMessage::KeyReleased(_) => Task::none(),
        }
    }

    pub fn view(&self) -> Element<FindMessage> {
        let searching = matches!(self.state, FindState::Searching);
        let mut content = column([
            text("Find your photo").size(32).into(),
            text(format!("Enter the {CODE_LENGTH}-character code from the booth."))
                .size(16)
                .into(),
            row([
                text_input("A3K9B2", &self.code)
                    .on_input(FindMessage::CodeChanged)
                    .on_submit(FindMessage::Submit)
                    .size(24)
                    .width(220)
                    .into(),
                button(if searching { "Searching…" } else { "Find" })
                    .on_press_maybe(
                        (!searching && self.code.len() == CODE_LENGTH).then_some(FindMessage::Submit),
                    )
                    .into(),
                button("Back")
                    .style(button::secondary)
                    .on_press(FindMessage::Back)
                    .into(),
            ])
            .spacing(8)
            .align_y(Alignment::Center)
            .into(),
        ])
        .spacing(12)
        .align_x(Alignment::Center);

        if let Some(notice) = &self.notice {
            content = content.push(notice_banner(notice));
        }

        if let FindState::Found { record, photo } = &self.state {
            content = content.push(match photo {
                Some((_, handle)) => Element::from(
                    iced::widget::image(handle.clone())
                        .content_fit(ContentFit::Contain)
                        .height(Length::Fill),
                ),
                None => text("Downloading…").into(),
            });
            let mut details = column([text(format!(
                "{}×{} · taken {} · viewed {} time(s)",
                record.width,
                record.height,
                record.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                record.download_count
            ))
            .size(14)
            .into()]);
            if let Some(expires_at) = record.expires_at {
                details = details.push(
                    text(format!(
                        "Available until {}",
                        expires_at.with_timezone(&Local).format("%Y-%m-%d")
                    ))
                    .size(14),
                );
            }
            for url in record.video_urls.iter().flatten() {
                details = details.push(text(format!("Live clip: {url}")).size(14));
            }
            content = content.push(details.spacing(4).align_x(Alignment::Center));
            content = content.push(
                button("Save to this computer")
                    .on_press_maybe(photo.is_some().then_some(FindMessage::Save)),
            );
        }

        container(content.padding(24).height(Length::Fill))
            .center_x(Length::Fill)
            .into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::{
        backend::{cameras::test_pattern::TestPatternBackend, servers::mock::MockBackend},
        config::BoothConfig,
    };

    fn page() -> Find<TestPatternBackend, MockBackend> {
        Find::new(BoothContext {
            config: Arc::new(BoothConfig::default()),
            server: MockBackend::new(1024 * 1024),
            font: None,
        })
    }

    fn record(code: &str) -> PhotoRecord {
        PhotoRecord {
            id: code.to_lowercase(),
            code: ShortCode::parse(code).unwrap(),
            file_url: format!("mock://{code}.jpg"),
            file_path: format!("uploads/{code}.jpg"),
            file_size: 16,
            width: 4,
            height: 3,
            created_at: Utc::now(),
            expires_at: None,
            download_count: 1,
            video_urls: None,
        }
    }

    fn search_for(find: &mut Find<TestPatternBackend, MockBackend>, code: &str) -> u64 {
        let _ = find.update(FindMessage::CodeChanged(code.into()));
        let _ = find.update(FindMessage::Submit);
        find.search
    }

    fn shown(find: &Find<TestPatternBackend, MockBackend>) -> Option<(String, Option<Bytes>)> {
        match &find.state {
            FindState::Found { record, photo } => Some((
                record.code.to_string(),
                photo.as_ref().map(|(bytes, _)| bytes.clone()),
            )),
            _ => None,
        }
    }

    #[test]
    fn codes_are_cleaned_up_while_typing() {
        let mut find = page();
        let _ = find.update(FindMessage::CodeChanged(" a3-k9b2x ".into()));
        assert_eq!(find.code, "A3K9B2");
    }

    #[test]
    fn late_downloads_stay_with_their_own_search() {
        let mut find = page();
        let first = search_for(&mut find, "AAAAAA");
        let _ = find.update(FindMessage::Found {
            search: first,
            result: Ok(record("AAAAAA")),
        });

        let second = search_for(&mut find, "BBBBBB");
        assert_ne!(first, second);
        let _ = find.update(FindMessage::Found {
            search: second,
            result: Ok(record("BBBBBB")),
        });
        let _ = find.update(FindMessage::Downloaded {
            search: first,
            result: Ok(Bytes::from_static(b"photo of AAAAAA")),
        });
        assert_eq!(shown(&find), Some(("BBBBBB".into(), None)));

        let _ = find.update(FindMessage::Downloaded {
            search: second,
            result: Ok(Bytes::from_static(b"photo of BBBBBB")),
        });
        assert_eq!(
            shown(&find),
            Some(("BBBBBB".into(), Some(Bytes::from_static(b"photo of BBBBBB"))))
        );
    }

    #[test]
    fn a_late_lookup_does_not_replace_the_current_one() {
        let mut find = page();
        let first = search_for(&mut find, "AAAAAA");
        let _ = find.update(FindMessage::Found {
            search: first,
            result: Ok(record("AAAAAA")),
        });
        let second = search_for(&mut find, "BBBBBB");
        let _ = find.update(FindMessage::Found {
            search: first,
            result: Ok(record("AAAAAA")),
        });
        assert!(matches!(find.state, FindState::Searching));
        let _ = find.update(FindMessage::Found {
            search: second,
            result: Err(ServerError::NotFound(ShortCode::parse("BBBBBB").unwrap())),
        });
        assert!(matches!(find.state, FindState::Idle));
        assert!(matches!(find.notice, Some(Notice::Error(_))));
    }
}
