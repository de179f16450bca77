use iced::{
    gradient::Linear,
    widget::{column, container, text, Container, Text},
    Alignment, Background, Color, Element, Length, Radians, Theme,
};

use crate::backend::capture::Notice;

fn shade(theme: &Theme, top_alpha: f32) -> Background {
    let base = theme.extended_palette().background.base.color;
    Background::Gradient(iced::Gradient::Linear(
        Linear::new(Radians::PI)
            .add_stop(0.0, base.scale_alpha(top_alpha))
            .add_stop(0.4, base.scale_alpha(top_alpha))
            .add_stop(1.0, base),
    ))
}

/// Darkens the camera feed towards the bottom, where `content` sits.
/// A light overlay keeps most of the feed visible.
pub fn title_overlay<'a, Message: 'a>(
    content: impl Into<Element<'a, Message>>,
    light: bool,
) -> Element<'a, Message> {
    container(content)
        .style(move |theme: &Theme| {
            container::background(shade(theme, if light { 0.0 } else { 0.7 }))
        })
        .padding(24)
        .width(Length::Fill)
        .height(Length::Fill)
        .align_y(Alignment::End)
        .align_x(Alignment::Center)
        .into()
}

pub fn title_text<'a>(content: impl text::IntoFragment<'a>) -> Text<'a> {
    text(content)
        .style(|theme: &Theme| text::Style {
            color: Some(theme.extended_palette().background.base.text),
        })
        .size(42)
        .align_x(Alignment::Center)
        .width(Length::Fill)
}

pub fn supporting_text<'a>(content: impl text::IntoFragment<'a>) -> Text<'a> {
    text(content)
        .style(|theme: &Theme| text::Style {
            color: Some(
                theme
                    .extended_palette()
                    .background
                    .base
                    .text
                    .scale_alpha(0.6),
            ),
        })
        .size(24)
        .align_x(Alignment::Center)
        .width(Length::Fill)
}

pub fn notice_banner<'a, Message: 'a>(notice: &Notice) -> Container<'a, Message> {
    let (message, is_error) = match notice {
        Notice::Info(message) => (message.clone(), false),
        Notice::Error(message) => (message.clone(), true),
    };
    container(text(message).size(16))
        .style(move |theme: &Theme| {
            let palette = theme.extended_palette();
            let (strong, weak) = if is_error {
                (palette.danger.strong, palette.danger.weak)
            } else {
                (palette.primary.strong, palette.primary.weak)
            };
            container::Style {
                border: iced::Border::default().rounded(8.0).color(strong.color).width(1.0),
                background: Some(weak.color.into()),
                text_color: Some(weak.text),
                ..Default::default()
            }
        })
        .padding(12)
        .max_width(720)
}

/// Stands in for the feed while a camera is being opened or has failed.
pub fn camera_off<'a, Message: 'a>(detail: Option<String>) -> Element<'a, Message> {
    container(
        column([
            title_text("Camera off").into(),
            supporting_text(detail.unwrap_or_else(|| "Waiting for the camera…".into())).into(),
        ])
        .spacing(8)
        .max_width(640),
    )
    .style(|_| container::background(Color::BLACK))
    .center(Length::Fill)
    .into()
}

#[cfg(test)]
mod tests {
    use iced::widget::Column;

    use super::*;

    fn code_panel(code: &str) -> Element<'_, ()> {
        Column::new()
            .push(title_text(code))
            .push(supporting_text(code))
            .into()
    }

    #[test]
    fn text_helpers_can_borrow_from_the_page() {
        let code = String::from("A3K9B2");
        let _panel = code_panel(&code);
        let _banner: Container<'_, ()> = notice_banner(&Notice::Info(code.clone()));
    }
}
