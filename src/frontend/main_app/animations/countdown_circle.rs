use std::time::Duration;

use anim::{easing, Animatable};
use iced::{
    widget::{column, container, text, Container},
    Alignment, Border, Length,
};

use super::LENGTH_DIVISOR;

/// One countdown step. The timer itself always ticks once per second.
pub const ANIMATION_LENGTH: u64 = 1000 / LENGTH_DIVISOR;

#[derive(Debug, Clone, Copy, Animatable)]
pub struct AnimationState {
    opacity: f32,
    text_size: f32,
}

const MIN_TEXT_SIZE: f32 = 1.0;
const TEXT_SIZE: f32 = 96.0;

pub fn animation() -> impl anim::Animation<Item = AnimationState> {
    anim::builder::key_frames([
        anim::KeyFrame::new(AnimationState {
            opacity: 0.0,
            text_size: MIN_TEXT_SIZE,
        })
        .by_percent(0.0),
        anim::KeyFrame::new(AnimationState {
            opacity: 1.0,
            text_size: TEXT_SIZE,
        })
        .easing(easing::cubic_ease().mode(easing::EasingMode::Out))
        .by_percent(0.3),
        anim::KeyFrame::new(AnimationState {
            opacity: 1.0,
            text_size: TEXT_SIZE,
        })
        .by_percent(0.8),
        anim::KeyFrame::new(AnimationState {
            opacity: 0.0,
            text_size: TEXT_SIZE * 0.6,
        })
        .easing(easing::cubic_ease().mode(easing::EasingMode::In))
        .by_duration(Duration::from_millis(ANIMATION_LENGTH)),
    ])
}

/// The number of seconds left, with which photo is coming up underneath.
pub fn view<Message: 'static>(
    remaining: u8,
    shot: usize,
    shot_count: usize,
    animation_state: AnimationState,
) -> Container<'static, Message> {
    container(
        column([
            container(text(remaining.to_string()).size(animation_state.text_size))
                .center(TEXT_SIZE * 2.0)
                .style(move |theme: &iced::Theme| container::Style {
                    text_color: Some(
                        theme
                            .extended_palette()
                            .primary
                            .strong
                            .text
                            .scale_alpha(animation_state.opacity),
                    ),
                    background: Some(
                        theme
                            .extended_palette()
                            .primary
                            .strong
                            .color
                            .scale_alpha(animation_state.opacity)
                            .into(),
                    ),
                    border: Border {
                        radius: 9999.0.into(),
                        ..Default::default()
                    },
                    shadow: Default::default(),
                })
                .into(),
            text(format!("Photo {} of {shot_count}", shot + 1))
                .size(28)
                .into(),
        ])
        .spacing(16)
        .align_x(Alignment::Center),
    )
    .center(Length::Fill)
}
