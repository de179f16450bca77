use std::time::Duration;

use anim::{easing, Animatable};
use iced::{
    widget::{container, Container},
    Color, Length,
};

use super::LENGTH_DIVISOR;

pub const ANIMATION_LENGTH: u64 = 400 / LENGTH_DIVISOR;

#[derive(Debug, Clone, Copy, Animatable)]
pub struct AnimationState {
    opacity: f32,
}

/// A white flash that fades out as the shutter fires.
pub fn animation() -> impl anim::Animation<Item = AnimationState> {
    anim::builder::key_frames([
        anim::KeyFrame::new(AnimationState { opacity: 0.9 }).by_percent(0.0),
        anim::KeyFrame::new(AnimationState { opacity: 0.0 })
            .easing(easing::cubic_ease().mode(easing::EasingMode::Out))
            .by_duration(Duration::from_millis(ANIMATION_LENGTH)),
    ])
}

pub fn view<Message>(animation_state: AnimationState) -> Container<'static, Message> {
    container("")
        .style(move |_| container::background(Color::WHITE.scale_alpha(animation_state.opacity)))
        .width(Length::Fill)
        .height(Length::Fill)
}
