//! The capture flow as an explicit state machine.
//!
//! [`CaptureMachine::handle`] is pure: it takes a [`Trigger`], updates the
//! phase and session, and returns the [`Effect`]s the caller has to run
//! (timers, camera captures, compositing). Results of those effects come back
//! in as triggers. The UI only ever reads the machine.

use std::{fmt::Display, sync::Arc, time::Duration};

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    imaging::filters::PhotoFilter,
    render_take::{CompositeImage, LayoutKind, SHOT_COUNT},
};

pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    #[default]
    Auto,
    Manual,
}

impl CaptureMode {
    pub const ALL: [CaptureMode; 2] = [CaptureMode::Auto, CaptureMode::Manual];
}

impl Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Auto => "Automatic",
            Self::Manual => "Manual shutter",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("countdown must be 3, 5 or 7 seconds, got {0}")]
pub struct InvalidCountdown(pub u8);

/// Countdown length before each automatic shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CountdownDuration(u8);

impl CountdownDuration {
    pub const ALL: [CountdownDuration; 3] =
        [CountdownDuration(3), CountdownDuration(5), CountdownDuration(7)];

    pub fn seconds(&self) -> u8 {
        self.0
    }
}

impl Default for CountdownDuration {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for CountdownDuration {
    type Error = InvalidCountdown;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 | 5 | 7 => Ok(Self(value)),
            other => Err(InvalidCountdown(other)),
        }
    }
}

impl From<CountdownDuration> for u8 {
    fn from(value: CountdownDuration) -> Self {
        value.0
    }
}

impl Display for CountdownDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} seconds", self.0)
    }
}

/// One normalized shot plus the preview frames buffered around the shutter.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub pixels: Arc<RgbaImage>,
    pub sequence_index: usize,
    pub motion: Arc<Vec<RgbaImage>>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub mode: CaptureMode,
    pub layout: LayoutKind,
    /// Id of the selected overlay asset.
    pub overlay: Option<String>,
    pub filter: PhotoFilter,
    pub background: Rgba<u8>,
    pub shots: Vec<CapturedFrame>,
}

impl Session {
    pub fn new(layout: LayoutKind, background: Rgba<u8>) -> Self {
        Self {
            mode: CaptureMode::default(),
            layout,
            overlay: None,
            filter: PhotoFilter::default(),
            background,
            shots: Vec::with_capacity(SHOT_COUNT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Ready { index: usize },
    Countdown { index: usize, remaining: u8 },
    Capturing { index: usize },
    Review { index: usize },
    Composing,
    Done,
}

impl CapturePhase {
    /// Shot the phase is working on, if any.
    pub fn index(&self) -> Option<usize> {
        match *self {
            Self::Ready { index }
            | Self::Countdown { index, .. }
            | Self::Capturing { index }
            | Self::Review { index } => Some(index),
            Self::Idle | Self::Composing | Self::Done => None,
        }
    }

    fn is_busy(&self) -> bool {
        matches!(self, Self::Capturing { .. } | Self::Composing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    CountdownTick,
    /// The pause between an automatic shot and the next countdown.
    Arm,
}

#[derive(Debug, Clone)]
pub enum Trigger {
    Start(CaptureMode),
    Cancel,
    Shutter,
    Proceed,
    Retake,
    RetakeAll,
    TimerElapsed { epoch: u64, timer: Timer },
    CaptureSucceeded {
        pixels: Arc<RgbaImage>,
        motion: Arc<Vec<RgbaImage>>,
    },
    CaptureFailed(String),
    CompositeReady(Arc<CompositeImage>),
    CompositeFailed(String),
    SelectOverlay(Option<String>),
    SelectFilter(PhotoFilter),
    SelectBackground(Rgba<u8>),
    SelectLayout(LayoutKind),
    SetCountdown(CountdownDuration),
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Cancel => "cancel",
            Self::Shutter => "shutter",
            Self::Proceed => "proceed",
            Self::Retake => "retake",
            Self::RetakeAll => "retake all",
            Self::TimerElapsed { .. } => "timer",
            Self::CaptureSucceeded { .. } => "capture succeeded",
            Self::CaptureFailed(_) => "capture failed",
            Self::CompositeReady(_) => "composite ready",
            Self::CompositeFailed(_) => "composite failed",
            Self::SelectOverlay(_) => "select overlay",
            Self::SelectFilter(_) => "select filter",
            Self::SelectBackground(_) => "select background",
            Self::SelectLayout(_) => "select layout",
            Self::SetCountdown(_) => "set countdown",
        }
    }
}

/// Everything the compositor needs, snapshotted when the fourth shot lands.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub shots: Vec<Arc<RgbaImage>>,
    pub layout: LayoutKind,
    pub overlay: Option<String>,
    pub filter: PhotoFilter,
    pub background: Rgba<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

#[derive(Debug, Clone)]
pub enum Effect {
    StartTimer {
        epoch: u64,
        timer: Timer,
        delay: Duration,
    },
    CaptureStill { index: usize },
    Compose(ComposeRequest),
    /// The take is finished and should go to the server.
    Publish(Arc<CompositeImage>),
    Notify(Notice),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot {trigger} while {phase:?}")]
pub struct TransitionError {
    pub phase: CapturePhase,
    pub trigger: &'static str,
}

#[derive(Debug)]
pub struct CaptureMachine {
    phase: CapturePhase,
    session: Session,
    countdown: CountdownDuration,
    advance_pause: Duration,
    epoch: u64,
    pending: Option<CapturedFrame>,
    composite: Option<Arc<CompositeImage>>,
}

impl CaptureMachine {
    pub fn new(session: Session, countdown: CountdownDuration, advance_pause: Duration) -> Self {
        Self {
            phase: CapturePhase::Idle,
            session,
            countdown,
            advance_pause,
            epoch: 0,
            pending: None,
            composite: None,
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn countdown(&self) -> CountdownDuration {
        self.countdown
    }

    /// The shot waiting for proceed/retake in manual mode.
    pub fn pending(&self) -> Option<&CapturedFrame> {
        self.pending.as_ref()
    }

    pub fn composite(&self) -> Option<&Arc<CompositeImage>> {
        self.composite.as_ref()
    }

    pub fn handle(&mut self, trigger: Trigger) -> Result<Vec<Effect>, TransitionError> {
        let before = self.phase;
        let name = trigger.name();
        let result = self.transition(trigger);
        match &result {
            Ok(_) if before != self.phase => {
                log::debug!("capture: {before:?} -> {:?} on {name}", self.phase)
            }
            Ok(_) => {}
            Err(err) => log::debug!("capture: rejected: {err}"),
        }
        result
    }

    fn transition(&mut self, trigger: Trigger) -> Result<Vec<Effect>, TransitionError> {
        let mode = self.session.mode;

        match (self.phase, trigger) {
            (CapturePhase::Idle | CapturePhase::Done, Trigger::Start(mode)) => {
                self.reset();
                self.session.mode = mode;
                log::info!("starting {mode:?} session with {:?}", self.session.layout);
                Ok(self.enter_ready(0))
            }

            (CapturePhase::Ready { .. } | CapturePhase::Countdown { .. }, Trigger::Cancel)
                if mode == CaptureMode::Auto =>
            {
                log::info!("session cancelled, discarding {} shot(s)", self.session.shots.len());
                self.reset();
                Ok(vec![])
            }

            (CapturePhase::Ready { index }, Trigger::Shutter) => match mode {
                CaptureMode::Manual => {
                    self.phase = CapturePhase::Capturing { index };
                    Ok(vec![Effect::CaptureStill { index }])
                }
                // re-arm after a failure, or skip the remaining pause
                CaptureMode::Auto => {
                    self.epoch += 1;
                    Ok(self.begin_countdown(index))
                }
            },

            (CapturePhase::Review { index }, Trigger::Proceed | Trigger::Shutter) => {
                Ok(self.commit(index))
            }

            (CapturePhase::Review { index }, Trigger::Retake) => {
                self.pending = None;
                self.phase = CapturePhase::Ready { index };
                Ok(vec![])
            }

            (phase, Trigger::RetakeAll) if !phase.is_busy() => {
                self.reset();
                Ok(vec![])
            }

            (phase, Trigger::TimerElapsed { epoch, timer }) => {
                if epoch != self.epoch {
                    log::trace!("ignoring stale {timer:?} timer from epoch {epoch}");
                    return Ok(vec![]);
                }
                Ok(self.timer_elapsed(phase, timer))
            }

            (CapturePhase::Capturing { index }, Trigger::CaptureSucceeded { pixels, motion }) => {
                let frame = CapturedFrame {
                    pixels,
                    sequence_index: index,
                    motion,
                };
                self.pending = Some(frame);
                match mode {
                    CaptureMode::Auto => Ok(self.commit(index)),
                    CaptureMode::Manual => {
                        self.phase = CapturePhase::Review { index };
                        Ok(vec![])
                    }
                }
            }

            (CapturePhase::Capturing { index }, Trigger::CaptureFailed(message)) => {
                log::error!("shot {} failed: {message}", index + 1);
                self.phase = CapturePhase::Ready { index };
                Ok(vec![Effect::Notify(Notice::Error(format!(
                    "Couldn't take photo {}: {message}. Press the shutter to try again.",
                    index + 1
                )))])
            }

            (CapturePhase::Composing, Trigger::CompositeReady(composite)) => {
                self.composite = Some(composite.clone());
                self.phase = CapturePhase::Done;
                Ok(vec![Effect::Publish(composite)])
            }

            (CapturePhase::Composing, Trigger::CompositeFailed(message)) => {
                log::error!("composite failed: {message}");
                self.reset();
                Ok(vec![Effect::Notify(Notice::Error(format!(
                    "Couldn't put your photos together: {message}"
                )))])
            }

            (phase, Trigger::SelectOverlay(overlay)) if !phase.is_busy() => {
                self.session.overlay = overlay;
                Ok(vec![])
            }

            (phase, Trigger::SelectFilter(filter)) if !phase.is_busy() => {
                self.session.filter = filter;
                Ok(vec![])
            }

            (phase, Trigger::SelectBackground(color)) if !phase.is_busy() => {
                self.session.background = color;
                Ok(vec![])
            }

            (CapturePhase::Idle | CapturePhase::Done, Trigger::SelectLayout(layout)) => {
                self.session.layout = layout;
                Ok(vec![])
            }

            (CapturePhase::Idle | CapturePhase::Done, Trigger::SetCountdown(countdown)) => {
                self.countdown = countdown;
                Ok(vec![])
            }

            (phase, trigger) => Err(TransitionError {
                phase,
                trigger: trigger.name(),
            }),
        }
    }

    fn timer_elapsed(&mut self, phase: CapturePhase, timer: Timer) -> Vec<Effect> {
        match (phase, timer) {
            (CapturePhase::Countdown { index, remaining }, Timer::CountdownTick) => {
                let remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    self.phase = CapturePhase::Capturing { index };
                    vec![Effect::CaptureStill { index }]
                } else {
                    self.phase = CapturePhase::Countdown { index, remaining };
                    vec![self.timer(Timer::CountdownTick, COUNTDOWN_TICK)]
                }
            }
            (CapturePhase::Ready { index }, Timer::Arm)
                if self.session.mode == CaptureMode::Auto =>
            {
                self.begin_countdown(index)
            }
            (phase, timer) => {
                log::trace!("{timer:?} timer has nothing to do while {phase:?}");
                vec![]
            }
        }
    }

    fn timer(&self, timer: Timer, delay: Duration) -> Effect {
        Effect::StartTimer {
            epoch: self.epoch,
            timer,
            delay,
        }
    }

    fn enter_ready(&mut self, index: usize) -> Vec<Effect> {
        self.phase = CapturePhase::Ready { index };
        match self.session.mode {
            CaptureMode::Auto => self.begin_countdown(index),
            CaptureMode::Manual => vec![],
        }
    }

    fn begin_countdown(&mut self, index: usize) -> Vec<Effect> {
        self.phase = CapturePhase::Countdown {
            index,
            remaining: self.countdown.seconds(),
        };
        vec![self.timer(Timer::CountdownTick, COUNTDOWN_TICK)]
    }

    fn commit(&mut self, index: usize) -> Vec<Effect> {
        let Some(frame) = self.pending.take() else {
            log::warn!("nothing to commit for shot {}", index + 1);
            self.phase = CapturePhase::Ready { index };
            return vec![];
        };
        debug_assert_eq!(self.session.shots.len(), index);
        self.session.shots.push(frame);

        if index + 1 < SHOT_COUNT {
            let next = index + 1;
            match self.session.mode {
                CaptureMode::Auto => {
                    self.phase = CapturePhase::Ready { index: next };
                    vec![self.timer(Timer::Arm, self.advance_pause)]
                }
                CaptureMode::Manual => self.enter_ready(next),
            }
        } else {
            self.phase = CapturePhase::Composing;
            vec![Effect::Compose(ComposeRequest {
                shots: self.session.shots.iter().map(|shot| shot.pixels.clone()).collect(),
                layout: self.session.layout,
                overlay: self.session.overlay.clone(),
                filter: self.session.filter,
                background: self.session.background,
            })]
        }
    }

    fn reset(&mut self) {
        self.session.shots.clear();
        self.pending = None;
        self.composite = None;
        self.epoch += 1;
        self.phase = CapturePhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::Bytes;

    use super::*;
    use crate::backend::render_take::{compose_layout, LayoutOptions};

    const PAUSE: Duration = Duration::from_millis(500);

    fn new_machine(countdown: u8) -> CaptureMachine {
        CaptureMachine::new(
            Session::new(LayoutKind::VerticalStrip, Rgba([0, 0, 0, 255])),
            CountdownDuration::try_from(countdown).unwrap(),
            PAUSE,
        )
    }

    fn shot(value: u8) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_pixel(16, 12, Rgba([value, value, 255 - value, 255])))
    }

    fn succeeded(value: u8) -> Trigger {
        Trigger::CaptureSucceeded {
            pixels: shot(value),
            motion: Arc::new(vec![]),
        }
    }

    fn small_options() -> LayoutOptions {
        LayoutOptions {
            photo_width: 16,
            photo_height: 12,
            grid_cell_size: 12,
            spacing: 2,
            padding: 3,
            ..Default::default()
        }
    }

    /// Fire every requested timer immediately; returns the other effects and
    /// how many countdown ticks fired.
    fn fire_timers(machine: &mut CaptureMachine, effects: Vec<Effect>) -> (Vec<Effect>, usize) {
        let mut queue: VecDeque<Effect> = effects.into();
        let mut rest = Vec::new();
        let mut ticks = 0;
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::StartTimer { epoch, timer, .. } => {
                    if timer == Timer::CountdownTick {
                        ticks += 1;
                    }
                    queue.extend(machine.handle(Trigger::TimerElapsed { epoch, timer }).unwrap());
                }
                other => rest.push(other),
            }
        }
        (rest, ticks)
    }

    #[test]
    fn countdown_only_accepts_three_five_or_seven() {
        assert_eq!(CountdownDuration::try_from(4), Err(InvalidCountdown(4)));
        assert_eq!(CountdownDuration::try_from(7).unwrap().seconds(), 7);
    }

    #[test]
    fn auto_session_runs_to_a_single_composite() {
        let mut machine = new_machine(3);
        let mut effects = machine.handle(Trigger::Start(CaptureMode::Auto)).unwrap();
        let mut composes = Vec::new();

        for i in 0..SHOT_COUNT {
            let (rest, ticks) = fire_timers(&mut machine, effects);
            assert_eq!(ticks, 3);
            assert!(matches!(rest.as_slice(), [Effect::CaptureStill { index }] if *index == i));
            assert_eq!(machine.phase(), CapturePhase::Capturing { index: i });
            effects = machine.handle(succeeded(i as u8 * 60)).unwrap();
            composes.extend(effects.iter().filter(|e| matches!(e, Effect::Compose(_))).cloned());
        }

        assert_eq!(composes.len(), 1);
        assert_eq!(machine.phase(), CapturePhase::Composing);
        let Effect::Compose(request) = &composes[0] else {
            unreachable!()
        };
        let options = small_options();
        let pixels: Vec<RgbaImage> = request.shots.iter().map(|s| s.as_ref().clone()).collect();
        let composite = compose_layout(&pixels, request.layout, None, &options).unwrap();
        assert_eq!(composite.height(), 4 * 12 + 3 * 2 + 2 * 3);

        let effects = machine
            .handle(Trigger::CompositeReady(Arc::new(CompositeImage {
                pixels: Arc::new(composite),
                encoded: Bytes::new(),
                layout: request.layout,
            })))
            .unwrap();
        assert_eq!(machine.phase(), CapturePhase::Done);
        assert!(matches!(effects.as_slice(), [Effect::Publish(_)]));
    }

    #[test]
    fn manual_session_with_retakes_keeps_order_and_no_overlay() {
        let mut machine = new_machine(5);
        assert!(machine.handle(Trigger::Start(CaptureMode::Manual)).unwrap().is_empty());

        let mut request = None;
        for i in 0..SHOT_COUNT {
            assert_eq!(machine.phase(), CapturePhase::Ready { index: i });
            let effects = machine.handle(Trigger::Shutter).unwrap();
            assert!(matches!(effects.as_slice(), [Effect::CaptureStill { index }] if *index == i));
            machine.handle(succeeded(250)).unwrap();
            assert_eq!(machine.phase(), CapturePhase::Review { index: i });
            machine.handle(Trigger::Retake).unwrap();
            assert_eq!(machine.phase(), CapturePhase::Ready { index: i });
            assert!(machine.pending().is_none());

            machine.handle(Trigger::Shutter).unwrap();
            machine.handle(succeeded(i as u8 * 40)).unwrap();
            for effect in machine.handle(Trigger::Proceed).unwrap() {
                if let Effect::Compose(r) = effect {
                    request = Some(r);
                }
            }
        }

        for (i, frame) in machine.session().shots.iter().enumerate() {
            assert_eq!(frame.sequence_index, i);
        }
        let request = request.expect("fourth commit composes");
        assert_eq!(request.overlay, None);
        let pixels: Vec<RgbaImage> = request.shots.iter().map(|s| s.as_ref().clone()).collect();
        let options = small_options();
        let composite = compose_layout(&pixels, request.layout, None, &options).unwrap();
        for (i, shot) in pixels.iter().enumerate() {
            let y = 3 + i as u32 * (12 + 2) + 6;
            assert_eq!(composite.get_pixel(3 + 8, y), shot.get_pixel(0, 0));
        }
    }

    #[test]
    fn retake_on_the_last_shot_does_not_compose() {
        let mut machine = new_machine(3);
        machine.handle(Trigger::Start(CaptureMode::Manual)).unwrap();
        for i in 0..3 {
            machine.handle(Trigger::Shutter).unwrap();
            machine.handle(succeeded(i)).unwrap();
            machine.handle(Trigger::Proceed).unwrap();
        }
        machine.handle(Trigger::Shutter).unwrap();
        machine.handle(succeeded(9)).unwrap();
        assert_eq!(machine.phase(), CapturePhase::Review { index: 3 });

        let effects = machine.handle(Trigger::Retake).unwrap();
        assert!(effects.is_empty());
        assert_eq!(machine.phase(), CapturePhase::Ready { index: 3 });
        assert_eq!(machine.session().shots.len(), 3);
    }

    #[test]
    fn cancel_discards_the_session_and_outstanding_timers() {
        let mut machine = new_machine(3);
        let effects = machine.handle(Trigger::Start(CaptureMode::Auto)).unwrap();
        fire_timers(&mut machine, effects);
        let effects = machine.handle(succeeded(1)).unwrap();
        assert_eq!(machine.phase(), CapturePhase::Ready { index: 1 });
        let [Effect::StartTimer { epoch, timer, .. }] = effects.as_slice() else {
            panic!("expected the arm timer, got {effects:?}");
        };

        machine.handle(Trigger::Cancel).unwrap();
        assert_eq!(machine.phase(), CapturePhase::Idle);
        assert!(machine.session().shots.is_empty());

        let late = machine
            .handle(Trigger::TimerElapsed { epoch: *epoch, timer: *timer })
            .unwrap();
        assert!(late.is_empty());
        assert_eq!(machine.phase(), CapturePhase::Idle);
    }

    #[test]
    fn cancel_is_only_for_auto_countdowns() {
        let mut machine = new_machine(3);
        machine.handle(Trigger::Start(CaptureMode::Manual)).unwrap();
        assert!(machine.handle(Trigger::Cancel).is_err());

        let mut machine = new_machine(3);
        let effects = machine.handle(Trigger::Start(CaptureMode::Auto)).unwrap();
        fire_timers(&mut machine, effects);
        let err = machine.handle(Trigger::Cancel).unwrap_err();
        assert_eq!(err.phase, CapturePhase::Capturing { index: 0 });
    }

    #[test]
    fn failed_auto_capture_waits_for_the_shutter() {
        let mut machine = new_machine(3);
        let effects = machine.handle(Trigger::Start(CaptureMode::Auto)).unwrap();
        fire_timers(&mut machine, effects);
        let effects = machine.handle(Trigger::CaptureFailed("camera unplugged".into())).unwrap();
        assert!(matches!(effects.as_slice(), [Effect::Notify(Notice::Error(_))]));
        assert_eq!(machine.phase(), CapturePhase::Ready { index: 0 });

        let effects = machine.handle(Trigger::Shutter).unwrap();
        assert_eq!(machine.phase(), CapturePhase::Countdown { index: 0, remaining: 3 });
        let (rest, _) = fire_timers(&mut machine, effects);
        assert!(matches!(rest.as_slice(), [Effect::CaptureStill { index: 0 }]));
    }

    #[test]
    fn overlay_changes_are_refused_only_while_busy() {
        let mut machine = new_machine(3);
        machine.handle(Trigger::Start(CaptureMode::Manual)).unwrap();
        machine.handle(Trigger::SelectOverlay(Some("hearts".into()))).unwrap();
        machine.handle(Trigger::Shutter).unwrap();
        assert!(machine.handle(Trigger::SelectOverlay(None)).is_err());
        assert!(machine.handle(Trigger::SelectFilter(PhotoFilter::Sepia)).is_err());
        machine.handle(succeeded(3)).unwrap();
        machine.handle(Trigger::SelectOverlay(Some("stars".into()))).unwrap();
        assert_eq!(machine.session().overlay.as_deref(), Some("stars"));
        assert!(machine.handle(Trigger::SelectLayout(LayoutKind::Grid2x2)).is_err());
    }

    #[test]
    fn retake_all_returns_to_idle() {
        let mut machine = new_machine(3);
        machine.handle(Trigger::Start(CaptureMode::Manual)).unwrap();
        machine.handle(Trigger::Shutter).unwrap();
        assert!(machine.handle(Trigger::RetakeAll).is_err());
        machine.handle(succeeded(3)).unwrap();
        machine.handle(Trigger::Proceed).unwrap();
        machine.handle(Trigger::RetakeAll).unwrap();
        assert_eq!(machine.phase(), CapturePhase::Idle);
        assert!(machine.session().shots.is_empty());
    }

    #[test]
    fn failed_composite_resets_with_an_error() {
        let mut machine = new_machine(3);
        machine.handle(Trigger::Start(CaptureMode::Manual)).unwrap();
        for i in 0..4 {
            machine.handle(Trigger::Shutter).unwrap();
            machine.handle(succeeded(i)).unwrap();
            machine.handle(Trigger::Proceed).unwrap();
        }
        assert_eq!(machine.phase(), CapturePhase::Composing);
        let effects = machine.handle(Trigger::CompositeFailed("no valid shots".into())).unwrap();
        assert!(matches!(effects.as_slice(), [Effect::Notify(Notice::Error(_))]));
        assert_eq!(machine.phase(), CapturePhase::Idle);
        assert!(machine.session().shots.is_empty());
    }
}
