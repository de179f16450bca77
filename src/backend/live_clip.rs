//! Live clips: the motion frames buffered around each shot, replayed in the
//! take's layout and recorded for a fixed stretch of real time.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use image::RgbaImage;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};

use super::{
    imaging::{filters::PhotoFilter, overlay::LoadedOverlay},
    render_take::{compose_prepared, prepare_overlay, LayoutError, LayoutGeometry, LayoutKind, LayoutOptions, SHOT_COUNT},
};

pub mod codec;
mod recorder;

pub use codec::{negotiate, AvailableEncoders, ClipCodec};
use recorder::Recorder;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("live clips are unavailable: none of {tried:?} can be encoded here")]
    UnsupportedCodec { tried: Vec<ClipCodec> },
    #[error("invalid clip request: {0}")]
    InvalidRequest(&'static str),
    #[error("failed to start ffmpeg: {0}")]
    Spawn(std::io::Error),
    #[error("clip encoder failed: {0}")]
    Encoder(String),
    #[error("clip i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode gif: {0}")]
    Gif(#[from] image::ImageError),
    #[error("failed to render clip frame: {0}")]
    Render(String),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// What one cell of the clip plays: the buffered motion frames, or the still
/// when nothing was buffered.
#[derive(Debug, Clone)]
pub struct ClipSource {
    pub still: Arc<RgbaImage>,
    pub motion: Arc<Vec<RgbaImage>>,
}

impl ClipSource {
    fn frame_at(&self, elapsed: Duration, source_fps: u32) -> &RgbaImage {
        match clip_frame_index(elapsed, source_fps, self.motion.len()) {
            Some(index) => &self.motion[index],
            None => &self.still,
        }
    }
}

/// Index into a looping source clip of `len` frames recorded at `source_fps`.
pub fn clip_frame_index(elapsed: Duration, source_fps: u32, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let frame = elapsed.as_nanos() * source_fps as u128 / 1_000_000_000;
    Some((frame % len as u128) as usize)
}

#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub sources: Vec<ClipSource>,
    pub layout: LayoutKind,
    pub options: LayoutOptions,
    pub overlay: Option<LoadedOverlay>,
    pub filter: PhotoFilter,
    pub duration: Duration,
    pub fps: u32,
    pub source_fps: u32,
}

#[derive(Debug, Clone)]
pub struct ClipBlob {
    pub bytes: Bytes,
    pub codec: ClipCodec,
    pub frame_count: u64,
    pub duration: Duration,
}

struct ClipScene {
    sources: Vec<ClipSource>,
    geometry: LayoutGeometry,
    overlay: Option<RgbaImage>,
    options: LayoutOptions,
    filter: PhotoFilter,
    source_fps: u32,
}

impl ClipScene {
    fn render(&self, elapsed: Duration) -> Result<RgbaImage, LayoutError> {
        let shots: Vec<RgbaImage> = self
            .sources
            .iter()
            .map(|source| {
                let mut frame = source.frame_at(elapsed, self.source_fps).clone();
                self.filter.apply(&mut frame);
                frame
            })
            .collect();
        compose_prepared(&shots, &self.geometry, self.overlay.as_ref(), &self.options)
    }
}

fn frames_in(duration: Duration, fps: u32) -> u64 {
    (duration.as_nanos() * fps as u128 / 1_000_000_000) as u64
}

/// Record `request.duration` of wall-clock time at `request.fps`.
///
/// The length of the result is set by the clock, not by how many source
/// frames exist: short sources loop, and if rendering falls behind the last
/// frame is repeated so the clip still plays for the full duration.
pub async fn encode_clip(request: ClipRequest, codec: ClipCodec) -> Result<ClipBlob, ClipError> {
    if request.fps == 0 || request.source_fps == 0 {
        return Err(ClipError::InvalidRequest("frame rates must be non-zero"));
    }
    if request.duration.is_zero() {
        return Err(ClipError::InvalidRequest("duration must be non-zero"));
    }
    if request.sources.len() != SHOT_COUNT {
        return Err(LayoutError::ShotCount(request.sources.len()).into());
    }

    let geometry = LayoutGeometry::new(request.layout, &request.options);
    let overlay = prepare_overlay(request.overlay.as_ref(), &geometry);
    let (width, height) = (geometry.canvas_width, geometry.canvas_height);
    let scene = Arc::new(ClipScene {
        sources: request.sources,
        geometry,
        overlay,
        options: request.options,
        filter: request.filter,
        source_fps: request.source_fps,
    });

    let total = frames_in(request.duration, request.fps).max(1);
    let mut recorder = Recorder::start(codec, width, height, request.fps).await?;
    let mut interval = tokio::time::interval(Duration::from_secs(1) / request.fps);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let started = Instant::now();
    let mut written = 0u64;
    loop {
        interval.tick().await;
        let elapsed = started.elapsed();
        if elapsed >= request.duration && written > 0 {
            break;
        }
        let due = (frames_in(elapsed, request.fps) + 1).min(total);
        if due <= written {
            continue;
        }

        let frame = {
            let scene = scene.clone();
            tokio::task::spawn_blocking(move || scene.render(elapsed))
                .await
                .map_err(|err| ClipError::Render(err.to_string()))??
        };
        if due - written > 1 {
            log::debug!("clip renderer behind, repeating a frame {} times", due - written);
        }
        while written < due {
            recorder.push(&frame).await?;
            written += 1;
        }
    }

    // a clock that jumped past the end still owes the remaining frames
    if written < total {
        let frame = {
            let scene = scene.clone();
            let at = request.duration;
            tokio::task::spawn_blocking(move || scene.render(at))
                .await
                .map_err(|err| ClipError::Render(err.to_string()))??
        };
        while written < total {
            recorder.push(&frame).await?;
            written += 1;
        }
    }

    let bytes = recorder.finish().await?;
    log::info!(
        "recorded {written} frame {codec} clip ({} KiB) in {:?}",
        bytes.len() / 1024,
        started.elapsed()
    );
    Ok(ClipBlob {
        bytes,
        codec,
        frame_count: written,
        duration: request.duration,
    })
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn sources(motion_frames: usize) -> Vec<ClipSource> {
        (0..SHOT_COUNT)
            .map(|i| {
                let color = Rgba([i as u8 * 60, 100, 200, 255]);
                ClipSource {
                    still: Arc::new(RgbaImage::from_pixel(8, 6, color)),
                    motion: Arc::new(
                        (0..motion_frames)
                            .map(|f| RgbaImage::from_pixel(8, 6, Rgba([f as u8 * 30, 0, 0, 255])))
                            .collect(),
                    ),
                }
            })
            .collect()
    }

    fn request(duration: Duration, fps: u32) -> ClipRequest {
        ClipRequest {
            sources: sources(3),
            layout: LayoutKind::Grid2x2,
            options: LayoutOptions {
                photo_width: 8,
                photo_height: 6,
                grid_cell_size: 6,
                spacing: 2,
                padding: 2,
                ..Default::default()
            },
            overlay: None,
            filter: PhotoFilter::None,
            duration,
            fps,
            source_fps: 15,
        }
    }

    #[test]
    fn source_clips_loop() {
        assert_eq!(clip_frame_index(Duration::ZERO, 15, 3), Some(0));
        assert_eq!(clip_frame_index(Duration::from_millis(140), 15, 3), Some(2));
        assert_eq!(clip_frame_index(Duration::from_millis(250), 15, 3), Some(0));
        assert_eq!(clip_frame_index(Duration::from_secs(1), 15, 0), None);
    }

    #[tokio::test(start_paused = true)]
    async fn clip_length_follows_the_clock() {
        let blob = encode_clip(request(Duration::from_secs(2), 10), ClipCodec::Gif)
            .await
            .unwrap();
        assert_eq!(blob.frame_count, 20);
        assert_eq!(blob.codec, ClipCodec::Gif);
        assert!(blob.bytes.starts_with(b"GIF89a"));
    }

    #[tokio::test(start_paused = true)]
    async fn short_sources_do_not_shorten_the_clip() {
        let mut request = request(Duration::from_millis(1500), 4);
        request.sources = sources(0);
        let blob = encode_clip(request, ClipCodec::Gif).await.unwrap();
        assert_eq!(blob.frame_count, 6);
    }

    #[tokio::test]
    async fn bad_requests_are_rejected() {
        let err = encode_clip(request(Duration::from_secs(1), 0), ClipCodec::Gif)
            .await
            .unwrap_err();
        assert!(matches!(err, ClipError::InvalidRequest(_)));

        let mut short = request(Duration::from_secs(1), 10);
        short.sources.truncate(2);
        let err = encode_clip(short, ClipCodec::Gif).await.unwrap_err();
        assert!(matches!(err, ClipError::Layout(LayoutError::ShotCount(2))));
    }
}
