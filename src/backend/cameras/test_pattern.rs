//! Synthetic cameras for machines without a webcam (and for demos).

use std::{fmt::Display, io::Cursor, time::Instant};

use bytes::Bytes;
use image::{Rgba, RgbaImage};

use super::{CameraBackendCamera, CameraError};
use crate::backend::imaging::normalize::RawFrame;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const BARS: [[u8; 3]; 7] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
];

#[derive(Debug, Clone, Copy)]
pub struct TestPatternBackend {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    Front,
    Rear,
}

impl Display for TestPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Front => "Test pattern (front)",
            Self::Rear => "Test pattern (rear)",
        })
    }
}

impl super::CameraBackend for TestPatternBackend {
    type EnumeratedCamera = TestPattern;
    type Camera = TestPatternCamera;

    fn enumerate_cameras() -> Result<Vec<TestPattern>, CameraError> {
        Ok(vec![TestPattern::Front, TestPattern::Rear])
    }

    fn open_camera(item: TestPattern) -> Result<TestPatternCamera, CameraError> {
        Ok(TestPatternCamera {
            pattern: item,
            started: Instant::now(),
        })
    }
}

pub struct TestPatternCamera {
    pattern: TestPattern,
    started: Instant,
}

impl TestPatternCamera {
    fn render(&self) -> RgbaImage {
        let shift = (self.started.elapsed().as_millis() / 8) as u32;
        let bar_width = WIDTH / BARS.len() as u32;
        RgbaImage::from_fn(WIDTH, HEIGHT, |x, y| {
            let x = match self.pattern {
                TestPattern::Front => x + shift,
                TestPattern::Rear => x + WIDTH * 4 - shift % (WIDTH * 4),
            };
            let [r, g, b] = BARS[((x / bar_width) as usize) % BARS.len()];
            // darker band along the bottom so orientation is visible
            if y > HEIGHT * 3 / 4 {
                Rgba([r / 3, g / 3, b / 3, 255])
            } else {
                Rgba([r, g, b, 255])
            }
        })
    }
}

impl CameraBackendCamera for TestPatternCamera {
    fn capture_video_frame(&mut self) -> Result<RgbaImage, CameraError> {
        Ok(self.render())
    }

    /// Stills arrive PNG-encoded, the way a tethered camera hands over files.
    fn capture_still_frame(&mut self) -> Result<RawFrame, CameraError> {
        let mut encoded = Vec::new();
        image::DynamicImage::ImageRgba8(self.render())
            .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
            .map_err(|err| CameraError::Capture(err.to_string()))?;
        Ok(RawFrame::Encoded(Bytes::from(encoded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cameras::CameraBackend;

    #[test]
    fn stills_decode_to_the_preview_size() {
        let cameras = TestPatternBackend::enumerate_cameras().unwrap();
        let mut camera = TestPatternBackend::open_camera(cameras[1]).unwrap();
        let still = camera.capture_still_frame().unwrap().decode().unwrap();
        assert_eq!(still.dimensions(), (WIDTH, HEIGHT));
        assert_eq!(camera.capture_video_frame().unwrap().dimensions(), (WIDTH, HEIGHT));
    }
}
