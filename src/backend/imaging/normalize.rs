use std::fmt;

use bytes::Bytes;
use image::{imageops::FilterType, RgbaImage};
use thiserror::Error;

/// A frame as it comes off a camera: either already decoded or still in the
/// camera's wire format (JPEG/PNG from tethered or synthetic cameras).
#[derive(Clone)]
pub enum RawFrame {
    Rgba(RgbaImage),
    Encoded(Bytes),
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgba(image) => write!(f, "RawFrame::Rgba({}x{})", image.width(), image.height()),
            Self::Encoded(bytes) => write!(f, "RawFrame::Encoded({} bytes)", bytes.len()),
        }
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("captured frame could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("captured frame is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("normalization target {width}x{height} is invalid")]
    InvalidTarget { width: u32, height: u32 },
}

impl RawFrame {
    pub fn decode(self) -> Result<RgbaImage, NormalizeError> {
        let image = match self {
            Self::Rgba(image) => image,
            Self::Encoded(bytes) => image::load_from_memory(&bytes)?.to_rgba8(),
        };
        if image.width() == 0 || image.height() == 0 {
            return Err(NormalizeError::Empty {
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(image)
    }
}

/// Output resolution every shot is normalized to before compositing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeTarget {
    pub width: u32,
    pub height: u32,
}

impl NormalizeTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Region `(x, y, width, height)` of a `width`x`height` source that has the
/// requested aspect ratio, centered, with equal margins trimmed on one axis.
pub fn crop_rect(width: u32, height: u32, aspect_ratio: f64) -> (u32, u32, u32, u32) {
    let source_aspect = width as f64 / height as f64;
    if source_aspect > aspect_ratio {
        // trim off left and right
        let new_width = ((height as f64 * aspect_ratio).round() as u32).clamp(1, width);
        ((width - new_width) / 2, 0, new_width, height)
    } else {
        // trim off top and bottom
        let new_height = ((width as f64 / aspect_ratio).round() as u32).clamp(1, height);
        (0, (height - new_height) / 2, width, new_height)
    }
}

/// Center-crop to an aspect ratio without resampling.
pub fn center_crop(frame: &RgbaImage, aspect_ratio: f64) -> RgbaImage {
    let (x, y, width, height) = crop_rect(frame.width(), frame.height(), aspect_ratio);
    if width == frame.width() && height == frame.height() {
        return frame.clone();
    }
    image::imageops::crop_imm(frame, x, y, width, height).to_image()
}

/// Crop `frame` to the target aspect ratio and resample to exactly the
/// target resolution.
///
/// A frame that already matches the target dimensions is returned untouched,
/// so normalizing twice is pixel-identical to normalizing once.
pub fn normalize(frame: RawFrame, target: NormalizeTarget) -> Result<RgbaImage, NormalizeError> {
    if target.width == 0 || target.height == 0 {
        return Err(NormalizeError::InvalidTarget {
            width: target.width,
            height: target.height,
        });
    }
    let frame = frame.decode()?;
    Ok(fit_exact(&frame, target.width, target.height))
}

/// Crop to the aspect ratio of `width`x`height`, then resize to exactly that.
pub fn fit_exact(frame: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    let cropped = center_crop(frame, width as f64 / height as f64);
    if cropped.dimensions() == (width, height) {
        return cropped;
    }
    log::trace!(
        "resampling {}x{} -> {}x{}",
        cropped.width(),
        cropped.height(),
        width,
        height
    );
    image::imageops::resize(&cropped, width, height, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::Rgba;

    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    /// Green in the middle `keep` columns, red margins either side.
    fn banded_horizontally(width: u32, height: u32, keep: u32) -> RgbaImage {
        let margin = (width - keep) / 2;
        RgbaImage::from_fn(width, height, |x, _| {
            if x < margin || x >= margin + keep {
                RED
            } else {
                GREEN
            }
        })
    }

    #[test]
    fn wide_frames_lose_their_sides() {
        assert_eq!(crop_rect(1920, 1080, 4.0 / 3.0), (240, 0, 1440, 1080));
        let frame = banded_horizontally(160, 90, 120);
        let out = normalize(RawFrame::Rgba(frame), NormalizeTarget::new(120, 90)).unwrap();
        assert_eq!(out.dimensions(), (120, 90));
        assert!(out.pixels().all(|p| *p == GREEN));
    }

    #[test]
    fn tall_frames_lose_top_and_bottom() {
        assert_eq!(crop_rect(1080, 1920, 4.0 / 3.0), (0, 555, 1080, 810));
        let frame = RgbaImage::from_fn(30, 60, |_, y| if (15..45).contains(&y) { GREEN } else { RED });
        let cropped = center_crop(&frame, 1.0);
        assert_eq!(cropped.dimensions(), (30, 30));
        assert!(cropped.pixels().all(|p| *p == GREEN));
    }

    #[test]
    fn output_is_always_target_sized() {
        let target = NormalizeTarget::new(64, 48);
        for (w, h) in [(1, 1), (7, 300), (300, 7), (64, 48), (640, 480), (33, 33)] {
            let out = normalize(RawFrame::Rgba(RgbaImage::new(w, h)), target).unwrap();
            assert_eq!(out.dimensions(), (64, 48), "input {w}x{h}");
        }
    }

    #[test]
    fn normalizing_twice_is_identity() {
        let target = NormalizeTarget::new(40, 30);
        let frame = RgbaImage::from_fn(97, 61, |x, y| Rgba([(x * 2) as u8, (y * 4) as u8, 90, 255]));
        let once = normalize(RawFrame::Rgba(frame), target).unwrap();
        let twice = normalize(RawFrame::Rgba(once.clone()), target).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn encoded_frames_are_decoded() {
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, GREEN))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let out = normalize(RawFrame::Encoded(Bytes::from(png)), NormalizeTarget::new(4, 3)).unwrap();
        assert_eq!(out.dimensions(), (4, 3));
    }

    #[test]
    fn corrupt_frames_fail_to_decode() {
        let err = normalize(
            RawFrame::Encoded(Bytes::from_static(b"definitely not a jpeg")),
            NormalizeTarget::new(4, 3),
        )
        .unwrap_err();
        assert!(matches!(err, NormalizeError::Decode(_)));

        let err = normalize(RawFrame::Rgba(RgbaImage::new(0, 0)), NormalizeTarget::new(4, 3)).unwrap_err();
        assert!(matches!(err, NormalizeError::Empty { .. }));
    }
}
