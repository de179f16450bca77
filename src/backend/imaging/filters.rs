use std::fmt::Display;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Colour treatment applied to every shot before the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoFilter {
    #[default]
    None,
    Grayscale,
    Sepia,
    Vintage,
    Bright,
    Dark,
}

impl PhotoFilter {
    pub const ALL: [PhotoFilter; 6] = [
        PhotoFilter::None,
        PhotoFilter::Grayscale,
        PhotoFilter::Sepia,
        PhotoFilter::Vintage,
        PhotoFilter::Bright,
        PhotoFilter::Dark,
    ];

    pub fn apply(&self, image: &mut RgbaImage) {
        match self {
            Self::None => {}
            Self::Grayscale => map_rgb(image, |[r, g, b]| {
                let gray = (r + g + b) / 3.0;
                [gray, gray, gray]
            }),
            Self::Sepia => map_rgb(image, |rgb| sepia(rgb, 1.0)),
            Self::Vintage => map_rgb(image, |rgb| {
                let toned = sepia(rgb, 0.5);
                brightness(contrast(toned, 1.2), 1.1)
            }),
            Self::Bright => map_rgb(image, |rgb| brightness(rgb, 1.3)),
            Self::Dark => map_rgb(image, |rgb| brightness(rgb, 0.7)),
        }
    }
}

impl Display for PhotoFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "Original",
            Self::Grayscale => "Black & white",
            Self::Sepia => "Sepia",
            Self::Vintage => "Vintage",
            Self::Bright => "Bright",
            Self::Dark => "Dark",
        })
    }
}

fn map_rgb(image: &mut RgbaImage, f: impl Fn([f32; 3]) -> [f32; 3]) {
    for pixel in image.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let out = f([r as f32, g as f32, b as f32]);
        pixel.0[0] = out[0].round().clamp(0.0, 255.0) as u8;
        pixel.0[1] = out[1].round().clamp(0.0, 255.0) as u8;
        pixel.0[2] = out[2].round().clamp(0.0, 255.0) as u8;
    }
}

/// Sepia tone mixed with the original by `amount` (0..=1).
fn sepia([r, g, b]: [f32; 3], amount: f32) -> [f32; 3] {
    let toned = [
        (r * 0.393 + g * 0.769 + b * 0.189).min(255.0),
        (r * 0.349 + g * 0.686 + b * 0.168).min(255.0),
        (r * 0.272 + g * 0.534 + b * 0.131).min(255.0),
    ];
    [
        r + (toned[0] - r) * amount,
        g + (toned[1] - g) * amount,
        b + (toned[2] - b) * amount,
    ]
}

fn brightness(rgb: [f32; 3], factor: f32) -> [f32; 3] {
    rgb.map(|c| c * factor)
}

fn contrast(rgb: [f32; 3], factor: f32) -> [f32; 3] {
    rgb.map(|c| (c - 127.5) * factor + 127.5)
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn single(pixel: [u8; 4], filter: PhotoFilter) -> [u8; 4] {
        let mut image = RgbaImage::from_pixel(1, 1, Rgba(pixel));
        filter.apply(&mut image);
        image.get_pixel(0, 0).0
    }

    #[test]
    fn none_leaves_pixels_alone() {
        assert_eq!(single([12, 34, 56, 200], PhotoFilter::None), [12, 34, 56, 200]);
    }

    #[test]
    fn grayscale_averages_channels() {
        assert_eq!(single([30, 60, 90, 255], PhotoFilter::Grayscale), [60, 60, 60, 255]);
    }

    #[test]
    fn sepia_saturates_at_white() {
        assert_eq!(single([255, 255, 255, 255], PhotoFilter::Sepia), [255, 255, 239, 255]);
    }

    #[test]
    fn brightness_scales_and_clamps() {
        assert_eq!(single([100, 200, 0, 255], PhotoFilter::Bright), [130, 255, 0, 255]);
        assert_eq!(single([100, 200, 0, 255], PhotoFilter::Dark), [70, 140, 0, 255]);
    }

    #[test]
    fn alpha_is_preserved() {
        for filter in PhotoFilter::ALL {
            assert_eq!(single([10, 20, 30, 77], filter)[3], 77, "{filter}");
        }
    }
}
