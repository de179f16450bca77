use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use image::RgbaImage;
use resvg::{tiny_skia, usvg};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A decorative frame the guest can lay over every shot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayAsset {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

impl std::fmt::Display for OverlayAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Error)]
pub enum OverlayLoadError {
    #[error("failed to read overlay {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode overlay {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("failed to parse svg overlay {}: {message}", .path.display())]
    Svg { path: PathBuf, message: String },
    #[error("cannot rasterize overlay at {width}x{height}")]
    Raster { width: u32, height: u32 },
}

/// An overlay read into memory, ready to be stretched onto any photo size.
#[derive(Debug, Clone)]
pub enum LoadedOverlay {
    Raster(Arc<RgbaImage>),
    Vector(Arc<usvg::Tree>),
}

impl OverlayAsset {
    pub fn load(&self) -> Result<LoadedOverlay, OverlayLoadError> {
        let bytes = std::fs::read(&self.path).map_err(|source| OverlayLoadError::Read {
            path: self.path.clone(),
            source,
        })?;
        LoadedOverlay::from_bytes(&bytes, &self.path)
    }
}

fn looks_like_svg(bytes: &[u8], path: &Path) -> bool {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let head = head.trim_start();
    by_extension || head.starts_with("<svg") || head.starts_with("<?xml")
}

impl LoadedOverlay {
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self, OverlayLoadError> {
        if looks_like_svg(bytes, path) {
            let tree = usvg::Tree::from_data(bytes, &usvg::Options::default()).map_err(|err| {
                OverlayLoadError::Svg {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                }
            })?;
            Ok(Self::Vector(Arc::new(tree)))
        } else {
            let image = image::load_from_memory(bytes).map_err(|source| OverlayLoadError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(Self::Raster(Arc::new(image.to_rgba8())))
        }
    }

    /// Stretch (never crop) the overlay to exactly `width`x`height`.
    pub fn rasterize(&self, width: u32, height: u32) -> Result<RgbaImage, OverlayLoadError> {
        if width == 0 || height == 0 {
            return Err(OverlayLoadError::Raster { width, height });
        }
        match self {
            Self::Raster(image) => {
                if image.dimensions() == (width, height) {
                    Ok(image.as_ref().clone())
                } else {
                    Ok(image::imageops::resize(
                        image.as_ref(),
                        width,
                        height,
                        image::imageops::FilterType::Triangle,
                    ))
                }
            }
            Self::Vector(tree) => {
                let size = tree.size();
                let mut pixmap = tiny_skia::Pixmap::new(width, height)
                    .ok_or(OverlayLoadError::Raster { width, height })?;
                let transform = tiny_skia::Transform::from_scale(
                    width as f32 / size.width(),
                    height as f32 / size.height(),
                );
                resvg::render(tree, transform, &mut pixmap.as_mut());
                // tiny-skia hands back premultiplied alpha
                let data: Vec<u8> = pixmap
                    .pixels()
                    .iter()
                    .flat_map(|pixel| {
                        let color = pixel.demultiply();
                        [color.red(), color.green(), color.blue(), color.alpha()]
                    })
                    .collect();
                RgbaImage::from_raw(width, height, data).ok_or(OverlayLoadError::Raster { width, height })
            }
        }
    }
}

/// Draw an already-rasterized overlay over `photo` (alpha-over).
pub fn apply_prepared(photo: &mut RgbaImage, prepared: &RgbaImage) {
    image::imageops::overlay(photo, prepared, 0, 0);
}

/// Lay `overlay` over `photo`, keeping the photo's dimensions.
///
/// Overlays are cosmetic: a missing overlay is a no-op and one that cannot be
/// rasterized leaves the photo as it was.
pub fn apply_overlay(mut photo: RgbaImage, overlay: Option<&LoadedOverlay>) -> RgbaImage {
    let Some(overlay) = overlay else {
        return photo;
    };
    match overlay.rasterize(photo.width(), photo.height()) {
        Ok(prepared) => apply_prepared(&mut photo, &prepared),
        Err(err) => log::warn!("skipping overlay: {err}"),
    }
    photo
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn border_overlay(width: u32, height: u32) -> LoadedOverlay {
        LoadedOverlay::Raster(Arc::new(RgbaImage::from_fn(width, height, |x, y| {
            if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })))
    }

    #[test]
    fn missing_overlay_is_a_no_op() {
        let photo = RgbaImage::from_pixel(5, 4, BLUE);
        assert_eq!(apply_overlay(photo.clone(), None), photo);
    }

    #[test]
    fn opaque_overlay_pixels_win_and_transparent_ones_show_the_photo() {
        let photo = RgbaImage::from_pixel(8, 6, BLUE);
        let out = apply_overlay(photo, Some(&border_overlay(8, 6)));
        assert_eq!(out.dimensions(), (8, 6));
        assert_eq!(*out.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*out.get_pixel(4, 3), BLUE);
    }

    #[test]
    fn overlay_is_stretched_to_the_photo() {
        let photo = RgbaImage::from_pixel(40, 20, BLUE);
        let out = apply_overlay(photo, Some(&border_overlay(4, 4)));
        assert_eq!(out.dimensions(), (40, 20));
        assert_eq!(*out.get_pixel(20, 10), BLUE);
    }

    #[test]
    fn svg_overlays_rasterize_at_the_requested_size() {
        let svg = br##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <rect x="0" y="0" width="10" height="5" fill="#ff0000"/>
        </svg>"##;
        let overlay = LoadedOverlay::from_bytes(svg, Path::new("frame.svg")).unwrap();
        let raster = overlay.rasterize(30, 20).unwrap();
        assert_eq!(raster.dimensions(), (30, 20));
        assert_eq!(*raster.get_pixel(15, 2), Rgba([255, 0, 0, 255]));
        assert_eq!(raster.get_pixel(15, 18)[3], 0);
    }

    #[test]
    fn translucent_svg_pixels_keep_their_color() {
        let svg = br##"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="4">
            <rect width="4" height="4" fill="#ff8000" fill-opacity="0.5"/>
        </svg>"##;
        let overlay = LoadedOverlay::from_bytes(svg, Path::new("tint.svg")).unwrap();
        let pixel = *overlay.rasterize(4, 4).unwrap().get_pixel(2, 2);
        assert!((120..=136).contains(&pixel[3]), "{pixel:?}");
        assert!(pixel[0] >= 250, "{pixel:?}");
        assert!((120..=136).contains(&pixel[1]), "{pixel:?}");
        assert_eq!(pixel[2], 0);
    }

    #[test]
    fn unreadable_assets_report_a_load_error() {
        let asset = OverlayAsset {
            id: "gone".into(),
            name: "Gone".into(),
            path: PathBuf::from("/definitely/not/here/frame.png"),
        };
        assert!(matches!(asset.load(), Err(OverlayLoadError::Read { .. })));
        let garbage = LoadedOverlay::from_bytes(b"\x00\x01\x02", Path::new("frame.png"));
        assert!(matches!(garbage, Err(OverlayLoadError::Decode { .. })));
    }
}
