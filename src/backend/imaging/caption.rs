use std::{fmt, path::Path};

use image::{Rgba, RgbaImage};
use rusttype::{point, Font, Scale};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("failed to read font {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("{path} is not a usable TrueType/OpenType font")]
    Parse { path: String },
}

static BUNDLED_FONT: &[u8] = include_bytes!("../../../assets/fonts/FiraSans-Regular.ttf");

/// Font used for strip captions and placeholder labels.
#[derive(Clone)]
pub struct CaptionFont {
    font: Font<'static>,
}

impl fmt::Debug for CaptionFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptionFont").finish_non_exhaustive()
    }
}

impl CaptionFont {
    pub fn load(path: &Path) -> Result<Self, CaptionError> {
        let bytes = std::fs::read(path).map_err(|source| CaptionError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(bytes).ok_or_else(|| CaptionError::Parse {
            path: path.display().to_string(),
        })
    }

    /// Fira Sans, shipped with the booth so labels render without any setup.
    pub fn bundled() -> Option<Self> {
        Font::try_from_bytes(BUNDLED_FONT).map(|font| Self { font })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        Font::try_from_vec(bytes).map(|font| Self { font })
    }

    pub fn text_width(&self, px: f32, text: &str) -> f32 {
        if text.is_empty() {
            return 0.0;
        }
        let scale = Scale::uniform(px);
        let v_metrics = self.font.v_metrics(scale);
        self.font
            .layout(text, scale, point(0.0, v_metrics.ascent))
            .filter_map(|glyph| glyph.pixel_bounding_box())
            .map(|bb| bb.max.x as f32)
            .fold(0.0, f32::max)
    }

    /// Draw `text` centered on `(cx, cy)`, blending into the existing pixels.
    pub fn draw_centered(&self, img: &mut RgbaImage, px: f32, cx: f32, cy: f32, color: Rgba<u8>, text: &str) {
        let scale = Scale::uniform(px);
        let v_metrics = self.font.v_metrics(scale);
        let height = (v_metrics.ascent - v_metrics.descent).max(1.0);
        let x = cx - self.text_width(px, text) / 2.0;
        let baseline = cy - height / 2.0 + v_metrics.ascent;

        for glyph in self.font.layout(text, scale, point(x, baseline)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 || px as u32 >= img.width() || py as u32 >= img.height() {
                    return;
                }
                if coverage <= 0.0 {
                    return;
                }
                let dst = img.get_pixel_mut(px as u32, py as u32);
                let inv = 1.0 - coverage;
                for c in 0..3 {
                    dst.0[c] = (color.0[c] as f32 * coverage + dst.0[c] as f32 * inv) as u8;
                }
                dst.0[3] = 255;
            });
        }
    }
}
