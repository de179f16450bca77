use std::{fmt::Display, sync::Arc};

use bytes::Bytes;
use image::{buffer::ConvertBuffer, codecs::jpeg::JpegEncoder, imageops::FilterType, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::imaging::{
    caption::CaptionFont,
    normalize::fit_exact,
    overlay::{apply_prepared, LoadedOverlay},
};

/// Number of shots in one take.
pub const SHOT_COUNT: usize = 4;

const PLACEHOLDER_FILL: Rgba<u8> = Rgba([0xf0, 0xf0, 0xf0, 0xff]);
const PLACEHOLDER_TEXT: Rgba<u8> = Rgba([0x99, 0x99, 0x99, 0xff]);
const HEADER_TEXT: Rgba<u8> = Rgba([0x33, 0x33, 0x33, 0xff]);
const FOOTER_TEXT: Rgba<u8> = Rgba([0x66, 0x66, 0x66, 0xff]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    #[default]
    VerticalStrip,
    Grid2x2,
}

impl LayoutKind {
    pub const ALL: [LayoutKind; 2] = [LayoutKind::VerticalStrip, LayoutKind::Grid2x2];
}

impl Display for LayoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::VerticalStrip => "Strip (1×4)",
            Self::Grid2x2 => "Grid (2×2)",
        })
    }
}

#[derive(Debug, Clone)]
pub struct LayoutOptions {
    /// Cell size of the vertical strip (normally the normalized photo size).
    pub photo_width: u32,
    pub photo_height: u32,
    /// Edge length of each square cell in the 2×2 grid.
    pub grid_cell_size: u32,
    pub spacing: u32,
    pub padding: u32,
    pub background: Rgba<u8>,
    pub header_text: Option<String>,
    pub footer_text: Option<String>,
    pub caption_band_height: u32,
    pub caption_font_size: f32,
    pub font: Option<Arc<CaptionFont>>,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            photo_width: 1600,
            photo_height: 1200,
            grid_cell_size: 1200,
            spacing: 20,
            padding: 40,
            background: Rgba([0, 0, 0, 255]),
            header_text: None,
            footer_text: None,
            caption_band_height: 120,
            caption_font_size: 48.0,
            font: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }
}

/// Where everything goes on the output canvas. Depends only on the layout
/// kind and the options, never on shot content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutGeometry {
    pub kind: LayoutKind,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub slots: [Rect; SHOT_COUNT],
    pub header: Option<Rect>,
    pub footer: Option<Rect>,
}

impl LayoutGeometry {
    pub fn new(kind: LayoutKind, options: &LayoutOptions) -> Self {
        let LayoutOptions {
            spacing, padding, ..
        } = *options;
        match kind {
            LayoutKind::VerticalStrip => {
                let (width, height) = (options.photo_width, options.photo_height);
                let band = options.caption_band_height;
                let header_height = if options.header_text.is_some() { band } else { 0 };
                let footer_height = if options.footer_text.is_some() { band } else { 0 };
                let canvas_width = width + 2 * padding;
                let canvas_height =
                    4 * height + 3 * spacing + 2 * padding + header_height + footer_height;
                let slots = std::array::from_fn(|i| Rect {
                    x: padding,
                    y: padding + header_height + i as u32 * (height + spacing),
                    width,
                    height,
                });
                let header = (header_height > 0).then_some(Rect {
                    x: 0,
                    y: padding,
                    width: canvas_width,
                    height: header_height,
                });
                let footer = (footer_height > 0).then_some(Rect {
                    x: 0,
                    y: canvas_height - padding - footer_height,
                    width: canvas_width,
                    height: footer_height,
                });
                Self {
                    kind,
                    canvas_width,
                    canvas_height,
                    slots,
                    header,
                    footer,
                }
            }
            LayoutKind::Grid2x2 => {
                let cell = options.grid_cell_size;
                let side = 2 * cell + spacing + 2 * padding;
                // top-left, top-right, bottom-left, bottom-right
                let slots = std::array::from_fn(|i| Rect {
                    x: padding + (i as u32 % 2) * (cell + spacing),
                    y: padding + (i as u32 / 2) * (cell + spacing),
                    width: cell,
                    height: cell,
                });
                Self {
                    kind,
                    canvas_width: side,
                    canvas_height: side,
                    slots,
                    header: None,
                    footer: None,
                }
            }
        }
    }

    pub fn cell_size(&self) -> (u32, u32) {
        (self.slots[0].width, self.slots[0].height)
    }
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("a take needs exactly {SHOT_COUNT} shots, got {0}")]
    ShotCount(usize),
    #[error("none of the shots could be drawn")]
    NoValidShots,
    #[error("failed to encode composite: {0}")]
    Encode(#[from] image::ImageError),
}

/// The finished take, kept both as pixels (for display) and as the encoded
/// bytes that get uploaded or saved.
#[derive(Debug, Clone)]
pub struct CompositeImage {
    pub pixels: Arc<RgbaImage>,
    pub encoded: Bytes,
    pub layout: LayoutKind,
}

/// Rasterize an overlay for one cell of the given layout. Failures are logged
/// and treated as "no overlay".
pub fn prepare_overlay(
    overlay: Option<&LoadedOverlay>,
    geometry: &LayoutGeometry,
) -> Option<RgbaImage> {
    let (width, height) = geometry.cell_size();
    match overlay?.rasterize(width, height) {
        Ok(prepared) => Some(prepared),
        Err(err) => {
            log::warn!("overlay unavailable, composing without it: {err}");
            None
        }
    }
}

/// Arrange four shots into `kind`, drawing the overlay over every shot.
pub fn compose_layout(
    shots: &[RgbaImage],
    kind: LayoutKind,
    overlay: Option<&LoadedOverlay>,
    options: &LayoutOptions,
) -> Result<RgbaImage, LayoutError> {
    let geometry = LayoutGeometry::new(kind, options);
    let prepared = prepare_overlay(overlay, &geometry);
    compose_prepared(shots, &geometry, prepared.as_ref(), options)
}

/// Same as [`compose_layout`] with the overlay already rasterized at cell
/// size, so per-frame callers only pay for it once.
pub fn compose_prepared(
    shots: &[RgbaImage],
    geometry: &LayoutGeometry,
    overlay: Option<&RgbaImage>,
    options: &LayoutOptions,
) -> Result<RgbaImage, LayoutError> {
    if shots.len() != SHOT_COUNT {
        return Err(LayoutError::ShotCount(shots.len()));
    }

    let mut canvas = RgbaImage::from_pixel(
        geometry.canvas_width,
        geometry.canvas_height,
        options.background,
    );

    let mut drawn = 0;
    for (i, (shot, slot)) in shots.iter().zip(geometry.slots.iter()).enumerate() {
        match fit_to_slot(shot, geometry.kind, slot) {
            Some(mut cell) => {
                if let Some(overlay) = overlay {
                    apply_prepared(&mut cell, overlay);
                }
                for pixel in cell.pixels_mut() {
                    pixel.0[3] = 255;
                }
                image::imageops::replace(&mut canvas, &cell, slot.x as i64, slot.y as i64);
                drawn += 1;
            }
            None => {
                log::warn!(
                    "shot {} ({}x{}) could not be drawn, using a placeholder",
                    i + 1,
                    shot.width(),
                    shot.height()
                );
                draw_placeholder(&mut canvas, slot, options);
            }
        }
    }
    if drawn == 0 {
        return Err(LayoutError::NoValidShots);
    }

    draw_captions(&mut canvas, geometry, options);
    log::debug!(
        "composed {:?} take at {}x{}",
        geometry.kind,
        canvas.width(),
        canvas.height()
    );
    Ok(canvas)
}

fn fit_to_slot(shot: &RgbaImage, kind: LayoutKind, slot: &Rect) -> Option<RgbaImage> {
    if shot.width() == 0 || shot.height() == 0 {
        return None;
    }
    let cell = match kind {
        LayoutKind::VerticalStrip => fit_exact(shot, slot.width, slot.height),
        LayoutKind::Grid2x2 => {
            let square = super::imaging::normalize::center_crop(shot, 1.0);
            if square.dimensions() == (slot.width, slot.height) {
                square
            } else {
                image::imageops::resize(&square, slot.width, slot.height, FilterType::Lanczos3)
            }
        }
    };
    Some(cell)
}

fn draw_placeholder(canvas: &mut RgbaImage, slot: &Rect, options: &LayoutOptions) {
    for y in slot.y..slot.y + slot.height {
        for x in slot.x..slot.x + slot.width {
            canvas.put_pixel(x, y, PLACEHOLDER_FILL);
        }
    }
    if let Some(font) = &options.font {
        let (cx, cy) = slot.center();
        font.draw_centered(
            canvas,
            options.caption_font_size * 0.8,
            cx,
            cy,
            PLACEHOLDER_TEXT,
            "Photo unavailable",
        );
    }
}

fn draw_captions(canvas: &mut RgbaImage, geometry: &LayoutGeometry, options: &LayoutOptions) {
    let Some(font) = &options.font else {
        if options.header_text.is_some() || options.footer_text.is_some() {
            log::debug!("no caption font configured, leaving caption bands empty");
        }
        return;
    };
    let bands = [
        (geometry.header, options.header_text.as_deref(), HEADER_TEXT, 1.0),
        (geometry.footer, options.footer_text.as_deref(), FOOTER_TEXT, 0.75),
    ];
    for (band, text, color, size) in bands {
        if let (Some(band), Some(text)) = (band, text) {
            let (cx, cy) = band.center();
            let color = caption_color(options.background, color);
            font.draw_centered(canvas, options.caption_font_size * size, cx, cy, color, text);
        }
    }
}

/// Keeps captions readable: `base` on light backgrounds, its inverse on dark
/// ones.
fn caption_color(background: Rgba<u8>, base: Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, _] = background.0;
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luma >= 128.0 {
        base
    } else {
        let [r, g, b, a] = base.0;
        Rgba([255 - r, 255 - g, 255 - b, a])
    }
}

/// Encode as a lossy JPEG; alpha is dropped.
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Bytes, LayoutError> {
    let rgb: image::RgbImage = image.convert();
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(Bytes::from(encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BG: Rgba<u8> = Rgba([10, 20, 30, 255]);

    fn small_options() -> LayoutOptions {
        LayoutOptions {
            photo_width: 40,
            photo_height: 30,
            grid_cell_size: 30,
            spacing: 4,
            padding: 6,
            background: BG,
            ..Default::default()
        }
    }

    fn solid(width: u32, height: u32, value: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([value, 255 - value, value / 2, 255]))
    }

    fn four_distinct(width: u32, height: u32) -> Vec<RgbaImage> {
        (0..4).map(|i| solid(width, height, 40 + i as u8 * 50)).collect()
    }

    #[test]
    fn vertical_strip_dimensions() {
        let options = small_options();
        let geometry = LayoutGeometry::new(LayoutKind::VerticalStrip, &options);
        assert_eq!(geometry.canvas_width, 40 + 2 * 6);
        assert_eq!(geometry.canvas_height, 4 * 30 + 3 * 4 + 2 * 6);
        let ys: Vec<u32> = geometry.slots.iter().map(|s| s.y).collect();
        assert_eq!(ys, vec![6, 40, 74, 108]);
    }

    #[test]
    fn caption_bands_extend_the_strip() {
        let options = LayoutOptions {
            header_text: Some("Booth".into()),
            footer_text: Some("2026-10-17".into()),
            caption_band_height: 16,
            ..small_options()
        };
        let geometry = LayoutGeometry::new(LayoutKind::VerticalStrip, &options);
        assert_eq!(geometry.canvas_height, 4 * 30 + 3 * 4 + 2 * 6 + 2 * 16);
        assert_eq!(geometry.slots[0].y, 6 + 16);
        assert_eq!(geometry.footer.unwrap().y, geometry.canvas_height - 6 - 16);
    }

    #[test]
    fn grid_dimensions_and_order() {
        let geometry = LayoutGeometry::new(LayoutKind::Grid2x2, &small_options());
        assert_eq!(geometry.canvas_width, 2 * 30 + 4 + 2 * 6);
        assert_eq!(geometry.canvas_width, geometry.canvas_height);
        let origins: Vec<(u32, u32)> = geometry.slots.iter().map(|s| (s.x, s.y)).collect();
        assert_eq!(origins, vec![(6, 6), (40, 6), (6, 40), (40, 40)]);
    }

    #[test]
    fn dimensions_do_not_depend_on_content() {
        let options = small_options();
        for kind in LayoutKind::ALL {
            let a = compose_layout(&four_distinct(40, 30), kind, None, &options).unwrap();
            let b = compose_layout(&four_distinct(400, 100), kind, None, &options).unwrap();
            assert_eq!(a.dimensions(), b.dimensions(), "{kind}");
        }
    }

    #[test]
    fn shots_are_placed_in_capture_order() {
        let options = small_options();
        let shots = four_distinct(40, 30);
        for kind in LayoutKind::ALL {
            let geometry = LayoutGeometry::new(kind, &options);
            let out = compose_layout(&shots, kind, None, &options).unwrap();
            for (shot, slot) in shots.iter().zip(geometry.slots.iter()) {
                let (cx, cy) = slot.center();
                assert_eq!(out.get_pixel(cx as u32, cy as u32), shot.get_pixel(0, 0));
            }
            assert_eq!(*out.get_pixel(0, 0), BG);
        }
    }

    #[test]
    fn grid_cells_are_center_cropped_not_squashed() {
        // 4:3 shot: red outer columns, green middle square
        let shot = RgbaImage::from_fn(40, 30, |x, _| {
            if (5..35).contains(&x) {
                Rgba([0, 255, 0, 255])
            } else {
                Rgba([255, 0, 0, 255])
            }
        });
        let shots = vec![shot; 4];
        let options = small_options();
        let geometry = LayoutGeometry::new(LayoutKind::Grid2x2, &options);
        let out = compose_layout(&shots, LayoutKind::Grid2x2, None, &options).unwrap();
        for slot in &geometry.slots {
            for y in slot.y..slot.y + slot.height {
                for x in slot.x..slot.x + slot.width {
                    assert_eq!(*out.get_pixel(x, y), Rgba([0, 255, 0, 255]));
                }
            }
        }
    }

    #[test]
    fn a_bad_shot_becomes_a_placeholder() {
        let options = small_options();
        let mut shots = four_distinct(40, 30);
        shots[2] = RgbaImage::new(0, 0);
        let geometry = LayoutGeometry::new(LayoutKind::VerticalStrip, &options);
        let out = compose_layout(&shots, LayoutKind::VerticalStrip, None, &options).unwrap();
        let (cx, cy) = geometry.slots[2].center();
        assert_eq!(*out.get_pixel(cx as u32, cy as u32), PLACEHOLDER_FILL);
        let (cx, cy) = geometry.slots[3].center();
        assert_eq!(out.get_pixel(cx as u32, cy as u32), shots[3].get_pixel(0, 0));
    }

    fn ink_in(image: &RgbaImage, rect: Rect, blank: Rgba<u8>) -> Vec<Rgba<u8>> {
        (rect.y..rect.y + rect.height)
            .flat_map(|y| (rect.x..rect.x + rect.width).map(move |x| (x, y)))
            .map(|(x, y)| *image.get_pixel(x, y))
            .filter(|pixel| *pixel != blank)
            .collect()
    }

    fn labelled_options() -> LayoutOptions {
        LayoutOptions {
            photo_width: 160,
            photo_height: 120,
            caption_band_height: 40,
            caption_font_size: 24.0,
            header_text: Some("Spring Fair".into()),
            footer_text: Some("2026-10-17".into()),
            font: CaptionFont::bundled().map(Arc::new),
            ..small_options()
        }
    }

    #[test]
    fn placeholder_slots_carry_a_label() {
        let options = labelled_options();
        let mut shots = four_distinct(160, 120);
        shots[0] = RgbaImage::new(0, 0);
        let geometry = LayoutGeometry::new(LayoutKind::VerticalStrip, &options);
        let out = compose_layout(&shots, LayoutKind::VerticalStrip, None, &options).unwrap();
        let label = ink_in(&out, geometry.slots[0], PLACEHOLDER_FILL);
        assert!(!label.is_empty());
        assert!(label.iter().all(|pixel| pixel.0[0] < PLACEHOLDER_FILL.0[0]));
    }

    #[test]
    fn header_and_footer_are_drawn_in_their_bands() {
        let options = labelled_options();
        let geometry = LayoutGeometry::new(LayoutKind::VerticalStrip, &options);
        let out = compose_layout(&four_distinct(160, 120), LayoutKind::VerticalStrip, None, &options).unwrap();
        for band in [geometry.header.unwrap(), geometry.footer.unwrap()] {
            let ink = ink_in(&out, band, BG);
            assert!(!ink.is_empty(), "{band:?} is empty");
            // BG is dark, so the text is lightened to stay readable
            assert!(ink.iter().any(|pixel| pixel.0[0] > 128));
        }

        let white = LayoutOptions {
            background: Rgba([255, 255, 255, 255]),
            ..options
        };
        let out = compose_layout(&four_distinct(160, 120), LayoutKind::VerticalStrip, None, &white).unwrap();
        let ink = ink_in(&out, geometry.header.unwrap(), white.background);
        assert!(ink.iter().any(|pixel| pixel.0[0] < 128));
    }

    #[test]
    fn wrong_shot_count_or_no_drawable_shots_fail() {
        let options = small_options();
        let err = compose_layout(&four_distinct(40, 30)[..3], LayoutKind::Grid2x2, None, &options).unwrap_err();
        assert!(matches!(err, LayoutError::ShotCount(3)));
        let empty = vec![RgbaImage::new(0, 0); 4];
        let err = compose_layout(&empty, LayoutKind::VerticalStrip, None, &options).unwrap_err();
        assert!(matches!(err, LayoutError::NoValidShots));
    }

    #[test]
    fn overlay_is_drawn_on_every_cell() {
        let options = small_options();
        let overlay = LoadedOverlay::Raster(Arc::new(RgbaImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })));
        let geometry = LayoutGeometry::new(LayoutKind::VerticalStrip, &options);
        let shots = four_distinct(40, 30);
        let out = compose_layout(&shots, LayoutKind::VerticalStrip, Some(&overlay), &options).unwrap();
        for (shot, slot) in shots.iter().zip(geometry.slots.iter()) {
            let mid = slot.y + slot.height / 2;
            assert_eq!(*out.get_pixel(slot.x + 2, mid), Rgba([255, 255, 255, 255]));
            assert_eq!(out.get_pixel(slot.x + slot.width - 2, mid), shot.get_pixel(0, 0));
        }
    }

    #[test]
    fn jpeg_output_decodes_at_canvas_size() {
        let options = small_options();
        let out = compose_layout(&four_distinct(40, 30), LayoutKind::Grid2x2, None, &options).unwrap();
        let encoded = encode_jpeg(&out, 90).unwrap();
        let decoded = image::load_from_memory(&encoded).unwrap();
        assert_eq!((decoded.width(), decoded.height()), out.dimensions());
    }
}
