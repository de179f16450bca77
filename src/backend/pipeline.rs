//! Blocking image work run off the UI thread: finishing a raw capture into a
//! shot, and turning a finished session into the encoded composite.

use std::sync::Arc;

use image::RgbaImage;

use super::{
    capture::ComposeRequest,
    imaging::{
        normalize::{normalize, NormalizeError, NormalizeTarget, RawFrame},
        overlay::{LoadedOverlay, OverlayAsset},
    },
    render_take::{compose_layout, encode_jpeg, CompositeImage, LayoutError, LayoutOptions},
};

#[derive(Debug, Clone, Copy)]
pub struct ShotOptions {
    pub target: NormalizeTarget,
    pub mirror: bool,
}

/// Decode, mirror and normalize a still from the camera.
pub fn finish_shot(raw: RawFrame, options: ShotOptions) -> Result<RgbaImage, NormalizeError> {
    let mut frame = raw.decode()?;
    if options.mirror {
        image::imageops::flip_horizontal_in_place(&mut frame);
    }
    let shot = normalize(RawFrame::Rgba(frame), options.target)?;
    log::debug!("finished shot at {}x{}", shot.width(), shot.height());
    Ok(shot)
}

/// Look up and load the selected overlay. Anything that goes wrong here only
/// costs the decoration.
pub fn load_overlay(id: Option<&str>, catalogue: &[OverlayAsset]) -> Option<LoadedOverlay> {
    let id = id?;
    let Some(asset) = catalogue.iter().find(|asset| asset.id == id) else {
        log::warn!("overlay {id:?} is not in the catalogue, composing without it");
        return None;
    };
    match asset.load() {
        Ok(overlay) => Some(overlay),
        Err(err) => {
            log::warn!("{err}, composing without an overlay");
            None
        }
    }
}

/// Filter, frame and lay out the four shots of `request`, then encode the
/// result as JPEG.
pub fn render_composite(
    request: &ComposeRequest,
    catalogue: &[OverlayAsset],
    options: &LayoutOptions,
    jpeg_quality: u8,
) -> Result<CompositeImage, LayoutError> {
    let overlay = load_overlay(request.overlay.as_deref(), catalogue);
    let shots: Vec<RgbaImage> = request
        .shots
        .iter()
        .map(|shot| {
            let mut shot = shot.as_ref().clone();
            request.filter.apply(&mut shot);
            shot
        })
        .collect();
    let options = LayoutOptions {
        background: request.background,
        ..options.clone()
    };

    let pixels = compose_layout(&shots, request.layout, overlay.as_ref(), &options)?;
    let encoded = encode_jpeg(&pixels, jpeg_quality)?;
    log::info!(
        "composite ready: {}x{}, {} KiB",
        pixels.width(),
        pixels.height(),
        encoded.len() / 1024
    );
    Ok(CompositeImage {
        pixels: Arc::new(pixels),
        encoded,
        layout: request.layout,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use image::Rgba;

    use super::*;
    use crate::backend::{imaging::filters::PhotoFilter, render_take::LayoutKind};

    fn request(overlay: Option<&str>) -> ComposeRequest {
        ComposeRequest {
            shots: (0..4)
                .map(|i| Arc::new(RgbaImage::from_pixel(16, 12, Rgba([i * 60, 200, 40, 255]))))
                .collect(),
            layout: LayoutKind::VerticalStrip,
            overlay: overlay.map(str::to_owned),
            filter: PhotoFilter::None,
            background: Rgba([255, 255, 255, 255]),
        }
    }

    fn options() -> LayoutOptions {
        LayoutOptions {
            photo_width: 16,
            photo_height: 12,
            spacing: 2,
            padding: 4,
            ..Default::default()
        }
    }

    #[test]
    fn broken_overlay_still_produces_a_composite() {
        let catalogue = vec![OverlayAsset {
            id: "broken".into(),
            name: "Broken".into(),
            path: PathBuf::from("/nowhere/broken-frame.png"),
        }];
        let composite = render_composite(&request(Some("broken")), &catalogue, &options(), 90).unwrap();
        let without = render_composite(&request(None), &catalogue, &options(), 90).unwrap();
        assert_eq!(composite.pixels, without.pixels);
        for i in 0..4u32 {
            let pixel = composite.pixels.get_pixel(4 + 8, 4 + i * 14 + 6);
            assert_eq!(pixel.0, [i as u8 * 60, 200, 40, 255]);
        }
        assert!(!composite.encoded.is_empty());
    }

    #[test]
    fn unknown_overlay_ids_are_ignored() {
        assert!(load_overlay(Some("nope"), &[]).is_none());
        assert!(load_overlay(None, &[]).is_none());
    }

    #[test]
    fn filter_applies_to_every_shot_and_background_comes_from_the_session() {
        let mut request = request(None);
        request.filter = PhotoFilter::Grayscale;
        let composite = render_composite(&request, &[], &options(), 90).unwrap();
        let pixel = composite.pixels.get_pixel(12, 10);
        assert_eq!(pixel[0], pixel[1]);
        assert_eq!(pixel[1], pixel[2]);
        assert_eq!(*composite.pixels.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn finishing_mirrors_then_normalizes() {
        let raw = RgbaImage::from_fn(40, 30, |x, _| {
            if x < 20 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let options = ShotOptions {
            target: NormalizeTarget::new(40, 30),
            mirror: true,
        };
        let shot = finish_shot(RawFrame::Rgba(raw), options).unwrap();
        assert_eq!(*shot.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
        assert_eq!(*shot.get_pixel(39, 0), Rgba([255, 0, 0, 255]));
    }
}
