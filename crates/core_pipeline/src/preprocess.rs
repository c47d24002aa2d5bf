//! Image preprocessing module
//!
//! Classical operations that prepare a photographed list for OCR:
//! - Size normalization (downscale only) and quarter-turn rotation
//! - Grayscale conversion with a contrast/brightness boost
//!
//! Binarization lives in [`crate::threshold`].

use crate::config::{EnhanceConfig, NormalizeConfig};
use crate::error::ImportError;
use crate::types::{RawImage, Rotation};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, RgbaImage};
use tracing::debug;

/// Scale and rotate a source into a bounded RGBA buffer
///
/// The longer side never exceeds `config.max_side`; smaller sources are not
/// upscaled. Rotation is clockwise, swapping width and height for 90/270.
pub fn normalize(
    source: &RawImage,
    rotation: Rotation,
    config: &NormalizeConfig,
) -> Result<RgbaImage, ImportError> {
    let (width, height) = (source.width(), source.height());
    if width == 0 || height == 0 {
        return Err(ImportError::SourceUnavailable { width, height });
    }

    let (target_w, target_h) = scaled_dimensions(width, height, config.max_side);
    let rgba = source.image().to_rgba8();
    let scaled = if (target_w, target_h) == (width, height) {
        rgba
    } else {
        imageops::resize(&rgba, target_w, target_h, FilterType::Triangle)
    };

    let rotated = match rotation {
        Rotation::None => scaled,
        Rotation::Cw90 => imageops::rotate90(&scaled),
        Rotation::Cw180 => imageops::rotate180(&scaled),
        Rotation::Cw270 => imageops::rotate270(&scaled),
    };

    debug!(
        "normalized {}x{} -> {}x{} (rotation {})",
        width,
        height,
        rotated.width(),
        rotated.height(),
        rotation.degrees()
    );
    Ok(rotated)
}

/// Dimensions after proportional downscaling to `max_side`
///
/// A `max_side` of 0 disables the cap.
pub fn scaled_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if max_side == 0 || longest <= max_side {
        return (width, height);
    }
    let scale = f64::from(max_side) / f64::from(longest);
    let w = (f64::from(width) * scale).round() as u32;
    let h = (f64::from(height) * scale).round() as u32;
    (w.max(1), h.max(1))
}

/// ITU-R BT.601 luma of an RGB triple
pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

/// Grayscale the image and push contrast and brightness up
///
/// Each pixel becomes `((luma - 128) * contrast + 128) * brightness + lift`,
/// clamped to 0..=255.
pub fn enhance(input: &RgbaImage, config: &EnhanceConfig) -> Result<GrayImage, ImportError> {
    let (width, height) = input.dimensions();
    if width == 0 || height == 0 {
        return Err(ImportError::SourceUnavailable { width, height });
    }

    let enhanced: GrayImage = ImageBuffer::from_fn(width, height, |x, y| {
        let [r, g, b, _] = input.get_pixel(x, y).0;
        let luma = luminance(r, g, b);
        let boosted = ((luma - 128.0) * config.contrast + 128.0) * config.brightness + config.lift;
        Luma([boosted.round().clamp(0.0, 255.0) as u8])
    });

    debug!("enhanced {}x{} image", width, height);
    Ok(enhanced)
}
