//! Display and download effects.
//!
//! Effects are never baked into a processed raster. They are applied
//! fresh, from current settings, whenever a preview or an export is
//! rendered, so toggling an effect never re-runs keying.
//!
//! Order is fixed:
//!
//! 1. Background fill of fully transparent pixels. Always for [`EffectTarget::Display`]; for
//!    [`EffectTarget::Download`] only when `save_with_background` is set.
//! 2. Ink stamp. A binary stylization; when enabled it decides every
//!    pixel and the adjustments below are skipped.
//! 3. Per-pixel adjustments, skipping fully transparent pixels:
//!    brightness, contrast, vibrance, hue, colorize, black-and-white,
//!    invert.

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::color::{Color, THRESHOLD_SCALE, luminance};
use crate::region::{SpeckPass, highlight_specks_over};
use crate::scan::ScanLimits;
use crate::settings::{EditorSettings, EffectSettings, ImageEffects, InkStampSettings};
use crate::trim::trim;
use crate::types::{EngineError, RgbaImage};

/// Where the rendered raster is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectTarget {
    /// On-screen preview.
    Display,
    /// Exported file.
    Download,
}

/// Apply `effects` to a copy of `image` for the given target.
#[must_use = "returns the rendered raster"]
pub fn apply_effects(image: &RgbaImage, effects: &EffectSettings, target: EffectTarget) -> RgbaImage {
    let mut out = image.clone();
    let bg = &effects.background;
    if bg.enabled && (target == EffectTarget::Display || bg.save_with_background) {
        composite_background(&mut out, bg.color);
    }
    if effects.ink_stamp.enabled {
        ink_stamp(&mut out, &effects.ink_stamp);
    } else if !effects.image_effects.is_identity() {
        adjust(&mut out, &effects.image_effects);
    }
    out
}

/// Fill fully transparent pixels with the background color at full
/// opacity. Partially transparent pixels are left as they are.
pub fn composite_background(image: &mut RgbaImage, color: Color) {
    let fill = color.with_alpha(255);
    for pixel in image.pixels_mut().filter(|p| p.0[3] == 0) {
        *pixel = fill;
    }
}

/// Binary stylization on luminance.
///
/// Visible pixels darker than `(100 - threshold) * 2.55` become the stamp
/// color at full opacity; the rest become fully transparent.
pub fn ink_stamp(image: &mut RgbaImage, settings: &InkStampSettings) {
    let cutoff = f32::from(100u8.saturating_sub(settings.threshold)) * THRESHOLD_SCALE;
    let ink = settings.color.with_alpha(255);
    for pixel in image.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        if a == 0 {
            continue;
        }
        if luminance(r, g, b) < cutoff {
            *pixel = ink;
        } else {
            pixel.0[3] = 0;
        }
    }
}

/// Apply the per-pixel adjustments in order.
pub fn adjust(image: &mut RgbaImage, fx: &ImageEffects) {
    for pixel in image.pixels_mut() {
        if pixel.0[3] > 0 {
            adjust_pixel(pixel, fx);
        }
    }
}

#[expect(clippy::cast_precision_loss)]
fn adjust_pixel(pixel: &mut Rgba<u8>, fx: &ImageEffects) {
    let mut rgb = [pixel.0[0], pixel.0[1], pixel.0[2]].map(f32::from);

    if fx.brightness != 0 {
        let offset = fx.brightness as f32 * THRESHOLD_SCALE;
        rgb = rgb.map(|c| clamp_channel(c + offset));
    }

    if fx.contrast != 0 {
        let factor = (fx.contrast as f32 + 100.0) / 100.0;
        rgb = rgb.map(|c| clamp_channel((c - 128.0).mul_add(factor, 128.0)));
    }

    if fx.vibrance != 0 {
        rgb = vibrance(rgb, fx.vibrance as f32 / 100.0);
    }

    if fx.hue != 0 {
        let (h, s, l) = rgb_to_hsl(rgb.map(|c| c / 255.0));
        let h = (h + fx.hue as f32 / 360.0).rem_euclid(1.0);
        rgb = hsl_to_rgb(h, s, l).map(|c| clamp_channel(c * 255.0));
    }

    if fx.colorize.enabled {
        let gray = luma(rgb);
        let l = (gray / 255.0 + fx.colorize.lightness as f32 / 200.0).clamp(0.0, 1.0);
        let tint = hsl_to_rgb(
            fx.colorize.hue as f32 / 360.0,
            fx.colorize.saturation as f32 / 100.0,
            l,
        );
        rgb = tint.map(|t| clamp_channel(gray.mul_add(0.5, t * 255.0 * 0.5)));
    }

    if fx.black_and_white {
        let gray = clamp_channel(luma(rgb));
        rgb = [gray; 3];
    }

    if fx.invert {
        rgb = rgb.map(|c| 255.0 - c);
    }

    for (dst, c) in pixel.0.iter_mut().zip(rgb) {
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            *dst = c.round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn clamp_channel(c: f32) -> f32 {
    c.clamp(0.0, 255.0)
}

fn luma([r, g, b]: [f32; 3]) -> f32 {
    0.114f32.mul_add(b, 0.299f32.mul_add(r, 0.587 * g))
}

/// Push channels away from their mean, less so for already saturated
/// pixels. Fully saturated pixels are left alone.
fn vibrance(rgb: [f32; 3], amount: f32) -> [f32; 3] {
    let max = rgb[0].max(rgb[1]).max(rgb[2]);
    let min = rgb[0].min(rgb[1]).min(rgb[2]);
    let sat = (max - min) / 255.0;
    if sat >= 1.0 {
        return rgb;
    }
    let avg = (rgb[0] + rgb[1] + rgb[2]) / 3.0;
    let k = amount * (1.0 - sat);
    rgb.map(|c| clamp_channel((c - avg).mul_add(k, c)))
}

/// RGB in `0..=1` to `(h, s, l)`, each in `0..=1`.
fn rgb_to_hsl([r, g, b]: [f32; 3]) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let d = max - min;
    if d.abs() < 1e-6 {
        return (0.0, 0.0, l);
    }
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if (max - r).abs() < 1e-6 {
        ((g - b) / d).rem_euclid(6.0)
    } else if (max - g).abs() < 1e-6 {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h / 6.0, s, l)
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [f32; 3] {
    if s.abs() < 1e-6 {
        return [l; 3];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l.mul_add(-s, l + s) };
    let p = 2.0f32.mul_add(l, -q);
    [
        hue_to_channel(p, q, h + 1.0 / 3.0),
        hue_to_channel(p, q, h),
        hue_to_channel(p, q, h - 1.0 / 3.0),
    ]
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        ((q - p) * 6.0).mul_add(t, p)
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        ((q - p) * (2.0 / 3.0 - t)).mul_add(6.0, p)
    } else {
        p
    }
}

/// Render a processed raster for on-screen preview.
///
/// Display effects are applied, then, when speck highlighting is on, the
/// glow is painted over the result using specks found in `processed`.
///
/// # Errors
///
/// Only fails if effects changed the raster size, which they do not.
pub fn render_preview(
    processed: &RgbaImage,
    settings: &EditorSettings,
    limits: ScanLimits,
) -> Result<RgbaImage, EngineError> {
    let shown = apply_effects(processed, &settings.effects, EffectTarget::Display);
    let speckle = &settings.speckle;
    if !(speckle.enabled && speckle.highlight_specks()) {
        return Ok(shown);
    }
    let SpeckPass { image, specks, .. } =
        highlight_specks_over(processed, &shown, speckle.min_speck_size, limits)?;
    log::debug!("preview highlights {specks} specks");
    Ok(image)
}

/// Render a processed raster for export: optional trim, then download
/// effects.
#[must_use = "returns the rendered raster"]
pub fn render_download(processed: &RgbaImage, effects: &EffectSettings) -> RgbaImage {
    if effects.download.trim_transparent_pixels {
        apply_effects(&trim(processed), effects, EffectTarget::Download)
    } else {
        apply_effects(processed, effects, EffectTarget::Download)
    }
}
