//! Alpha edge cleanup around keyed-out regions.
//!
//! Two passes, each optional and applied in this order:
//!
//! 1. [`feather_edges`]: opaque pixels within `radius` (L1) of a
//!    transparent pixel get their alpha scaled by `d / (radius + 1)`,
//!    softening the hard cut left by keying.
//! 2. [`erode_edges`]: opaque pixels within `radius` (L∞) of a transparent
//!    pixel become fully transparent, shrinking the subject.
//!
//! Both are built on [`imageproc::distance_transform`] over a mask of
//! transparent pixels; the image border does not count as transparent.

use image::{GrayImage, Luma};
use imageproc::distance_transform::{Norm, distance_transform};
use imageproc::morphology::erode;

use crate::settings::EdgeCleanupSettings;
use crate::types::RgbaImage;

/// Result of an edge pass.
#[derive(Debug, Clone)]
pub struct EdgePass {
    /// The adjusted raster.
    pub image: RgbaImage,
    /// Pixels whose alpha changed.
    pub pixels_changed: usize,
}

fn transparent_mask(image: &RgbaImage) -> Option<GrayImage> {
    let mut any = false;
    let mask = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let clear = image.get_pixel(x, y).0[3] == 0;
        any |= clear;
        Luma([if clear { 255 } else { 0 }])
    });
    any.then_some(mask)
}

/// Feather the alpha boundary over a band `radius` pixels wide.
///
/// A `radius` of zero, or a raster with no transparent pixel, is returned
/// unchanged.
#[must_use = "returns the feathered raster"]
pub fn feather_edges(image: &RgbaImage, radius: u8) -> EdgePass {
    let mut out = image.clone();
    let Some(mask) = transparent_mask(image).filter(|_| radius > 0) else {
        return EdgePass {
            image: out,
            pixels_changed: 0,
        };
    };

    let distances = distance_transform(&mask, Norm::L1);
    let steps = u16::from(radius) + 1;
    let mut pixels_changed = 0;
    for (pixel, d) in out.pixels_mut().zip(distances.pixels()) {
        let d = d.0[0];
        if pixel.0[3] == 0 || d == 0 || d > radius {
            continue;
        }
        let scaled = u16::from(pixel.0[3]) * u16::from(d) / steps;
        #[expect(clippy::cast_possible_truncation)]
        let alpha = scaled as u8;
        if alpha != pixel.0[3] {
            pixel.0[3] = alpha;
            pixels_changed += 1;
        }
    }

    EdgePass {
        image: out,
        pixels_changed,
    }
}

/// Shrink the opaque region by `radius` pixels.
#[must_use = "returns the eroded raster"]
pub fn erode_edges(image: &RgbaImage, radius: u8) -> EdgePass {
    let mut out = image.clone();
    if radius == 0 || transparent_mask(image).is_none() {
        return EdgePass {
            image: out,
            pixels_changed: 0,
        };
    }

    let opaque = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([if image.get_pixel(x, y).0[3] > 0 { 255 } else { 0 }])
    });
    let kept = erode(&opaque, Norm::LInf, radius);
    let mut pixels_changed = 0;
    for (pixel, k) in out.pixels_mut().zip(kept.pixels()) {
        if pixel.0[3] > 0 && k.0[0] == 0 {
            pixel.0[3] = 0;
            pixels_changed += 1;
        }
    }

    EdgePass {
        image: out,
        pixels_changed,
    }
}

/// Run whichever passes `settings` enables, feathering first.
#[must_use = "returns the cleaned raster"]
pub fn clean_edges(image: &RgbaImage, settings: &EdgeCleanupSettings) -> EdgePass {
    let mut pass = EdgePass {
        image: image.clone(),
        pixels_changed: 0,
    };
    if settings.enabled {
        let feathered = feather_edges(&pass.image, settings.trim_radius);
        pass.pixels_changed += feathered.pixels_changed;
        pass.image = feathered.image;
    }
    if settings.legacy_enabled {
        let eroded = erode_edges(&pass.image, settings.legacy_radius);
        pass.pixels_changed += eroded.pixels_changed;
        pass.image = eroded.image;
    }
    pass
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    const INK: Rgba<u8> = Rgba([10, 20, 30, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    /// 9x1 row: transparent on the left three pixels, opaque after.
    fn half_row() -> RgbaImage {
        RgbaImage::from_fn(9, 1, |x, _| if x < 3 { CLEAR } else { INK })
    }

    fn alphas(image: &RgbaImage) -> Vec<u8> {
        image.pixels().map(|p| p.0[3]).collect()
    }

    #[test]
    fn feather_ramps_alpha_next_to_transparency() {
        let pass = feather_edges(&half_row(), 2);
        // d=1 -> 255/3, d=2 -> 510/3, further untouched.
        assert_eq!(alphas(&pass.image), vec![0, 0, 0, 85, 170, 255, 255, 255, 255]);
        assert_eq!(pass.pixels_changed, 2);
    }

    #[test]
    fn feather_keeps_rgb() {
        let pass = feather_edges(&half_row(), 2);
        let p = pass.image.get_pixel(3, 0);
        assert_eq!(&p.0[..3], &INK.0[..3]);
    }

    #[test]
    fn feather_without_transparency_is_identity() {
        let img = RgbaImage::from_pixel(5, 5, INK);
        let pass = feather_edges(&img, 3);
        assert_eq!(pass.image, img);
        assert_eq!(pass.pixels_changed, 0);
    }

    #[test]
    fn erode_removes_band() {
        let pass = erode_edges(&half_row(), 2);
        assert_eq!(alphas(&pass.image), vec![0, 0, 0, 0, 0, 255, 255, 255, 255]);
        assert_eq!(pass.pixels_changed, 2);
    }

    #[test]
    fn erode_counts_diagonal_neighbors() {
        let mut img = RgbaImage::from_pixel(3, 3, INK);
        img.put_pixel(0, 0, CLEAR);
        let pass = erode_edges(&img, 1);
        assert_eq!(pass.image.get_pixel(1, 1).0[3], 0);
        assert_eq!(pass.image.get_pixel(2, 2).0[3], 255);
    }

    #[test]
    fn clean_edges_runs_enabled_passes_in_order() {
        let settings = EdgeCleanupSettings {
            enabled: true,
            trim_radius: 2,
            legacy_enabled: true,
            legacy_radius: 1,
        };
        let pass = clean_edges(&half_row(), &settings);
        // Feather gives [.., 85, 170, 255..]; erosion then clears x=3.
        assert_eq!(alphas(&pass.image), vec![0, 0, 0, 0, 170, 255, 255, 255, 255]);
    }

    #[test]
    fn clean_edges_disabled_is_identity() {
        let img = half_row();
        let pass = clean_edges(&img, &EdgeCleanupSettings::default());
        assert_eq!(pass.image, img);
    }
}
