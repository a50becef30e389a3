//! Region cleanup: fill small transparent holes, find and remove specks.
//!
//! Holes are 4-connected components of fully transparent pixels. Specks
//! are 8-connected components of visible pixels, so a diagonal-only
//! cluster counts as one speck.

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::scan::{Components, Connectivity, ScanLimits, Scanner, is_transparent, is_visible};
use crate::types::{EngineError, RgbaImage, ensure_same_dimensions};

/// Radius of the highlight glow around each speck pixel.
pub const HIGHLIGHT_RADIUS: i64 = 2;

/// Maximum blend toward the highlight color at the speck pixel itself.
const HIGHLIGHT_MIX: f32 = 0.75;

/// Result of [`fill_holes`].
#[derive(Debug, Clone)]
pub struct HoleFill {
    /// Raster with small holes made opaque.
    pub image: RgbaImage,
    /// Number of holes that were filled.
    pub holes_filled: usize,
    /// Total pixels restored across all filled holes.
    pub pixels_filled: usize,
    /// Component labeling hit its ceiling.
    pub truncated: bool,
}

/// Fill transparent components smaller than `min_region_size` pixels.
///
/// Each filled hole takes the average RGB of the distinct opaque pixels
/// bordering it (8-neighborhood) at full opacity. A hole with no opaque
/// neighbor is left alone.
#[must_use = "returns the filled raster"]
pub fn fill_holes(image: &RgbaImage, min_region_size: u32, limits: ScanLimits) -> HoleFill {
    let holes = Scanner::new(image, Connectivity::Four, is_transparent)
        .with_limits(limits)
        .components();

    let width = image.width() as usize;
    let height = image.height() as usize;
    let src: &[u8] = image;
    let mut out = image.clone();
    let dst: &mut [u8] = &mut out;

    let mut seen = vec![false; width * height];
    let mut holes_filled = 0;
    let mut pixels_filled = 0;

    for region in holes
        .complete()
        .iter()
        .filter(|r| r.pixel_count() < min_region_size as usize)
    {
        let mut sum = [0u64; 3];
        let mut count = 0u64;
        let mut touched = Vec::new();
        for &idx in &region.indices {
            for n in neighbors8(idx, width, height) {
                if seen[n] || src[n * 4 + 3] == 0 {
                    continue;
                }
                seen[n] = true;
                touched.push(n);
                for (s, &c) in sum.iter_mut().zip(&src[n * 4..n * 4 + 3]) {
                    *s += u64::from(c);
                }
                count += 1;
            }
        }
        for n in touched {
            seen[n] = false;
        }
        if count == 0 {
            continue;
        }

        #[expect(clippy::cast_possible_truncation)]
        let avg = sum.map(|s| ((s + count / 2) / count) as u8);
        for &idx in &region.indices {
            dst[idx * 4..idx * 4 + 4].copy_from_slice(&[avg[0], avg[1], avg[2], 255]);
        }
        holes_filled += 1;
        pixels_filled += region.pixel_count();
    }

    log::debug!("filled {holes_filled} holes ({pixels_filled} px)");
    HoleFill {
        image: out,
        holes_filled,
        pixels_filled,
        truncated: holes.truncated,
    }
}

/// Summary statistics over the visible components of a raster.
///
/// Two speck counts are reported because they answer different
/// questions: `relative_speck_count` counts components at most a tenth
/// the size of the largest one, `speck_count` counts components at most
/// `min_speck_size` pixels. Removal and highlighting use `speck_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeckReport {
    /// Number of 8-connected visible components.
    pub component_count: usize,
    /// Pixel count of the largest component.
    pub largest_component: usize,
    /// Components with `size <= largest * 0.1`.
    pub relative_speck_count: usize,
    /// Components with `size <= min_speck_size`.
    pub speck_count: usize,
    /// Labeling hit its ceiling; counts are partial.
    pub truncated: bool,
}

fn visible_components(image: &RgbaImage, limits: ScanLimits) -> Components {
    Scanner::new(image, Connectivity::Eight, is_visible)
        .with_limits(limits)
        .components()
}

const fn is_speck(size: usize, min_speck_size: u32) -> bool {
    size <= min_speck_size as usize
}

/// Count components and specks without modifying the raster.
#[must_use]
pub fn analyze_specks(image: &RgbaImage, min_speck_size: u32, limits: ScanLimits) -> SpeckReport {
    let components = visible_components(image, limits);
    let largest = components.largest();
    let sizes = || components.complete().iter().map(crate::scan::Region::pixel_count);
    SpeckReport {
        component_count: components.regions.len(),
        largest_component: largest,
        relative_speck_count: sizes().filter(|&s| s * 10 <= largest).count(),
        speck_count: sizes().filter(|&s| is_speck(s, min_speck_size)).count(),
        truncated: components.truncated,
    }
}

/// Result of [`remove_specks`] or [`highlight_specks`].
#[derive(Debug, Clone)]
pub struct SpeckPass {
    /// The modified raster.
    pub image: RgbaImage,
    /// Number of components treated as specks.
    pub specks: usize,
    /// Pixels belonging to those components.
    pub pixels: usize,
    /// Component labeling hit its ceiling.
    pub truncated: bool,
}

/// Make every pixel of every speck fully transparent.
#[must_use = "returns the cleaned raster"]
pub fn remove_specks(image: &RgbaImage, min_speck_size: u32, limits: ScanLimits) -> SpeckPass {
    let components = visible_components(image, limits);
    let mut out = image.clone();
    let dst: &mut [u8] = &mut out;
    let mut specks = 0;
    let mut pixels = 0;
    for region in components
        .complete()
        .iter()
        .filter(|r| is_speck(r.pixel_count(), min_speck_size))
    {
        for &idx in &region.indices {
            dst[idx * 4 + 3] = 0;
        }
        specks += 1;
        pixels += region.pixel_count();
    }
    SpeckPass {
        image: out,
        specks,
        pixels,
        truncated: components.truncated,
    }
}

/// Overlay a red glow around every speck pixel, for display only.
///
/// Strength falls off as `1 - d / 3` out to [`HIGHLIGHT_RADIUS`]. Where
/// glows overlap the strongest wins. Each touched pixel blends toward
/// red by `0.75 * strength` and its alpha is raised to at least
/// `strength * 255`.
#[must_use = "returns the highlighted raster"]
pub fn highlight_specks(image: &RgbaImage, min_speck_size: u32, limits: ScanLimits) -> SpeckPass {
    let glow = speck_glow(image, min_speck_size, limits);
    let mut out = image.clone();
    paint_glow(&mut out, &glow.strength);
    glow.into_pass(out)
}

/// Like [`highlight_specks`], but specks are found in `source` and the
/// glow is painted onto `canvas`.
///
/// Used for previews where `canvas` already has effects applied (a
/// composited background would otherwise merge every speck into one
/// component).
///
/// # Errors
///
/// Returns [`EngineError::DimensionMismatch`] if the rasters differ in size.
pub fn highlight_specks_over(
    source: &RgbaImage,
    canvas: &RgbaImage,
    min_speck_size: u32,
    limits: ScanLimits,
) -> Result<SpeckPass, EngineError> {
    ensure_same_dimensions(source, canvas)?;
    let glow = speck_glow(source, min_speck_size, limits);
    let mut out = canvas.clone();
    paint_glow(&mut out, &glow.strength);
    Ok(glow.into_pass(out))
}

struct Glow {
    strength: Vec<f32>,
    specks: usize,
    pixels: usize,
    truncated: bool,
}

impl Glow {
    fn into_pass(self, image: RgbaImage) -> SpeckPass {
        SpeckPass {
            image,
            specks: self.specks,
            pixels: self.pixels,
            truncated: self.truncated,
        }
    }
}

fn speck_glow(image: &RgbaImage, min_speck_size: u32, limits: ScanLimits) -> Glow {
    let components = visible_components(image, limits);
    let width = i64::from(image.width());
    let height = i64::from(image.height());
    let mut strength = vec![0f32; image.len() / 4];
    let mut specks = 0;
    let mut pixels = 0;

    for region in components
        .complete()
        .iter()
        .filter(|r| is_speck(r.pixel_count(), min_speck_size))
    {
        specks += 1;
        pixels += region.pixel_count();
        for &idx in &region.indices {
            #[expect(clippy::cast_possible_wrap)]
            let (cx, cy) = ((idx as i64) % width, (idx as i64) / width);
            for dy in -HIGHLIGHT_RADIUS..=HIGHLIGHT_RADIUS {
                for dx in -HIGHLIGHT_RADIUS..=HIGHLIGHT_RADIUS {
                    let (x, y) = (cx + dx, cy + dy);
                    if x < 0 || y < 0 || x >= width || y >= height {
                        continue;
                    }
                    let d2 = dx * dx + dy * dy;
                    if d2 > HIGHLIGHT_RADIUS * HIGHLIGHT_RADIUS {
                        continue;
                    }
                    #[expect(clippy::cast_precision_loss)]
                    let d = (d2 as f32).sqrt();
                    let s = 1.0 - d / 3.0;
                    #[expect(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    let slot = &mut strength[(y * width + x) as usize];
                    *slot = slot.max(s);
                }
            }
        }
    }

    Glow {
        strength,
        specks,
        pixels,
        truncated: components.truncated,
    }
}

fn paint_glow(canvas: &mut RgbaImage, strength: &[f32]) {
    let red = Color::RED;
    for (pixel, &s) in canvas.pixels_mut().zip(strength) {
        if s <= 0.0 {
            continue;
        }
        let mix = s * HIGHLIGHT_MIX;
        for (c, target) in pixel.0.iter_mut().zip([red.r, red.g, red.b]) {
            *c = lerp(*c, target, mix);
        }
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let glow = (s * 255.0).round() as u8;
        pixel.0[3] = pixel.0[3].max(glow);
    }
}

fn lerp(from: u8, to: u8, t: f32) -> u8 {
    let v = (f32::from(to) - f32::from(from)).mul_add(t, f32::from(from));
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let out = v.round().clamp(0.0, 255.0) as u8;
    out
}

/// In-bounds 8-neighbors of a linear index.
fn neighbors8(idx: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
    let (x, y) = (idx % width, idx / width);
    let xs = x.saturating_sub(1)..=(x + 1).min(width - 1);
    let ys = y.saturating_sub(1)..=(y + 1).min(height - 1);
    ys.flat_map(move |ny| xs.clone().map(move |nx| (nx, ny)))
        .filter(move |&(nx, ny)| (nx, ny) != (x, y))
        .map(move |(nx, ny)| ny * width + nx)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;

    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);
    const INK: Rgba<u8> = Rgba([20, 20, 20, 255]);

    /// 10x10 transparent canvas with a 4x4 block at the origin, a lone
    /// pixel at (8, 8), and a diagonal pair at (0, 8)/(1, 9).
    fn speckled() -> RgbaImage {
        RgbaImage::from_fn(10, 10, |x, y| {
            let block = x < 4 && y < 4;
            let lone = (x, y) == (8, 8);
            let pair = (x, y) == (0, 8) || (x, y) == (1, 9);
            if block || lone || pair { INK } else { CLEAR }
        })
    }

    #[test]
    fn small_hole_takes_neighbor_average() {
        let mut img = RgbaImage::from_fn(3, 3, |x, _| {
            if x == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([90, 90, 90, 255])
            }
        });
        img.put_pixel(1, 1, CLEAR);
        let fill = fill_holes(&img, 2, ScanLimits::default());
        // 3 neighbors at 0 and 5 at 90 -> 56.25
        assert_eq!(*fill.image.get_pixel(1, 1), Rgba([56, 56, 56, 255]));
        assert_eq!(fill.holes_filled, 1);
        assert_eq!(fill.pixels_filled, 1);
    }

    #[test]
    fn hole_at_threshold_is_kept() {
        let mut img = RgbaImage::from_pixel(4, 4, INK);
        img.put_pixel(1, 1, CLEAR);
        img.put_pixel(2, 1, CLEAR);
        let fill = fill_holes(&img, 2, ScanLimits::default());
        assert_eq!(fill.holes_filled, 0);
        assert_eq!(fill.image, img);
    }

    #[test]
    fn hole_without_opaque_neighbors_is_left_alone() {
        let img = RgbaImage::from_pixel(2, 2, CLEAR);
        let fill = fill_holes(&img, 100, ScanLimits::default());
        assert_eq!(fill.holes_filled, 0);
        assert_eq!(fill.image, img);
    }

    #[test]
    fn diagonal_holes_are_separate() {
        let img = RgbaImage::from_fn(3, 3, |x, y| {
            if (x, y) == (0, 0) || (x, y) == (1, 1) { CLEAR } else { INK }
        });
        let fill = fill_holes(&img, 2, ScanLimits::default());
        assert_eq!(fill.holes_filled, 2);
        assert!(fill.image.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn speck_report_keeps_both_counts() {
        let report = analyze_specks(&speckled(), 2, ScanLimits::default());
        assert_eq!(report.component_count, 3);
        assert_eq!(report.largest_component, 16);
        // Only the lone pixel is within a tenth of 16.
        assert_eq!(report.relative_speck_count, 1);
        // Lone pixel and diagonal pair are both <= 2.
        assert_eq!(report.speck_count, 2);
        assert!(!report.truncated);
    }

    #[test]
    fn speck_report_on_empty_canvas() {
        let report = analyze_specks(&RgbaImage::from_pixel(4, 4, CLEAR), 10, ScanLimits::default());
        assert_eq!(report, SpeckReport::default());
    }

    #[test]
    fn remove_specks_clears_small_components_only() {
        let pass = remove_specks(&speckled(), 2, ScanLimits::default());
        assert_eq!(pass.specks, 2);
        assert_eq!(pass.pixels, 3);
        assert_eq!(pass.image.get_pixel(8, 8).0[3], 0);
        assert_eq!(pass.image.get_pixel(1, 9).0[3], 0);
        assert_eq!(pass.image.get_pixel(3, 3).0[3], 255);
    }

    #[test]
    fn truncated_component_is_not_mistaken_for_a_speck() {
        let img = RgbaImage::from_pixel(50, 50, INK);
        let pass = remove_specks(&img, 10_000, ScanLimits { max_pending: 2 });
        assert!(pass.truncated);
        assert_eq!(pass.specks, 0);
        assert_eq!(pass.image, img);
    }

    #[test]
    fn highlight_marks_speck_surroundings() {
        let img = speckled();
        let pass = highlight_specks(&img, 1, ScanLimits::default());
        assert_eq!(pass.specks, 1);

        let center = pass.image.get_pixel(8, 8);
        assert_eq!(center.0[3], 255);
        assert!(center.0[0] > center.0[1]);

        // One step away: strength 2/3.
        let beside = pass.image.get_pixel(9, 8);
        assert_eq!(beside.0[3], 170);
        assert!(beside.0[0] > 0 && beside.0[1] == 0);

        // Far from the speck: untouched.
        assert_eq!(pass.image.get_pixel(2, 2), img.get_pixel(2, 2));
        assert_eq!(pass.image.get_pixel(5, 0), img.get_pixel(5, 0));
    }

    #[test]
    fn highlight_over_paints_onto_other_canvas() {
        let source = speckled();
        let canvas = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let pass = highlight_specks_over(&source, &canvas, 1, ScanLimits::default()).unwrap();
        assert_eq!(pass.specks, 1);
        let p = pass.image.get_pixel(8, 8);
        assert!(p.0[0] == 255 && p.0[1] < 255);
        assert_eq!(pass.image.get_pixel(2, 2), canvas.get_pixel(2, 2));
    }

    #[test]
    fn highlight_over_rejects_size_mismatch() {
        let result = highlight_specks_over(&speckled(), &RgbaImage::new(3, 3), 1, ScanLimits::default());
        assert!(matches!(result, Err(EngineError::DimensionMismatch { .. })));
    }

    #[test]
    fn highlight_does_not_remove_pixels() {
        let img = speckled();
        let pass = highlight_specks(&img, 50, ScanLimits::default());
        let visible_before = img.pixels().filter(|p| p.0[3] > 0).count();
        let visible_after = pass.image.pixels().filter(|p| p.0[3] > 0).count();
        assert!(visible_after >= visible_before);
    }
}
