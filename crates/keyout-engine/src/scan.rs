//! Connectivity scans: flood fill and connected-component labeling.
//!
//! A [`Scanner`] pairs a raster with a pixel predicate and a
//! [`Connectivity`]. It supports two queries:
//!
//! - [`Scanner::flood`] / [`Scanner::flood_from`]: every pixel reachable
//!   from one or more seeds through predicate-matching neighbors.
//! - [`Scanner::components`]: label every maximal connected set of
//!   matching pixels in the image.
//!
//! Both are iterative (explicit stack, no recursion) and visit each pixel
//! at most once. The pending stack is capped by [`ScanLimits`]; when the
//! cap is hit the scan stops and reports `truncated = true` alongside
//! whatever it had accepted so far.

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::types::{EngineError, RgbaImage};

/// Default cap on pending stack entries: none beyond the raster itself.
///
/// A pixel is marked visited when it is pushed, so the stack never holds
/// more than `width * height` entries and is bounded by the same memory
/// as the visited map. A fill over a uniform region peaks at about half
/// the pixel count. Set a lower [`ScanLimits::max_pending`] to bound work
/// on untrusted inputs.
pub const DEFAULT_MAX_PENDING: usize = usize::MAX;

/// Neighborhood used when growing regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity {
    /// Up, down, left, right. Used for color fills so diagonals of
    /// anti-aliased edges do not leak.
    #[default]
    Four,
    /// Four-way plus diagonals. Used for speck detection.
    Eight,
}

const FOUR: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const EIGHT: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

impl Connectivity {
    /// Neighbor offsets as `(dx, dy)`.
    #[must_use]
    pub const fn offsets(self) -> &'static [(i64, i64)] {
        match self {
            Self::Four => &FOUR,
            Self::Eight => &EIGHT,
        }
    }
}

/// Resource ceiling for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLimits {
    /// Maximum number of pending stack entries before the scan aborts.
    pub max_pending: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

/// Axis-aligned pixel bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    /// Left column.
    pub x: u32,
    /// Top row.
    pub y: u32,
    /// Width in pixels (at least 1).
    pub width: u32,
    /// Height in pixels (at least 1).
    pub height: u32,
}

/// Running min/max accumulator for [`Bounds`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundsBuilder {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl BoundsBuilder {
    pub(crate) const fn new() -> Self {
        Self {
            min_x: u32::MAX,
            min_y: u32::MAX,
            max_x: 0,
            max_y: 0,
        }
    }

    pub(crate) fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub(crate) const fn build(self) -> Option<Bounds> {
        if self.min_x > self.max_x || self.min_y > self.max_y {
            return None;
        }
        Some(Bounds {
            x: self.min_x,
            y: self.min_y,
            width: self.max_x - self.min_x + 1,
            height: self.max_y - self.min_y + 1,
        })
    }
}

/// Result of a flood fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    /// `width * height` selection mask, row-major.
    pub mask: Vec<bool>,
    /// Number of `true` entries in `mask`.
    pub pixel_count: usize,
    /// The stack ceiling was hit; `mask` is partial.
    pub truncated: bool,
}

impl Fill {
    /// Linear indices (`y * width + x`) of selected pixels.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &selected)| selected.then_some(i))
    }
}

/// One connected component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Linear pixel indices (`y * width + x`), in discovery order.
    pub indices: Vec<usize>,
    /// Bounding box of the component.
    pub bounds: Bounds,
}

impl Region {
    /// Number of pixels in the component.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.indices.len()
    }
}

/// Result of labeling a whole image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    /// Components in raster order of their first pixel. When
    /// `truncated`, the last one is the partially explored component.
    pub regions: Vec<Region>,
    /// The stack ceiling was hit and labeling stopped early.
    pub truncated: bool,
}

impl Components {
    /// Pixel count of the largest component, or 0 if there are none.
    #[must_use]
    pub fn largest(&self) -> usize {
        self.regions.iter().map(Region::pixel_count).max().unwrap_or(0)
    }

    /// Regions whose size is final, leaving out a trailing partial one.
    #[must_use]
    pub fn complete(&self) -> &[Region] {
        let partial = usize::from(self.truncated);
        &self.regions[..self.regions.len().saturating_sub(partial)]
    }
}

/// A predicate-driven scan over one raster.
pub struct Scanner<'a, P> {
    image: &'a RgbaImage,
    predicate: P,
    connectivity: Connectivity,
    limits: ScanLimits,
}

impl<'a, P> Scanner<'a, P>
where
    P: Fn(Rgba<u8>) -> bool,
{
    /// Create a scanner with default [`ScanLimits`].
    pub fn new(image: &'a RgbaImage, connectivity: Connectivity, predicate: P) -> Self {
        Self {
            image,
            predicate,
            connectivity,
            limits: ScanLimits::default(),
        }
    }

    /// Override the resource ceiling.
    #[must_use]
    pub const fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.limits = limits;
        self
    }

    fn pixel_at(&self, index: usize) -> Rgba<u8> {
        let raw = self.image.as_raw();
        let o = index * 4;
        Rgba([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]])
    }

    fn width(&self) -> usize {
        self.image.width() as usize
    }

    fn len(&self) -> usize {
        self.width() * self.image.height() as usize
    }

    /// Push unvisited matching neighbors of `index`.
    ///
    /// Returns `false` if the stack ceiling was hit.
    fn push_neighbors(&self, index: usize, visited: &mut [bool], stack: &mut Vec<usize>) -> bool {
        let w = self.width() as i64;
        let h = i64::from(self.image.height());
        #[expect(clippy::cast_possible_wrap)]
        let (x, y) = ((index % self.width()) as i64, (index / self.width()) as i64);
        for &(dx, dy) in self.connectivity.offsets() {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            #[expect(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let n = (ny * w + nx) as usize;
            if visited[n] {
                continue;
            }
            visited[n] = true;
            if !(self.predicate)(self.pixel_at(n)) {
                continue;
            }
            if stack.len() >= self.limits.max_pending {
                return false;
            }
            stack.push(n);
        }
        true
    }

    /// Flood fill from every in-bounds seed that matches the predicate.
    ///
    /// Out-of-bounds and non-matching seeds are ignored, which makes
    /// this suitable for border fills where many seeds do not match.
    pub fn flood<I>(&self, seeds: I) -> Fill
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        let len = self.len();
        let mut visited = vec![false; len];
        let mut mask = vec![false; len];
        let mut stack = Vec::new();
        let mut pixel_count = 0;
        let mut truncated = false;

        for (x, y) in seeds {
            if x >= self.image.width() || y >= self.image.height() {
                continue;
            }
            let idx = y as usize * self.width() + x as usize;
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            if !(self.predicate)(self.pixel_at(idx)) {
                continue;
            }
            if stack.len() >= self.limits.max_pending {
                truncated = true;
                break;
            }
            stack.push(idx);
        }

        while let Some(idx) = stack.pop() {
            mask[idx] = true;
            pixel_count += 1;
            if !self.push_neighbors(idx, &mut visited, &mut stack) {
                truncated = true;
                break;
            }
        }

        Fill {
            mask,
            pixel_count,
            truncated,
        }
    }

    /// Flood fill from a single seed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SeedOutOfBounds`] if the seed is outside
    /// the raster.
    pub fn flood_from(&self, x: u32, y: u32) -> Result<Fill, EngineError> {
        if x >= self.image.width() || y >= self.image.height() {
            return Err(EngineError::SeedOutOfBounds { x, y });
        }
        Ok(self.flood(std::iter::once((x, y))))
    }

    /// Label every connected component of matching pixels.
    #[must_use]
    pub fn components(&self) -> Components {
        let len = self.len();
        let width = self.width();
        let mut visited = vec![false; len];
        let mut regions = Vec::new();
        let mut stack = Vec::new();

        for start in 0..len {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            if !(self.predicate)(self.pixel_at(start)) {
                continue;
            }

            let mut indices = Vec::new();
            let mut bounds = BoundsBuilder::new();
            let mut complete = true;
            stack.clear();
            stack.push(start);
            while let Some(idx) = stack.pop() {
                indices.push(idx);
                #[expect(clippy::cast_possible_truncation)]
                bounds.include((idx % width) as u32, (idx / width) as u32);
                if !self.push_neighbors(idx, &mut visited, &mut stack) {
                    complete = false;
                    break;
                }
            }

            if let Some(bounds) = bounds.build() {
                regions.push(Region { indices, bounds });
            }
            if !complete {
                return Components {
                    regions,
                    truncated: true,
                };
            }
        }

        Components {
            regions,
            truncated: false,
        }
    }
}

/// Predicate: pixel is fully transparent.
#[must_use]
pub const fn is_transparent(pixel: Rgba<u8>) -> bool {
    pixel.0[3] == 0
}

/// Predicate: pixel has any opacity.
#[must_use]
pub const fn is_visible(pixel: Rgba<u8>) -> bool {
    pixel.0[3] > 0
}

/// Every pixel coordinate on the four edges of a `width × height` grid.
///
/// Corners appear more than once; scans dedupe via their visited map.
pub fn border_pixels(width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let (right, bottom) = (width.saturating_sub(1), height.saturating_sub(1));
    let horizontal = (0..width).flat_map(move |x| [(x, 0), (x, bottom)]);
    let vertical = (0..height).flat_map(move |y| [(0, y), (right, y)]);
    horizontal.chain(vertical).filter(move |_| width > 0 && height > 0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const OPAQUE: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    /// 3x3 with opaque pixels on the main diagonal only.
    fn diagonal_chain() -> RgbaImage {
        RgbaImage::from_fn(3, 3, |x, y| if x == y { OPAQUE } else { CLEAR })
    }

    #[test]
    fn diagonal_chain_is_one_component_under_eight_connectivity() {
        let img = diagonal_chain();
        let comps = Scanner::new(&img, Connectivity::Eight, is_visible).components();
        assert_eq!(comps.regions.len(), 1);
        assert_eq!(comps.regions[0].pixel_count(), 3);
        assert_eq!(
            comps.regions[0].bounds,
            Bounds {
                x: 0,
                y: 0,
                width: 3,
                height: 3
            }
        );
    }

    #[test]
    fn diagonal_chain_is_three_components_under_four_connectivity() {
        let img = diagonal_chain();
        let comps = Scanner::new(&img, Connectivity::Four, is_visible).components();
        assert_eq!(comps.regions.len(), 3);
        assert!(comps.regions.iter().all(|r| r.pixel_count() == 1));
        assert!(!comps.truncated);
    }

    #[test]
    fn flood_from_stays_inside_region() {
        // Left column opaque, rest transparent.
        let img = RgbaImage::from_fn(4, 4, |x, _| if x == 0 { OPAQUE } else { CLEAR });
        let fill = Scanner::new(&img, Connectivity::Four, is_visible)
            .flood_from(0, 2)
            .unwrap();
        assert_eq!(fill.pixel_count, 4);
        assert_eq!(fill.indices().collect::<Vec<_>>(), vec![0, 4, 8, 12]);
    }

    #[test]
    fn flood_from_out_of_bounds_is_an_error() {
        let img = RgbaImage::new(2, 2);
        let result = Scanner::new(&img, Connectivity::Four, is_visible).flood_from(2, 0);
        assert!(matches!(result, Err(EngineError::SeedOutOfBounds { x: 2, y: 0 })));
    }

    #[test]
    fn flood_from_non_matching_seed_selects_nothing() {
        let img = RgbaImage::new(3, 3);
        let fill = Scanner::new(&img, Connectivity::Four, is_visible)
            .flood_from(1, 1)
            .unwrap();
        assert_eq!(fill.pixel_count, 0);
        assert!(!fill.truncated);
    }

    #[test]
    fn flood_reports_truncation_at_ceiling() {
        let img = RgbaImage::from_pixel(50, 50, OPAQUE);
        let fill = Scanner::new(&img, Connectivity::Four, is_visible)
            .with_limits(ScanLimits { max_pending: 2 })
            .flood_from(25, 25)
            .unwrap();
        assert!(fill.truncated);
        assert!(fill.pixel_count < 2500);
    }

    #[test]
    fn components_report_truncation_and_keep_partial_region() {
        let img = RgbaImage::from_pixel(50, 50, OPAQUE);
        let comps = Scanner::new(&img, Connectivity::Four, is_visible)
            .with_limits(ScanLimits { max_pending: 2 })
            .components();
        assert!(comps.truncated);
        assert_eq!(comps.regions.len(), 1);
        let partial = comps.regions[0].pixel_count();
        assert!(partial > 0 && partial < 2500);
        assert_eq!(comps.regions[0].indices[0], 0);
        assert!(comps.complete().is_empty());
    }

    #[test]
    fn border_flood_covers_largest_uniform_image() {
        let img = RgbaImage::from_pixel(4000, 4000, OPAQUE);
        let fill = Scanner::new(&img, Connectivity::Four, is_visible).flood(border_pixels(4000, 4000));
        assert!(!fill.truncated);
        assert_eq!(fill.pixel_count, 4000 * 4000);
    }

    #[test]
    fn components_label_large_uniform_image_in_one_piece() {
        let img = RgbaImage::from_fn(3000, 3000, |x, y| {
            if (x, y) == (2999, 2999) { CLEAR } else { OPAQUE }
        });
        let comps = Scanner::new(&img, Connectivity::Eight, is_visible).components();
        assert!(!comps.truncated);
        assert_eq!(comps.regions.len(), 1);
        assert_eq!(comps.largest(), 3000 * 3000 - 1);
    }

    #[test]
    fn multi_seed_flood_joins_disconnected_areas() {
        // Two opaque columns separated by a transparent column.
        let img = RgbaImage::from_fn(3, 3, |x, _| if x == 1 { CLEAR } else { OPAQUE });
        let fill = Scanner::new(&img, Connectivity::Four, is_visible).flood([(0, 0), (2, 2)]);
        assert_eq!(fill.pixel_count, 6);
    }

    #[test]
    fn border_pixels_cover_every_edge() {
        let border: std::collections::HashSet<_> = border_pixels(4, 3).collect();
        assert_eq!(border.len(), 10);
        assert!(border.contains(&(3, 2)));
        assert!(!border.contains(&(1, 1)));
    }

    #[test]
    fn border_pixels_of_empty_grid_is_empty() {
        assert_eq!(border_pixels(0, 5).count(), 0);
    }

    #[test]
    fn largest_component_size() {
        let img = RgbaImage::from_fn(5, 1, |x, _| if x == 2 { CLEAR } else { OPAQUE });
        let comps = Scanner::new(&img, Connectivity::Four, is_visible).components();
        assert_eq!(comps.regions.len(), 2);
        assert_eq!(comps.largest(), 2);
    }
}
