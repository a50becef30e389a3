//! Color keying: make matching pixels transparent.
//!
//! Three entry points share one matching rule ([`crate::color::KeySet`]):
//!
//! - [`remove_colors`]: every matching pixel, regardless of position.
//! - [`remove_contiguous`]: only matches reachable from the image border
//!   through other matches (4-connected). Background frequently touches
//!   the border at several disconnected points, so every border pixel
//!   seeds the fill.
//! - [`magic_wand`]: matches reachable from one clicked pixel, keyed on
//!   that pixel's color. [`MagicWand`] wraps it with the debounce and
//!   in-flight guard that pointer-driven invocation needs.
//!
//! Removal only zeroes alpha. RGB is preserved so auto mode keys on the
//! same color when re-run on its own output.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use web_time::Instant;

use crate::color::{Color, ColorMatcher, KeySet};
use crate::scan::{Connectivity, Fill, ScanLimits, Scanner, border_pixels};
use crate::settings::{ColorRemovalSettings, RemovalMode};
use crate::types::{EngineError, RgbaImage};

/// Ignore magic wand clicks closer together than this.
pub const MAGIC_WAND_DEBOUNCE: Duration = Duration::from_millis(200);

/// A keyed raster and what it cost.
#[derive(Debug, Clone)]
pub struct Removal {
    /// The raster with matched pixels made transparent.
    pub image: RgbaImage,
    /// Number of pixels whose alpha was zeroed.
    pub removed: usize,
    /// A flood fill hit its ceiling; some matches may remain.
    pub truncated: bool,
}

/// Build the key set described by `settings` for this raster.
///
/// Auto mode keys on the top-left pixel with the primary threshold.
/// Manual mode keys on the primary target plus each picked color with
/// its own threshold, tried in that order.
#[must_use]
pub fn key_set(image: &RgbaImage, settings: &ColorRemovalSettings) -> KeySet {
    match settings.mode {
        RemovalMode::Auto => {
            if image.width() == 0 || image.height() == 0 {
                return KeySet::default();
            }
            let corner = Color::from_pixel(*image.get_pixel(0, 0));
            KeySet::new(vec![ColorMatcher::new(corner, settings.threshold)])
        }
        RemovalMode::Manual => {
            let primary = std::iter::once(ColorMatcher::new(settings.target_color, settings.threshold));
            let picked = settings
                .picked_colors
                .iter()
                .map(|p| ColorMatcher::new(p.color, p.threshold));
            KeySet::new(primary.chain(picked).collect())
        }
    }
}

/// Make every pixel that matches the key set transparent.
#[must_use = "returns the keyed raster"]
pub fn remove_colors(image: &RgbaImage, settings: &ColorRemovalSettings) -> Removal {
    let keys = key_set(image, settings);
    let mut out = image.clone();
    let mut removed = 0;
    for pixel in out.pixels_mut() {
        if keys.matches(*pixel) {
            pixel.0[3] = 0;
            removed += 1;
        }
    }
    Removal {
        image: out,
        removed,
        truncated: false,
    }
}

/// Make matches connected to the image border transparent.
#[must_use = "returns the keyed raster"]
pub fn remove_contiguous(
    image: &RgbaImage,
    settings: &ColorRemovalSettings,
    limits: ScanLimits,
) -> Removal {
    let keys = key_set(image, settings);
    let fill = Scanner::new(image, Connectivity::Four, |p| keys.matches(p))
        .with_limits(limits)
        .flood(border_pixels(image.width(), image.height()));
    clear_selected(image, &fill)
}

/// Make matches connected to `(x, y)` transparent, keyed on that pixel.
///
/// A fully transparent seed removes nothing.
///
/// # Errors
///
/// Returns [`EngineError::SeedOutOfBounds`] if the point is outside the
/// raster.
pub fn magic_wand(
    image: &RgbaImage,
    x: u32,
    y: u32,
    threshold: u8,
    limits: ScanLimits,
) -> Result<Removal, EngineError> {
    if x >= image.width() || y >= image.height() {
        return Err(EngineError::SeedOutOfBounds { x, y });
    }
    let matcher = ColorMatcher::new(Color::from_pixel(*image.get_pixel(x, y)), threshold);
    let fill = Scanner::new(image, Connectivity::Four, |p| matcher.matches(p))
        .with_limits(limits)
        .flood_from(x, y)?;
    Ok(clear_selected(image, &fill))
}

fn clear_selected(image: &RgbaImage, fill: &Fill) -> Removal {
    let mut out = image.clone();
    let raw: &mut [u8] = &mut out;
    for idx in fill.indices() {
        raw[idx * 4 + 3] = 0;
    }
    Removal {
        image: out,
        removed: fill.pixel_count,
        truncated: fill.truncated,
    }
}

/// Interactive magic wand with debounce and mutual exclusion.
///
/// Pointer input can fire faster than a fill completes. Calls within
/// [`MAGIC_WAND_DEBOUNCE`] of the last accepted call return `Ok(None)`;
/// a call made while another is still running returns
/// [`EngineError::Busy`].
#[derive(Debug)]
pub struct MagicWand {
    threshold: u8,
    limits: ScanLimits,
    debounce: Duration,
    last_accepted: Mutex<Option<Instant>>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MagicWand {
    /// Create a wand with its own threshold, independent of bulk keying.
    #[must_use]
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            limits: ScanLimits::default(),
            debounce: MAGIC_WAND_DEBOUNCE,
            last_accepted: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Override the scan ceiling.
    #[must_use]
    pub const fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The wand's match threshold.
    #[must_use]
    pub const fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Change the match threshold.
    pub const fn set_threshold(&mut self, threshold: u8) {
        self.threshold = threshold;
    }

    /// Apply the wand at `(x, y)` now.
    ///
    /// # Errors
    ///
    /// See [`apply_at`](Self::apply_at).
    pub fn apply(&self, image: &RgbaImage, x: u32, y: u32) -> Result<Option<Removal>, EngineError> {
        self.apply_at(Instant::now(), image, x, y)
    }

    /// Apply the wand at `(x, y)` as if invoked at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Busy`] if another invocation is running and
    /// [`EngineError::SeedOutOfBounds`] if the point is off the raster.
    pub fn apply_at(
        &self,
        now: Instant,
        image: &RgbaImage,
        x: u32,
        y: u32,
    ) -> Result<Option<Removal>, EngineError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(EngineError::Busy("magic wand already running"));
        }
        let _guard = InFlight(&self.in_flight);

        {
            let mut last = self
                .last_accepted
                .lock()
                .map_err(|_| EngineError::Busy("magic wand state poisoned"))?;
            if let Some(prev) = *last
                && now.saturating_duration_since(prev) < self.debounce
            {
                log::debug!("magic wand click at ({x}, {y}) debounced");
                return Ok(None);
            }
            *last = Some(now);
        }

        let removal = magic_wand(image, x, y, self.threshold, self.limits)?;
        if removal.truncated {
            log::warn!("magic wand fill at ({x}, {y}) truncated at scan ceiling");
        }
        Ok(Some(removal))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::settings::PickedColor;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn auto(threshold: u8, contiguous: bool) -> ColorRemovalSettings {
        ColorRemovalSettings {
            threshold,
            contiguous,
            ..ColorRemovalSettings::default()
        }
    }

    fn alphas(image: &RgbaImage) -> Vec<u8> {
        image.pixels().map(|p| p.0[3]).collect()
    }

    /// 5x5: white outside, a black ring at distance 1, white center.
    fn ringed_center() -> RgbaImage {
        RgbaImage::from_fn(5, 5, |x, y| {
            let ring = (1..=3).contains(&x) && (1..=3).contains(&y) && !(x == 2 && y == 2);
            if ring { BLACK } else { WHITE }
        })
    }

    #[test]
    fn auto_non_contiguous_removes_matching_row_pixels() {
        let img = RgbaImage::from_fn(4, 1, |x, _| if x == 2 { BLACK } else { WHITE });
        let removal = remove_colors(&img, &auto(10, false));
        assert_eq!(alphas(&removal.image), vec![0, 0, 255, 0]);
        assert_eq!(removal.removed, 3);
    }

    #[test]
    fn auto_keys_on_top_left_pixel() {
        let img = RgbaImage::from_fn(3, 1, |x, _| if x == 0 { BLACK } else { WHITE });
        let removal = remove_colors(&img, &auto(5, false));
        assert_eq!(alphas(&removal.image), vec![0, 255, 255]);
    }

    #[test]
    fn black_center_survives_both_modes() {
        let img = RgbaImage::from_fn(3, 3, |x, y| if x == 1 && y == 1 { BLACK } else { WHITE });
        let global = remove_colors(&img, &auto(5, false));
        let border = remove_contiguous(&img, &auto(5, true), ScanLimits::default());
        let expected = vec![0, 0, 0, 0, 255, 0, 0, 0, 0];
        assert_eq!(alphas(&global.image), expected);
        assert_eq!(alphas(&border.image), expected);
    }

    #[test]
    fn solid_square_fully_removed_by_both_modes() {
        let img = RgbaImage::from_pixel(3, 3, WHITE);
        assert_eq!(remove_colors(&img, &auto(5, false)).removed, 9);
        assert_eq!(
            remove_contiguous(&img, &auto(5, true), ScanLimits::default()).removed,
            9
        );
    }

    #[test]
    fn ringed_center_diverges_between_modes() {
        let img = ringed_center();
        let global = remove_colors(&img, &auto(5, false));
        let border = remove_contiguous(&img, &auto(5, true), ScanLimits::default());

        // Inner white pixel is unreachable from the border.
        assert_eq!(global.image.get_pixel(2, 2).0[3], 0);
        assert_eq!(border.image.get_pixel(2, 2).0[3], 255);

        // Outside the ring both agree.
        assert_eq!(global.image.get_pixel(0, 0).0[3], 0);
        assert_eq!(border.image.get_pixel(4, 4).0[3], 0);
        assert_eq!(global.removed, 17);
        assert_eq!(border.removed, 16);
    }

    #[test]
    fn contiguous_fill_does_not_cross_diagonals() {
        // Background only touches the inner pixel diagonally.
        let img = RgbaImage::from_fn(3, 3, |x, y| {
            if (x == 1) ^ (y == 1) { BLACK } else { WHITE }
        });
        let border = remove_contiguous(&img, &auto(5, true), ScanLimits::default());
        assert_eq!(border.image.get_pixel(1, 1).0[3], 255);
        assert_eq!(border.image.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn auto_removal_is_idempotent() {
        let img = ringed_center();
        for contiguous in [false, true] {
            let settings = auto(20, contiguous);
            let run = |i: &RgbaImage| {
                if contiguous {
                    remove_contiguous(i, &settings, ScanLimits::default())
                } else {
                    remove_colors(i, &settings)
                }
            };
            let first = run(&img);
            let second = run(&first.image);
            assert_eq!(second.removed, 0, "contiguous={contiguous}");
            assert_eq!(second.image, first.image);
        }
    }

    #[test]
    fn removal_preserves_rgb() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([250, 251, 252, 255]));
        let removal = remove_colors(&img, &auto(10, false));
        assert_eq!(*removal.image.get_pixel(1, 1), Rgba([250, 251, 252, 0]));
    }

    #[test]
    fn manual_mode_uses_each_picked_threshold() {
        let red = Rgba([255, 0, 0, 255]);
        let near_red = Rgba([235, 0, 0, 255]);
        let img = RgbaImage::from_fn(4, 1, |x, _| match x {
            0 => WHITE,
            1 => red,
            2 => near_red,
            _ => BLACK,
        });
        let settings = ColorRemovalSettings {
            mode: RemovalMode::Manual,
            target_color: Color::WHITE,
            threshold: 1,
            picked_colors: vec![PickedColor {
                color: Color::new(255, 0, 0),
                threshold: 5,
            }],
            ..ColorRemovalSettings::default()
        };
        let removal = remove_colors(&img, &settings);
        // near_red is 20 units from red: outside 5 * 2.55 = 12.75.
        assert_eq!(alphas(&removal.image), vec![0, 0, 255, 255]);
    }

    #[test]
    fn magic_wand_removes_clicked_region_only() {
        let img = ringed_center();
        let removal = magic_wand(&img, 2, 2, 5, ScanLimits::default()).unwrap();
        assert_eq!(removal.removed, 1);
        assert_eq!(removal.image.get_pixel(2, 2).0[3], 0);
        assert_eq!(removal.image.get_pixel(0, 0).0[3], 255);
    }

    #[test]
    fn magic_wand_on_transparent_seed_removes_nothing() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([255, 255, 255, 0]));
        let removal = magic_wand(&img, 1, 1, 50, ScanLimits::default()).unwrap();
        assert_eq!(removal.removed, 0);
    }

    #[test]
    fn magic_wand_rejects_out_of_bounds_seed() {
        let img = RgbaImage::from_pixel(3, 3, WHITE);
        let result = magic_wand(&img, 3, 0, 5, ScanLimits::default());
        assert!(matches!(result, Err(EngineError::SeedOutOfBounds { .. })));
    }

    #[test]
    fn wand_debounces_rapid_clicks() {
        let img = ringed_center();
        let wand = MagicWand::new(5);
        let t0 = Instant::now();
        assert!(wand.apply_at(t0, &img, 0, 0).unwrap().is_some());
        assert!(wand
            .apply_at(t0 + Duration::from_millis(50), &img, 0, 0)
            .unwrap()
            .is_none());
        assert!(wand
            .apply_at(t0 + Duration::from_millis(250), &img, 0, 0)
            .unwrap()
            .is_some());
    }

    #[test]
    fn wand_rejects_concurrent_invocation() {
        let img = ringed_center();
        let wand = MagicWand::new(5);
        wand.in_flight.store(true, Ordering::Release);
        assert!(matches!(
            wand.apply(&img, 0, 0),
            Err(EngineError::Busy(_))
        ));
        wand.in_flight.store(false, Ordering::Release);
        assert!(wand.apply(&img, 0, 0).unwrap().is_some());
    }

    #[test]
    fn wand_releases_guard_after_error() {
        let img = ringed_center();
        let wand = MagicWand::new(5);
        assert!(wand.apply(&img, 99, 99).is_err());
        assert!(!wand.in_flight.load(Ordering::Acquire));
    }
}
