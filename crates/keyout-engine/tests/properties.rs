//! Property tests for color removal.

#![allow(clippy::unwrap_used)]

use image::Rgba;
use keyout_engine::removal::remove_colors;
use keyout_engine::settings::{ColorRemovalSettings, RemovalMode};
use keyout_engine::{Color, RgbaImage};
use proptest::prelude::*;

const SIDE: u32 = 6;

fn raster(pixels: &[[u8; 3]]) -> RgbaImage {
    RgbaImage::from_fn(SIDE, SIDE, |x, y| {
        let [r, g, b] = pixels[(y * SIDE + x) as usize];
        Rgba([r, g, b, 255])
    })
}

fn manual(target: [u8; 3], threshold: u8) -> ColorRemovalSettings {
    ColorRemovalSettings {
        mode: RemovalMode::Manual,
        target_color: Color::new(target[0], target[1], target[2]),
        threshold,
        ..ColorRemovalSettings::default()
    }
}

fn removed(image: &RgbaImage) -> Vec<bool> {
    image.pixels().map(|p| p.0[3] == 0).collect()
}

proptest! {
    #[test]
    fn higher_threshold_removes_a_superset(
        pixels in prop::collection::vec(any::<[u8; 3]>(), (SIDE * SIDE) as usize),
        target in any::<[u8; 3]>(),
        low in 1u8..=100,
        high in 1u8..=100,
    ) {
        let (low, high) = (low.min(high), low.max(high));
        let image = raster(&pixels);
        let narrow = removed(&remove_colors(&image, &manual(target, low)).image);
        let wide = removed(&remove_colors(&image, &manual(target, high)).image);
        for (i, (n, w)) in narrow.iter().zip(&wide).enumerate() {
            prop_assert!(!n || *w, "pixel {} removed at {} but kept at {}", i, low, high);
        }
    }

    #[test]
    fn auto_removal_is_idempotent(
        pixels in prop::collection::vec(any::<[u8; 3]>(), (SIDE * SIDE) as usize),
        threshold in 1u8..=100,
    ) {
        let settings = ColorRemovalSettings {
            threshold,
            ..ColorRemovalSettings::default()
        };
        let first = remove_colors(&raster(&pixels), &settings);
        let second = remove_colors(&first.image, &settings);
        prop_assert_eq!(second.removed, 0);
        prop_assert_eq!(second.image, first.image);
    }

    #[test]
    fn removal_never_touches_color_channels(
        pixels in prop::collection::vec(any::<[u8; 3]>(), (SIDE * SIDE) as usize),
        target in any::<[u8; 3]>(),
        threshold in 1u8..=100,
    ) {
        let image = raster(&pixels);
        let out = remove_colors(&image, &manual(target, threshold)).image;
        for (a, b) in image.pixels().zip(out.pixels()) {
            prop_assert_eq!(&a.0[..3], &b.0[..3]);
        }
    }
}
