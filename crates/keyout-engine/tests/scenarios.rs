//! Integration tests: end-to-end behavior through the public API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use image::Rgba;
use keyout_engine::eraser::erase_stroke;
use keyout_engine::region::analyze_specks;
use keyout_engine::scan::{Connectivity, ScanLimits, Scanner, is_visible};
use keyout_engine::settings::SpeckleSettings;
use keyout_engine::trim::trim;
use keyout_engine::{EditorSettings, RgbaImage, process_raster};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

fn alphas(image: &RgbaImage) -> Vec<u8> {
    image.pixels().map(|p| p.0[3]).collect()
}

fn removal_settings(threshold: u8, contiguous: bool) -> EditorSettings {
    let mut settings = EditorSettings::default();
    settings.color_removal.threshold = threshold;
    settings.color_removal.contiguous = contiguous;
    settings
}

#[test]
fn auto_removal_clears_background_colored_pixels() {
    let img = RgbaImage::from_fn(4, 1, |x, _| if x == 2 { BLACK } else { WHITE });
    let output = process_raster(img, &removal_settings(10, false));
    assert_eq!(alphas(&output.image), vec![0, 0, 255, 0]);
}

#[test]
fn black_center_survives_both_modes() {
    let img = RgbaImage::from_fn(3, 3, |x, y| if (x, y) == (1, 1) { BLACK } else { WHITE });
    for contiguous in [false, true] {
        let output = process_raster(img.clone(), &removal_settings(5, contiguous));
        assert_eq!(alphas(&output.image), vec![0, 0, 0, 0, 255, 0, 0, 0, 0]);
    }
}

#[test]
fn enclosed_background_divides_contiguous_from_global() {
    // White field, black ring at distance 1 from the center, white center.
    let img = RgbaImage::from_fn(5, 5, |x, y| {
        let ring = (1..=3).contains(&x) && (1..=3).contains(&y) && (x, y) != (2, 2);
        if ring { BLACK } else { WHITE }
    });

    let global = process_raster(img.clone(), &removal_settings(5, false));
    assert_eq!(global.image.get_pixel(2, 2).0[3], 0);

    let contiguous = process_raster(img, &removal_settings(5, true));
    assert_eq!(*contiguous.image.get_pixel(2, 2), WHITE);
    assert_eq!(contiguous.image.get_pixel(0, 0).0[3], 0);
}

#[test]
fn unit_brush_erases_exactly_the_stroke() {
    let img = RgbaImage::from_pixel(5, 5, BLACK);
    let out = erase_stroke(&img, &[(0, 0), (2, 0)], 1);
    for (x, y, p) in out.enumerate_pixels() {
        let expected = if y == 0 && x <= 2 { 0 } else { 255 };
        assert_eq!(p.0[3], expected, "pixel ({x}, {y})");
    }
}

#[test]
fn trim_finds_the_opaque_block() {
    let img = RgbaImage::from_fn(100, 100, |x, y| {
        if (5..15).contains(&x) && (5..15).contains(&y) { BLACK } else { CLEAR }
    });
    assert_eq!(trim(&img).dimensions(), (10, 10));
    assert_eq!(trim(&RgbaImage::new(100, 100)).dimensions(), (1, 1));
}

#[test]
fn diagonal_chain_is_one_speck_only_with_eight_neighbors() {
    let img = RgbaImage::from_fn(3, 3, |x, y| if x == y { BLACK } else { CLEAR });

    let report = analyze_specks(&img, 10, ScanLimits::default());
    assert_eq!(report.component_count, 1);
    assert_eq!(report.largest_component, 3);

    let four = Scanner::new(&img, Connectivity::Four, is_visible).components();
    assert_eq!(four.regions.len(), 3);
}

#[test]
fn enabling_removal_disables_highlighting() {
    let mut speckle = SpeckleSettings::default();
    speckle.set_highlight_specks(true);
    speckle.set_remove_specks(true);
    assert!(!speckle.highlight_specks());
    assert!(speckle.remove_specks());
}

#[test]
fn settings_round_trip_through_json() {
    let json = r##"{
        "colorRemoval": {
            "enabled": true,
            "mode": "manual",
            "targetColor": "#00ff00",
            "threshold": 40,
            "contiguous": true,
            "pickedColors": [{"color": "#0000ff", "threshold": 12}],
            "minRegionSize": {"enabled": true, "value": 25}
        },
        "effects": {
            "background": {"enabled": true, "color": "#ffffff", "saveWithBackground": false},
            "inkStamp": {"enabled": false, "color": "#000000", "threshold": 50},
            "imageEffects": {
                "brightness": 10, "contrast": 0, "vibrance": 0, "hue": 0,
                "colorize": {"enabled": false, "hue": 0, "lightness": 0, "saturation": 0},
                "blackAndWhite": false, "invert": false
            },
            "download": {"trimTransparentPixels": true}
        },
        "edgeCleanup": {"enabled": true, "trimRadius": 3, "legacyEnabled": false, "legacyRadius": 1},
        "speckle": {"enabled": true, "highlightSpecks": false, "removeSpecks": true, "minSpeckSize": 20}
    }"##;
    let settings: EditorSettings = serde_json::from_str(json).unwrap();
    settings.validate().unwrap();
    assert_eq!(settings.color_removal.picked_colors.len(), 1);
    assert!(settings.speckle.remove_specks());

    let back: EditorSettings = serde_json::from_str(&serde_json::to_string(&settings).unwrap()).unwrap();
    assert_eq!(back, settings);
}
