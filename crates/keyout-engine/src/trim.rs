//! Crop a raster to its visible content.

use crate::scan::{Bounds, BoundsBuilder};
use crate::types::RgbaImage;

/// Bounding box of all pixels with `alpha > 0`, or `None` if there are
/// none.
#[must_use]
pub fn content_bounds(image: &RgbaImage) -> Option<Bounds> {
    let mut bounds = BoundsBuilder::new();
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[3] > 0 {
            bounds.include(x, y);
        }
    }
    bounds.build()
}

/// Crop to [`content_bounds`].
///
/// A raster with no visible pixel yields a 1×1 fully transparent raster.
#[must_use = "returns the cropped raster"]
pub fn trim(image: &RgbaImage) -> RgbaImage {
    content_bounds(image).map_or_else(
        || RgbaImage::new(1, 1),
        |b| image::imageops::crop_imm(image, b.x, b.y, b.width, b.height).to_image(),
    )
}
