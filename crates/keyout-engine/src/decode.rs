//! Raster input: decode image file bytes into an RGBA raster.
//!
//! Accepts whatever the `image` crate was built to decode (PNG, JPEG,
//! GIF, WebP). Size and dimension limits are checked before the pixel
//! data is decoded, so an oversized file is rejected without allocating
//! its full raster.

use std::io::Cursor;

use image::ImageReader;

use crate::types::{EngineError, RgbaImage};

/// Largest accepted source file, in bytes (25 MiB).
pub const MAX_FILE_BYTES: usize = 25 * 1024 * 1024;

/// Smallest accepted width or height.
pub const MIN_DIMENSION: u32 = 10;

/// Largest accepted width or height.
pub const MAX_DIMENSION: u32 = 4000;

/// Decode `bytes` to RGBA after checking size and dimension limits.
///
/// # Errors
///
/// In order of checking:
/// [`EngineError::EmptyInput`] for empty input,
/// [`EngineError::FileTooLarge`] above [`MAX_FILE_BYTES`],
/// [`EngineError::ImageDecode`] for an unrecognized or corrupt image,
/// [`EngineError::DimensionsOutOfRange`] if either side lies outside
/// `MIN_DIMENSION..=MAX_DIMENSION`.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, EngineError> {
    if bytes.is_empty() {
        return Err(EngineError::EmptyInput);
    }
    if bytes.len() > MAX_FILE_BYTES {
        return Err(EngineError::FileTooLarge {
            size: bytes.len(),
            max: MAX_FILE_BYTES,
        });
    }

    let (width, height) = reader(bytes)?.into_dimensions()?;
    check_dimensions(width, height)?;

    let image = reader(bytes)?.decode()?;
    log::debug!("decoded {width}x{height} image from {} bytes", bytes.len());
    Ok(image.to_rgba8())
}

fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, EngineError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EngineError::ImageDecode(image::ImageError::IoError(e)))
}

/// Reject sides outside `MIN_DIMENSION..=MAX_DIMENSION`.
///
/// # Errors
///
/// Returns [`EngineError::DimensionsOutOfRange`].
pub const fn check_dimensions(width: u32, height: u32) -> Result<(), EngineError> {
    if width >= MIN_DIMENSION
        && width <= MAX_DIMENSION
        && height >= MIN_DIMENSION
        && height <= MAX_DIMENSION
    {
        Ok(())
    } else {
        Err(EngineError::DimensionsOutOfRange {
            width,
            height,
            min: MIN_DIMENSION,
            max: MAX_DIMENSION,
        })
    }
}
