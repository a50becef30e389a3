//! Shared types for the keyout pixel engine.

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can handle rasters
/// without depending on `image` directly.
pub use image::RgbaImage;

/// A width × height grid of 8-bit RGBA pixels, row-major.
///
/// `image::RgbaImage` already upholds `data.len() == width * height * 4`.
pub type Raster = RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing raster.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

/// A degraded-but-usable outcome attached to a processed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineWarning {
    /// A connectivity scan hit its pending-entry ceiling and returned a
    /// partial result. The named stage may have missed pixels.
    ScanTruncated {
        /// Pipeline stage name (e.g. `"contiguous"`).
        stage: String,
    },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScanTruncated { stage } => {
                write!(f, "{stage}: region scan truncated, result may be incomplete")
            }
        }
    }
}

/// A reversible whole-raster edit: the raster before and after.
///
/// Produced by interactive tools (the eraser) for the caller's undo
/// history.
#[derive(Debug, Clone)]
pub struct RasterEdit {
    before: RgbaImage,
    after: RgbaImage,
}

impl RasterEdit {
    /// Record an edit.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] if the two rasters
    /// differ in size.
    pub fn new(before: RgbaImage, after: RgbaImage) -> Result<Self, EngineError> {
        ensure_same_dimensions(&before, &after)?;
        Ok(Self { before, after })
    }

    /// The raster state prior to the edit.
    #[must_use]
    pub const fn before(&self) -> &RgbaImage {
        &self.before
    }

    /// The raster state after the edit.
    #[must_use]
    pub const fn after(&self) -> &RgbaImage {
        &self.after
    }

    /// Restore `target` to the pre-edit state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] if `target` is not the
    /// size of the recorded raster.
    pub fn undo(&self, target: &mut RgbaImage) -> Result<(), EngineError> {
        ensure_same_dimensions(&self.before, target)?;
        target.clone_from(&self.before);
        Ok(())
    }

    /// Re-apply the edit to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] if `target` is not the
    /// size of the recorded raster.
    pub fn redo(&self, target: &mut RgbaImage) -> Result<(), EngineError> {
        ensure_same_dimensions(&self.after, target)?;
        target.clone_from(&self.after);
        Ok(())
    }
}

/// Fail with [`EngineError::DimensionMismatch`] unless both rasters match.
///
/// # Errors
///
/// See above.
pub fn ensure_same_dimensions(expected: &RgbaImage, actual: &RgbaImage) -> Result<(), EngineError> {
    if expected.dimensions() == actual.dimensions() {
        Ok(())
    } else {
        Err(EngineError::DimensionMismatch {
            expected: Dimensions::of(expected),
            actual: Dimensions::of(actual),
        })
    }
}

/// Errors produced by the engine.
///
/// Flood-fill truncation and batch cancellation are deliberately not
/// errors: see [`PipelineWarning`] and [`crate::batch::BatchSummary`].
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The source file exceeds the accepted size.
    #[error("file is {size} bytes, larger than the {max} byte limit")]
    FileTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Maximum accepted size in bytes.
        max: usize,
    },

    /// Width or height lies outside the accepted range.
    #[error("image is {width}x{height}, each side must be between {min} and {max} pixels")]
    DimensionsOutOfRange {
        /// Decoded width.
        width: u32,
        /// Decoded height.
        height: u32,
        /// Minimum accepted side length.
        min: u32,
        /// Maximum accepted side length.
        max: u32,
    },

    /// A settings bundle failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A color string could not be parsed.
    #[error("invalid color: {0}")]
    InvalidColor(String),

    /// Two raster operands that must match in size do not.
    #[error(
        "raster dimension mismatch: expected {}x{}, got {}x{}",
        expected.width, expected.height, actual.width, actual.height
    )]
    DimensionMismatch {
        /// Size of the reference raster.
        expected: Dimensions,
        /// Size of the offending raster.
        actual: Dimensions,
    },

    /// A seed point lies outside the raster.
    #[error("seed position ({x}, {y}) is outside the image")]
    SeedOutOfBounds {
        /// Seed x.
        x: u32,
        /// Seed y.
        y: u32,
    },

    /// The raster is locked by another in-flight operation.
    #[error("raster is busy: {0}")]
    Busy(&'static str),
}

/// Serde-compatible proxy for `EngineError`.
///
/// `image::ImageError` does not implement serde, so the `ImageDecode`
/// variant stores its `Display` string. `Busy` stores its reason as an
/// owned string.
#[derive(Serialize, Deserialize)]
enum EngineErrorProxy {
    EmptyInput,
    ImageDecode(String),
    FileTooLarge { size: usize, max: usize },
    DimensionsOutOfRange { width: u32, height: u32, min: u32, max: u32 },
    InvalidSettings(String),
    InvalidColor(String),
    DimensionMismatch { expected: Dimensions, actual: Dimensions },
    SeedOutOfBounds { x: u32, y: u32 },
    Busy(String),
}

impl Serialize for EngineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::EmptyInput => EngineErrorProxy::EmptyInput,
            Self::ImageDecode(e) => EngineErrorProxy::ImageDecode(e.to_string()),
            Self::FileTooLarge { size, max } => EngineErrorProxy::FileTooLarge {
                size: *size,
                max: *max,
            },
            Self::DimensionsOutOfRange {
                width,
                height,
                min,
                max,
            } => EngineErrorProxy::DimensionsOutOfRange {
                width: *width,
                height: *height,
                min: *min,
                max: *max,
            },
            Self::InvalidSettings(s) => EngineErrorProxy::InvalidSettings(s.clone()),
            Self::InvalidColor(s) => EngineErrorProxy::InvalidColor(s.clone()),
            Self::DimensionMismatch { expected, actual } => EngineErrorProxy::DimensionMismatch {
                expected: *expected,
                actual: *actual,
            },
            Self::SeedOutOfBounds { x, y } => EngineErrorProxy::SeedOutOfBounds { x: *x, y: *y },
            Self::Busy(reason) => EngineErrorProxy::Busy((*reason).to_string()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EngineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = EngineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            EngineErrorProxy::EmptyInput => Self::EmptyInput,
            // The typed image error cannot be rebuilt; keep its message.
            EngineErrorProxy::ImageDecode(msg) => {
                Self::InvalidSettings(format!("image decode error: {msg}"))
            }
            EngineErrorProxy::FileTooLarge { size, max } => Self::FileTooLarge { size, max },
            EngineErrorProxy::DimensionsOutOfRange {
                width,
                height,
                min,
                max,
            } => Self::DimensionsOutOfRange {
                width,
                height,
                min,
                max,
            },
            EngineErrorProxy::InvalidSettings(s) => Self::InvalidSettings(s),
            EngineErrorProxy::InvalidColor(s) => Self::InvalidColor(s),
            EngineErrorProxy::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            EngineErrorProxy::SeedOutOfBounds { x, y } => Self::SeedOutOfBounds { x, y },
            EngineErrorProxy::Busy(_) => Self::Busy("raster locked by another operation"),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn raster_edit_rejects_mismatched_sizes() {
        let result = RasterEdit::new(RgbaImage::new(2, 2), RgbaImage::new(3, 2));
        assert!(matches!(result, Err(EngineError::DimensionMismatch { .. })));
    }

    #[test]
    fn raster_edit_undo_and_redo() {
        let before = RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]));
        let after = RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 0]));
        let edit = RasterEdit::new(before.clone(), after.clone()).unwrap();

        let mut target = after.clone();
        edit.undo(&mut target).unwrap();
        assert_eq!(target, before);
        edit.redo(&mut target).unwrap();
        assert_eq!(target, after);
    }

    #[test]
    fn raster_edit_undo_checks_target_size() {
        let edit = RasterEdit::new(RgbaImage::new(2, 2), RgbaImage::new(2, 2)).unwrap();
        let mut wrong = RgbaImage::new(5, 5);
        assert!(matches!(
            edit.undo(&mut wrong),
            Err(EngineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn error_serde_round_trip_preserves_variant() {
        let err = EngineError::SeedOutOfBounds { x: 4, y: 9 };
        let json = serde_json::to_string(&err).unwrap();
        let back: EngineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, EngineError::SeedOutOfBounds { x: 4, y: 9 }));
    }

    #[test]
    fn error_serde_keeps_decode_message() {
        let decode_err = image::load_from_memory(&[0xFF, 0x00]).unwrap_err();
        let err = EngineError::ImageDecode(decode_err);
        let json = serde_json::to_string(&err).unwrap();
        let back: EngineError = serde_json::from_str(&json).unwrap();
        assert!(back.to_string().contains("image decode error"));
    }

    #[test]
    fn warning_display_names_stage() {
        let w = PipelineWarning::ScanTruncated {
            stage: "contiguous".into(),
        };
        assert!(w.to_string().starts_with("contiguous"));
    }
}
