//! keyout-engine: pure background and color removal engine (sans-IO).
//!
//! Turns opaque pixels transparent through:
//! color keying (global or border-contiguous) -> hole filling ->
//! speck removal -> edge feathering/erosion.
//! Display and download effects, trimming, the eraser, and the magic
//! wand operate on the processed raster afterwards.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! rasters and byte slices and returns structured data. Encoding,
//! files, and browser interaction live in `keyout-export`, the
//! `keyout` CLI, and `keyout-worker`.

pub mod batch;
pub mod color;
pub mod decode;
pub mod diagnostics;
pub mod edge;
pub mod effects;
pub mod eraser;
pub mod pipeline;
pub mod region;
pub mod removal;
pub mod scan;
pub mod settings;
pub mod trim;
pub mod types;

pub use batch::{BatchEvent, BatchOutcome, BatchRunner, BatchSummary, ImageItem, ItemStatus, ProcessKey};
pub use color::{Color, ColorMatcher, KeySet};
pub use diagnostics::{PipelineDiagnostics, StageDiagnostics, StageMetrics};
pub use effects::{EffectTarget, render_download, render_preview};
pub use eraser::EraseSession;
pub use pipeline::{CancelToken, Pipeline, PipelineOutput, Progress, RunOutcome};
pub use removal::MagicWand;
pub use scan::{Connectivity, ScanLimits};
pub use settings::EditorSettings;
pub use types::{Dimensions, EngineError, PipelineWarning, RasterEdit, RgbaImage};

/// Decode image file bytes and run the full pipeline.
///
/// # Pipeline steps
///
/// 1. Decode and check size limits
/// 2. Global color removal (non-contiguous mode)
/// 3. Border flood fill (contiguous mode)
/// 4. Small hole filling
/// 5. Speck removal
/// 6. Edge feathering and erosion
///
/// # Errors
///
/// Returns [`EngineError::InvalidSettings`] if `settings` fail
/// validation, or any [`decode::decode`] error.
pub fn process(image_bytes: &[u8], settings: &EditorSettings) -> Result<PipelineOutput, EngineError> {
    settings.validate()?;
    let image = decode::decode(image_bytes)?;
    Ok(process_raster(image, settings))
}

/// Run the full pipeline on an already-decoded raster.
///
/// Settings are not validated.
#[must_use = "returns the processed raster"]
pub fn process_raster(image: RgbaImage, settings: &EditorSettings) -> PipelineOutput {
    use pipeline::PipelineStage;

    Pipeline::new(image, settings.clone()).complete()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;

    /// 20x20 white PNG with a 6x6 red square at (7, 7).
    fn red_square_png() -> Vec<u8> {
        let img = RgbaImage::from_fn(20, 20, |x, y| {
            if (7..13).contains(&x) && (7..13).contains(&y) {
                Rgba([220, 20, 20, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn process_keys_out_white_background() {
        let output = process(&red_square_png(), &EditorSettings::default()).unwrap();
        let visible = output.image.pixels().filter(|p| p.0[3] > 0).count();
        assert_eq!(visible, 36);
        assert!(output.warnings.is_empty());
        assert_eq!(output.diagnostics.summary.transparent_after, 400 - 36);
    }

    #[test]
    fn process_rejects_invalid_settings() {
        let mut settings = EditorSettings::default();
        settings.color_removal.threshold = 101;
        assert!(matches!(
            process(&red_square_png(), &settings),
            Err(EngineError::InvalidSettings(_))
        ));
    }

    #[test]
    fn process_empty_input_returns_error() {
        assert!(matches!(
            process(&[], &EditorSettings::default()),
            Err(EngineError::EmptyInput)
        ));
    }
}
