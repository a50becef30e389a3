//! keyout-export: PNG output for processed rasters (sans-IO).
//!
//! Encodes a processed raster after applying download effects, and
//! derives the export filename from the source name. Returns bytes; the
//! caller decides where they go.

pub mod naming;
pub mod png;

pub use naming::export_filename;
pub use png::{ExportError, encode_png};

use keyout_engine::RgbaImage;
use keyout_engine::settings::EffectSettings;

/// A rendered, encoded export ready to be written or downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    /// Suggested filename, always ending in `.png`.
    pub filename: String,
    /// PNG file bytes.
    pub png: Vec<u8>,
    /// Width of the encoded raster.
    pub width: u32,
    /// Height of the encoded raster.
    pub height: u32,
}

/// Render `processed` for download and encode it as PNG.
///
/// # Errors
///
/// Returns [`ExportError::PngEncode`] if encoding fails.
pub fn export(processed: &RgbaImage, source_name: &str, effects: &EffectSettings) -> Result<Export, ExportError> {
    let rendered = keyout_engine::render_download(processed, effects);
    let png = encode_png(&rendered)?;
    Ok(Export {
        filename: export_filename(source_name, effects.download.trim_transparent_pixels),
        png,
        width: rendered.width(),
        height: rendered.height(),
    })
}
