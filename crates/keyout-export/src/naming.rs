//! Export filenames.

use std::path::Path;

/// Suffix for a full-size export.
pub const PROCESSED_SUFFIX: &str = "_processed";

/// Suffix for an export cropped to its content.
pub const TRIMMED_SUFFIX: &str = "_trimmed";

/// `<stem>_processed.png`, or `<stem>_trimmed.png` when trimming.
///
/// Only the final extension is dropped. A name with no usable stem
/// falls back to `image`.
#[must_use]
pub fn export_filename(source_name: &str, trimmed: bool) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    let suffix = if trimmed { TRIMMED_SUFFIX } else { PROCESSED_SUFFIX };
    format!("{stem}{suffix}.png")
}
