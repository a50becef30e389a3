//! Settings bundles: the contract between the UI layer and the engines.
//!
//! Each bundle is a plain serde struct with every field required. The
//! engines read nothing but these structs. [`EditorSettings::validate`]
//! is called at every boundary (CLI, worker, batch start) before any
//! engine sees the values.

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::types::EngineError;

/// Lowest accepted color-match threshold.
pub const MIN_THRESHOLD: u8 = 1;
/// Highest accepted color-match threshold.
pub const MAX_THRESHOLD: u8 = 100;
/// Largest edge-cleanup radius in pixels.
pub const MAX_EDGE_RADIUS: u8 = 50;

/// How the key color is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemovalMode {
    /// Key on the top-left pixel of each image.
    #[default]
    Auto,
    /// Key on the configured target color plus any picked colors.
    Manual,
}

/// An extra manual key color with its own threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedColor {
    /// Color to remove.
    pub color: Color,
    /// Match threshold, `1..=100`.
    pub threshold: u8,
}

/// Fill transparent holes smaller than `value` pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinRegionSize {
    /// Whether hole filling runs.
    pub enabled: bool,
    /// Holes with fewer pixels than this are filled.
    pub value: u32,
}

impl Default for MinRegionSize {
    fn default() -> Self {
        Self {
            enabled: false,
            value: 100,
        }
    }
}

/// Color keying configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorRemovalSettings {
    /// Whether color removal runs at all.
    pub enabled: bool,
    /// Auto (top-left pixel) or manual key color.
    pub mode: RemovalMode,
    /// Primary manual key color. Ignored in auto mode.
    pub target_color: Color,
    /// Primary match threshold, `1..=100`.
    pub threshold: u8,
    /// Only remove matches connected to the image border.
    pub contiguous: bool,
    /// Additional manual key colors. Ignored in auto mode.
    pub picked_colors: Vec<PickedColor>,
    /// Hole filling after keying.
    pub min_region_size: MinRegionSize,
}

impl Default for ColorRemovalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: RemovalMode::Auto,
            target_color: Color::WHITE,
            threshold: 30,
            contiguous: false,
            picked_colors: Vec::new(),
            min_region_size: MinRegionSize::default(),
        }
    }
}

/// Solid background shown behind transparent pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundSettings {
    /// Show the background in previews.
    pub enabled: bool,
    /// Background fill color.
    pub color: Color,
    /// Also bake the background into downloads.
    pub save_with_background: bool,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            color: Color::WHITE,
            save_with_background: false,
        }
    }
}

/// Two-tone luminance threshold stylization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InkStampSettings {
    /// Whether the stamp runs.
    pub enabled: bool,
    /// Ink color for dark pixels.
    pub color: Color,
    /// `1..=100`; higher values turn more pixels into ink.
    pub threshold: u8,
}

impl Default for InkStampSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            color: Color::BLACK,
            threshold: 50,
        }
    }
}

/// Tint toward a target hue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorizeSettings {
    /// Whether colorize runs.
    pub enabled: bool,
    /// Target hue in degrees, `0..=360`.
    pub hue: i32,
    /// Lightness offset, `-100..=100`.
    pub lightness: i32,
    /// Target saturation, `0..=100`.
    pub saturation: i32,
}

/// Per-pixel color adjustments. Zero values are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEffects {
    /// Additive brightness, `-100..=100`.
    pub brightness: i32,
    /// Contrast, `-100..=100`.
    pub contrast: i32,
    /// Vibrance, `-100..=100`.
    pub vibrance: i32,
    /// Hue rotation in degrees, `-180..=180`.
    pub hue: i32,
    /// Colorize tint.
    pub colorize: ColorizeSettings,
    /// Desaturate to luminance.
    pub black_and_white: bool,
    /// Invert RGB channels.
    pub invert: bool,
}

impl ImageEffects {
    /// `true` if applying these adjustments would change nothing.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.brightness == 0
            && self.contrast == 0
            && self.vibrance == 0
            && self.hue == 0
            && !self.colorize.enabled
            && !self.black_and_white
            && !self.invert
    }
}

/// Options that only affect exported files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSettings {
    /// Crop exports to the bounding box of visible pixels.
    pub trim_transparent_pixels: bool,
}

/// Display and download effects. Never baked into processed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectSettings {
    /// Background compositing.
    pub background: BackgroundSettings,
    /// Ink stamp stylization.
    pub ink_stamp: InkStampSettings,
    /// Per-pixel adjustments.
    pub image_effects: ImageEffects,
    /// Export-only options.
    pub download: DownloadSettings,
}

/// Alpha edge smoothing after keying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeCleanupSettings {
    /// Run the feathering pass.
    pub enabled: bool,
    /// Feather band width in pixels.
    pub trim_radius: u8,
    /// Run the legacy erosion pass.
    pub legacy_enabled: bool,
    /// Pixels to erode from the opaque region.
    pub legacy_radius: u8,
}

impl Default for EdgeCleanupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            trim_radius: 2,
            legacy_enabled: false,
            legacy_radius: 1,
        }
    }
}

/// Small opaque island handling.
///
/// `highlight_specks` and `remove_specks` are mutually exclusive; use
/// the setters to flip them so the other flag is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeckleSettings {
    /// Whether speck handling runs.
    pub enabled: bool,
    highlight_specks: bool,
    remove_specks: bool,
    /// Components with at most this many pixels are specks.
    pub min_speck_size: u32,
}

impl Default for SpeckleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            highlight_specks: false,
            remove_specks: false,
            min_speck_size: 50,
        }
    }
}

impl SpeckleSettings {
    /// Whether specks are overlaid in previews.
    #[must_use]
    pub const fn highlight_specks(&self) -> bool {
        self.highlight_specks
    }

    /// Whether specks are deleted by the pipeline.
    #[must_use]
    pub const fn remove_specks(&self) -> bool {
        self.remove_specks
    }

    /// Enable or disable highlighting. Enabling clears `remove_specks`.
    pub const fn set_highlight_specks(&mut self, on: bool) {
        self.highlight_specks = on;
        if on {
            self.remove_specks = false;
        }
    }

    /// Enable or disable removal. Enabling clears `highlight_specks`.
    pub const fn set_remove_specks(&mut self, on: bool) {
        self.remove_specks = on;
        if on {
            self.highlight_specks = false;
        }
    }
}

/// Every settings bundle the engines consume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSettings {
    /// Color keying.
    pub color_removal: ColorRemovalSettings,
    /// Display/download effects.
    pub effects: EffectSettings,
    /// Edge cleanup.
    pub edge_cleanup: EdgeCleanupSettings,
    /// Speck handling.
    pub speckle: SpeckleSettings,
}

impl EditorSettings {
    /// Check every range constraint.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSettings`] naming the first field
    /// that is out of range.
    pub fn validate(&self) -> Result<(), EngineError> {
        let cr = &self.color_removal;
        check_threshold("colorRemoval.threshold", cr.threshold)?;
        for (i, picked) in cr.picked_colors.iter().enumerate() {
            check_threshold(&format!("colorRemoval.pickedColors[{i}].threshold"), picked.threshold)?;
        }
        if cr.min_region_size.enabled && cr.min_region_size.value == 0 {
            return Err(EngineError::InvalidSettings(
                "colorRemoval.minRegionSize.value must be at least 1".into(),
            ));
        }

        check_threshold("effects.inkStamp.threshold", self.effects.ink_stamp.threshold)?;
        let fx = &self.effects.image_effects;
        check_range("effects.imageEffects.brightness", fx.brightness, -100, 100)?;
        check_range("effects.imageEffects.contrast", fx.contrast, -100, 100)?;
        check_range("effects.imageEffects.vibrance", fx.vibrance, -100, 100)?;
        check_range("effects.imageEffects.hue", fx.hue, -180, 180)?;
        check_range("effects.imageEffects.colorize.hue", fx.colorize.hue, 0, 360)?;
        check_range("effects.imageEffects.colorize.lightness", fx.colorize.lightness, -100, 100)?;
        check_range("effects.imageEffects.colorize.saturation", fx.colorize.saturation, 0, 100)?;

        let edge = &self.edge_cleanup;
        check_range("edgeCleanup.trimRadius", i32::from(edge.trim_radius), 1, i32::from(MAX_EDGE_RADIUS))?;
        check_range("edgeCleanup.legacyRadius", i32::from(edge.legacy_radius), 1, i32::from(MAX_EDGE_RADIUS))?;

        if self.speckle.highlight_specks && self.speckle.remove_specks {
            return Err(EngineError::InvalidSettings(
                "speckle.highlightSpecks and speckle.removeSpecks are mutually exclusive".into(),
            ));
        }
        Ok(())
    }
}

fn check_threshold(field: &str, value: u8) -> Result<(), EngineError> {
    check_range(field, i32::from(value), i32::from(MIN_THRESHOLD), i32::from(MAX_THRESHOLD))
}

fn check_range(field: &str, value: i32, min: i32, max: i32) -> Result<(), EngineError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidSettings(format!(
            "{field} = {value} is outside {min}..={max}"
        )))
    }
}
