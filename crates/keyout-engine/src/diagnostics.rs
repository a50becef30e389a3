//! Pipeline diagnostics: timing and pixel counts for each stage.
//!
//! Every pipeline run collects these alongside its output raster. They
//! are cheap (one clock read per stage plus counters the stages already
//! compute) and are intended for threshold tuning and for explaining to a
//! user why a run removed more or less than expected.
//!
//! Timestamps come from the `web-time` crate, which uses
//! `performance.now()` on WASM and `std::time::Instant` on native.
//! Durations are serialized as fractional seconds (`f64`) because
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::RgbaImage;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// Stages that were skipped by settings are `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Global (non-contiguous) color keying.
    pub color_removal: Option<StageDiagnostics>,
    /// Border flood fill.
    pub contiguous: Option<StageDiagnostics>,
    /// Small hole filling.
    pub hole_fill: Option<StageDiagnostics>,
    /// Speck removal.
    pub speck_removal: Option<StageDiagnostics>,
    /// Feathering and erosion.
    pub edge_cleanup: Option<StageDiagnostics>,
    /// Wall-clock duration of the whole run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Before/after counts for the whole run.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific counts.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Global color keying.
    ColorRemoval {
        /// Number of key colors matched against.
        key_colors: usize,
        /// Pixels made transparent.
        pixels_removed: usize,
    },
    /// Border flood fill.
    Contiguous {
        /// Number of key colors matched against.
        key_colors: usize,
        /// Pixels made transparent.
        pixels_removed: usize,
        /// The fill hit its ceiling.
        truncated: bool,
    },
    /// Hole filling.
    HoleFill {
        /// Holes smaller than this were candidates.
        min_region_size: u32,
        /// Holes filled.
        holes_filled: usize,
        /// Pixels made opaque.
        pixels_filled: usize,
        /// Labeling hit its ceiling.
        truncated: bool,
    },
    /// Speck removal.
    SpeckRemoval {
        /// Components this size or smaller were removed.
        min_speck_size: u32,
        /// Components removed.
        specks_removed: usize,
        /// Pixels made transparent.
        pixels_removed: usize,
        /// Labeling hit its ceiling.
        truncated: bool,
    },
    /// Edge cleanup.
    EdgeCleanup {
        /// Feather band width, if feathering ran.
        feather_radius: Option<u8>,
        /// Erosion radius, if erosion ran.
        erode_radius: Option<u8>,
        /// Pixels whose alpha changed.
        pixels_changed: usize,
    },
}

/// Whole-run summary counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Raster width in pixels.
    pub image_width: u32,
    /// Raster height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Fully transparent pixels in the input.
    pub transparent_before: u64,
    /// Fully transparent pixels in the output.
    pub transparent_after: u64,
    /// Number of warnings attached to the output.
    pub warning_count: usize,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Color Removal", &self.color_removal),
            ("Contiguous", &self.contiguous),
            ("Hole Fill", &self.hole_fill),
            ("Speck Removal", &self.speck_removal),
            ("Edge Cleanup", &self.edge_cleanup),
        ];
        for (name, diag) in stages {
            let Some(diag) = diag else {
                lines.push(format!("{name:<24} {:>10} {:>10}  skipped", "-", "-"));
                continue;
            };
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Transparent: {} -> {}  |  Warnings: {}",
            self.summary.transparent_before, self.summary.transparent_after, self.summary.warning_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn truncated_note(truncated: bool) -> &'static str {
    if truncated { " (truncated)" } else { "" }
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::ColorRemoval {
            key_colors,
            pixels_removed,
        } => format!("{key_colors} keys, {pixels_removed} px removed"),
        StageMetrics::Contiguous {
            key_colors,
            pixels_removed,
            truncated,
        } => format!(
            "{key_colors} keys, {pixels_removed} px removed{}",
            truncated_note(*truncated)
        ),
        StageMetrics::HoleFill {
            min_region_size,
            holes_filled,
            pixels_filled,
            truncated,
        } => format!(
            "min={min_region_size} {holes_filled} holes, {pixels_filled} px filled{}",
            truncated_note(*truncated)
        ),
        StageMetrics::SpeckRemoval {
            min_speck_size,
            specks_removed,
            pixels_removed,
            truncated,
        } => format!(
            "min={min_speck_size} {specks_removed} specks, {pixels_removed} px removed{}",
            truncated_note(*truncated)
        ),
        StageMetrics::EdgeCleanup {
            feather_radius,
            erode_radius,
            pixels_changed,
        } => {
            let feather = feather_radius.map_or_else(|| "off".to_owned(), |r| r.to_string());
            let erode = erode_radius.map_or_else(|| "off".to_owned(), |r| r.to_string());
            format!("feather={feather} erode={erode} {pixels_changed} px changed")
        }
    }
}

/// Count fully transparent pixels.
pub(crate) fn count_transparent(image: &RgbaImage) -> u64 {
    image.pixels().map(|p| u64::from(p.0[3] == 0)).sum()
}
