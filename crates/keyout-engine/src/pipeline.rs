//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate raster before continuing.
//!
//! ```rust
//! # use keyout_engine::{EditorSettings, Pipeline, RgbaImage};
//! let image = RgbaImage::from_pixel(16, 16, image::Rgba([255, 255, 255, 255]));
//! let output = Pipeline::new(image, EditorSettings::default())
//!     .remove_colors()
//!     .remove_contiguous()
//!     .fill_holes()
//!     .remove_specks()
//!     .clean_edges()
//!     .into_output();
//! assert!(output.image.pixels().all(|p| p.0[3] == 0));
//! ```
//!
//! Each stage method consumes `self` and returns the next state, so
//! stages cannot be skipped or reordered. A stage whose settings are
//! disabled passes the raster through unchanged and records no
//! diagnostics.
//!
//! For cancellable, progress-reporting execution use [`run`], which
//! drives the same stages through the type-erased [`Stage`] enum.
//!
//! The output never has display or download effects baked in; see
//! [`crate::effects`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use web_time::Instant;

use crate::diagnostics::{PipelineDiagnostics, PipelineSummary, StageDiagnostics, StageMetrics, count_transparent};
use crate::scan::ScanLimits;
use crate::settings::EditorSettings;
use crate::types::{PipelineWarning, RgbaImage};

/// State threaded through every stage.
struct Carry {
    settings: EditorSettings,
    limits: ScanLimits,
    started: Instant,
    transparent_before: u64,
    warnings: Vec<PipelineWarning>,
    diagnostics: StageRecords,
}

#[derive(Default)]
struct StageRecords {
    color_removal: Option<StageDiagnostics>,
    contiguous: Option<StageDiagnostics>,
    hole_fill: Option<StageDiagnostics>,
    speck_removal: Option<StageDiagnostics>,
    edge_cleanup: Option<StageDiagnostics>,
}

impl Carry {
    fn record(&mut self, stage: &'static str, started: Instant, metrics: StageMetrics, truncated: bool) -> StageDiagnostics {
        let duration = started.elapsed();
        log::debug!("{stage}: {metrics:?} in {:.3}ms", duration.as_secs_f64() * 1000.0);
        if truncated {
            log::warn!("{stage}: region scan hit its ceiling, result may be incomplete");
            self.warnings.push(PipelineWarning::ScanTruncated {
                stage: stage.to_owned(),
            });
        }
        StageDiagnostics { duration, metrics }
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
#[must_use = "pipeline stages are consumed by advancing: call .remove_colors() to continue"]
pub struct Pending {
    carry: Carry,
    image: RgbaImage,
}

impl Pending {
    /// The unprocessed raster.
    #[must_use]
    pub const fn source(&self) -> &RgbaImage {
        &self.image
    }

    /// Key out matching colors everywhere in the raster.
    ///
    /// Runs only when color removal is enabled and not contiguous;
    /// contiguous keying happens in the next stage instead.
    pub fn remove_colors(self) -> ColorsRemoved {
        let Self { mut carry, image } = self;
        let cr = &carry.settings.color_removal;
        let (image, diagnostics) = if cr.enabled && !cr.contiguous {
            let t = Instant::now();
            let key_colors = crate::removal::key_set(&image, cr).matchers().len();
            let removal = crate::removal::remove_colors(&image, cr);
            let metrics = StageMetrics::ColorRemoval {
                key_colors,
                pixels_removed: removal.removed,
            };
            let diag = carry.record(ColorsRemoved::NAME, t, metrics, removal.truncated);
            (removal.image, Some(diag))
        } else {
            (image, None)
        };
        carry.diagnostics.color_removal.clone_from(&diagnostics);
        ColorsRemoved {
            carry,
            image,
            diagnostics,
        }
    }
}

// ───────────────────────── Stage 1: ColorsRemoved ────────────────────

/// Pipeline state after global color keying.
#[must_use = "pipeline stages are consumed by advancing: call .remove_contiguous() to continue"]
pub struct ColorsRemoved {
    carry: Carry,
    image: RgbaImage,
    diagnostics: Option<StageDiagnostics>,
}

impl ColorsRemoved {
    /// The raster after this stage.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Key out matching colors reachable from the border.
    ///
    /// Runs only when color removal is enabled and contiguous.
    pub fn remove_contiguous(self) -> ContiguousRemoved {
        let Self { mut carry, image, .. } = self;
        let cr = &carry.settings.color_removal;
        let (image, diagnostics) = if cr.enabled && cr.contiguous {
            let t = Instant::now();
            let key_colors = crate::removal::key_set(&image, cr).matchers().len();
            let removal = crate::removal::remove_contiguous(&image, cr, carry.limits);
            let metrics = StageMetrics::Contiguous {
                key_colors,
                pixels_removed: removal.removed,
                truncated: removal.truncated,
            };
            let diag = carry.record(ContiguousRemoved::NAME, t, metrics, removal.truncated);
            (removal.image, Some(diag))
        } else {
            (image, None)
        };
        carry.diagnostics.contiguous.clone_from(&diagnostics);
        ContiguousRemoved {
            carry,
            image,
            diagnostics,
        }
    }
}

// ───────────────────────── Stage 2: ContiguousRemoved ────────────────

/// Pipeline state after border flood fill.
#[must_use = "pipeline stages are consumed by advancing: call .fill_holes() to continue"]
pub struct ContiguousRemoved {
    carry: Carry,
    image: RgbaImage,
    diagnostics: Option<StageDiagnostics>,
}

impl ContiguousRemoved {
    /// The raster after this stage.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Fill transparent holes smaller than the minimum region size.
    ///
    /// Runs only when color removal and the minimum region size are both
    /// enabled.
    pub fn fill_holes(self) -> HolesFilled {
        let Self { mut carry, image, .. } = self;
        let cr = &carry.settings.color_removal;
        let (image, diagnostics) = if cr.enabled && cr.min_region_size.enabled {
            let t = Instant::now();
            let min = cr.min_region_size.value;
            let fill = crate::region::fill_holes(&image, min, carry.limits);
            let metrics = StageMetrics::HoleFill {
                min_region_size: min,
                holes_filled: fill.holes_filled,
                pixels_filled: fill.pixels_filled,
                truncated: fill.truncated,
            };
            let diag = carry.record(HolesFilled::NAME, t, metrics, fill.truncated);
            (fill.image, Some(diag))
        } else {
            (image, None)
        };
        carry.diagnostics.hole_fill.clone_from(&diagnostics);
        HolesFilled {
            carry,
            image,
            diagnostics,
        }
    }
}

// ───────────────────────── Stage 3: HolesFilled ──────────────────────

/// Pipeline state after hole filling.
#[must_use = "pipeline stages are consumed by advancing: call .remove_specks() to continue"]
pub struct HolesFilled {
    carry: Carry,
    image: RgbaImage,
    diagnostics: Option<StageDiagnostics>,
}

impl HolesFilled {
    /// The raster after this stage.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Delete small opaque islands.
    ///
    /// Runs only when speck handling is enabled in removal mode.
    /// Highlighting is a display concern and never runs here.
    pub fn remove_specks(self) -> SpecksRemoved {
        let Self { mut carry, image, .. } = self;
        let speckle = carry.settings.speckle;
        let (image, diagnostics) = if speckle.enabled && speckle.remove_specks() {
            let t = Instant::now();
            let pass = crate::region::remove_specks(&image, speckle.min_speck_size, carry.limits);
            let metrics = StageMetrics::SpeckRemoval {
                min_speck_size: speckle.min_speck_size,
                specks_removed: pass.specks,
                pixels_removed: pass.pixels,
                truncated: pass.truncated,
            };
            let diag = carry.record(SpecksRemoved::NAME, t, metrics, pass.truncated);
            (pass.image, Some(diag))
        } else {
            (image, None)
        };
        carry.diagnostics.speck_removal.clone_from(&diagnostics);
        SpecksRemoved {
            carry,
            image,
            diagnostics,
        }
    }
}

// ───────────────────────── Stage 4: SpecksRemoved ────────────────────

/// Pipeline state after speck removal.
#[must_use = "pipeline stages are consumed by advancing: call .clean_edges() to continue"]
pub struct SpecksRemoved {
    carry: Carry,
    image: RgbaImage,
    diagnostics: Option<StageDiagnostics>,
}

impl SpecksRemoved {
    /// The raster after this stage.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Feather and/or erode the alpha boundary.
    pub fn clean_edges(self) -> EdgesCleaned {
        let Self { mut carry, image, .. } = self;
        let edge = carry.settings.edge_cleanup;
        let (image, diagnostics) = if edge.enabled || edge.legacy_enabled {
            let t = Instant::now();
            let pass = crate::edge::clean_edges(&image, &edge);
            let metrics = StageMetrics::EdgeCleanup {
                feather_radius: edge.enabled.then_some(edge.trim_radius),
                erode_radius: edge.legacy_enabled.then_some(edge.legacy_radius),
                pixels_changed: pass.pixels_changed,
            };
            let diag = carry.record(EdgesCleaned::NAME, t, metrics, false);
            (pass.image, Some(diag))
        } else {
            (image, None)
        };
        carry.diagnostics.edge_cleanup.clone_from(&diagnostics);
        EdgesCleaned {
            carry,
            image,
            diagnostics,
        }
    }
}

// ───────────────────────── Stage 5: EdgesCleaned ─────────────────────

/// Final pipeline state.
#[must_use = "call .into_output() to take the processed raster"]
pub struct EdgesCleaned {
    carry: Carry,
    image: RgbaImage,
    diagnostics: Option<StageDiagnostics>,
}

impl EdgesCleaned {
    /// The processed raster.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Consume the pipeline and return the processed raster with its
    /// warnings and diagnostics.
    pub fn into_output(self) -> PipelineOutput {
        let Self { carry, image, .. } = self;
        let records = carry.diagnostics;
        let summary = PipelineSummary {
            image_width: image.width(),
            image_height: image.height(),
            pixel_count: u64::from(image.width()) * u64::from(image.height()),
            transparent_before: carry.transparent_before,
            transparent_after: count_transparent(&image),
            warning_count: carry.warnings.len(),
        };
        let diagnostics = PipelineDiagnostics {
            color_removal: records.color_removal,
            contiguous: records.contiguous,
            hole_fill: records.hole_fill,
            speck_removal: records.speck_removal,
            edge_cleanup: records.edge_cleanup,
            total_duration: carry.started.elapsed(),
            summary,
        };
        PipelineOutput {
            image,
            warnings: carry.warnings,
            diagnostics,
        }
    }
}

/// A completed pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The processed raster, free of display/download effects.
    pub image: RgbaImage,
    /// Degraded-result conditions encountered along the way.
    pub warnings: Vec<PipelineWarning>,
    /// Per-stage timing and counts.
    pub diagnostics: PipelineDiagnostics,
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline, `Pending` included.
pub const STAGE_COUNT: usize = 6;

/// Trait implemented by every pipeline stage, enabling uniform iteration.
pub trait PipelineStage: Sized {
    /// Short name of this stage (e.g. `"contiguous"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for `Pending`).
    const INDEX: usize;

    /// Percent complete once this stage has run.
    const PROGRESS: u8;

    /// The raster as of this stage.
    fn output(&self) -> &RgbaImage;

    /// Metrics for the work done to reach this stage, or `None` for
    /// `Pending` and for stages skipped by settings.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage, or `None` at the final stage.
    fn next(self) -> Option<Stage>;

    /// Run all remaining stages and return the output.
    fn complete(self) -> PipelineOutput;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;
    const PROGRESS: u8 = 0;

    fn output(&self) -> &RgbaImage {
        &self.image
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Option<Stage> {
        Some(self.remove_colors().into())
    }

    fn complete(self) -> PipelineOutput {
        self.remove_colors().complete()
    }
}

impl PipelineStage for ColorsRemoved {
    const NAME: &str = "color_removal";
    const INDEX: usize = 1;
    const PROGRESS: u8 = 25;

    fn output(&self) -> &RgbaImage {
        &self.image
    }

    fn metrics(&self) -> Option<StageMetrics> {
        self.diagnostics.as_ref().map(|d| d.metrics.clone())
    }

    fn next(self) -> Option<Stage> {
        Some(self.remove_contiguous().into())
    }

    fn complete(self) -> PipelineOutput {
        self.remove_contiguous().complete()
    }
}

impl PipelineStage for ContiguousRemoved {
    const NAME: &str = "contiguous";
    const INDEX: usize = 2;
    const PROGRESS: u8 = 50;

    fn output(&self) -> &RgbaImage {
        &self.image
    }

    fn metrics(&self) -> Option<StageMetrics> {
        self.diagnostics.as_ref().map(|d| d.metrics.clone())
    }

    fn next(self) -> Option<Stage> {
        Some(self.fill_holes().into())
    }

    fn complete(self) -> PipelineOutput {
        self.fill_holes().complete()
    }
}

impl PipelineStage for HolesFilled {
    const NAME: &str = "hole_fill";
    const INDEX: usize = 3;
    const PROGRESS: u8 = 70;

    fn output(&self) -> &RgbaImage {
        &self.image
    }

    fn metrics(&self) -> Option<StageMetrics> {
        self.diagnostics.as_ref().map(|d| d.metrics.clone())
    }

    fn next(self) -> Option<Stage> {
        Some(self.remove_specks().into())
    }

    fn complete(self) -> PipelineOutput {
        self.remove_specks().complete()
    }
}

impl PipelineStage for SpecksRemoved {
    const NAME: &str = "speck_removal";
    const INDEX: usize = 4;
    const PROGRESS: u8 = 80;

    fn output(&self) -> &RgbaImage {
        &self.image
    }

    fn metrics(&self) -> Option<StageMetrics> {
        self.diagnostics.as_ref().map(|d| d.metrics.clone())
    }

    fn next(self) -> Option<Stage> {
        Some(self.clean_edges().into())
    }

    fn complete(self) -> PipelineOutput {
        self.clean_edges().complete()
    }
}

impl PipelineStage for EdgesCleaned {
    const NAME: &str = "edge_cleanup";
    const INDEX: usize = 5;
    const PROGRESS: u8 = 90;

    fn output(&self) -> &RgbaImage {
        &self.image
    }

    fn metrics(&self) -> Option<StageMetrics> {
        self.diagnostics.as_ref().map(|d| d.metrics.clone())
    }

    fn next(self) -> Option<Stage> {
        None
    }

    fn complete(self) -> PipelineOutput {
        self.into_output()
    }
}

/// Type-erased pipeline stage.
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`ColorsRemoved`].
    ColorsRemoved(ColorsRemoved),
    /// See [`ContiguousRemoved`].
    ContiguousRemoved(ContiguousRemoved),
    /// See [`HolesFilled`].
    HolesFilled(HolesFilled),
    /// See [`SpecksRemoved`].
    SpecksRemoved(SpecksRemoved),
    /// See [`EdgesCleaned`].
    EdgesCleaned(EdgesCleaned),
}

/// Compile-time guard: adding a [`Stage`] variant makes this match
/// non-exhaustive, a reminder to bump [`STAGE_COUNT`].
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::ColorsRemoved(_)
        | Stage::ContiguousRemoved(_)
        | Stage::HolesFilled(_)
        | Stage::SpecksRemoved(_)
        | Stage::EdgesCleaned(_) => {}
    }
}

/// Result of [`Stage::advance`].
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this stage.
    Next(Stage),
    /// The pipeline was already at the final stage, returned unchanged.
    Complete(Stage),
}

macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::ColorsRemoved(s) => s.$method($($arg),*),
            Self::ContiguousRemoved(s) => s.$method($($arg),*),
            Self::HolesFilled(s) => s.$method($($arg),*),
            Self::SpecksRemoved(s) => s.$method($($arg),*),
            Self::EdgesCleaned(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Short name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// Percent complete at the current stage.
    #[must_use]
    pub fn progress(&self) -> u8 {
        delegate!(self, progress)
    }

    /// The raster as of the current stage.
    #[must_use]
    pub fn output(&self) -> &RgbaImage {
        delegate!(self, output)
    }

    /// Metrics for the current stage, if it ran.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::EdgesCleaned(_))
    }

    /// Advance to the next stage, or `None` at the final stage.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        delegate!(self, next)
    }

    /// Advance to the next stage, returning `self` unchanged if already
    /// complete.
    pub fn advance(self) -> Advance {
        match self {
            Self::EdgesCleaned(s) => Advance::Complete(Self::EdgesCleaned(s)),
            Self::Pending(s) => Advance::Next(s.remove_colors().into()),
            Self::ColorsRemoved(s) => Advance::Next(s.remove_contiguous().into()),
            Self::ContiguousRemoved(s) => Advance::Next(s.fill_holes().into()),
            Self::HolesFilled(s) => Advance::Next(s.remove_specks().into()),
            Self::SpecksRemoved(s) => Advance::Next(s.clean_edges().into()),
        }
    }

    /// Run all remaining stages to completion.
    pub fn complete(self) -> PipelineOutput {
        delegate!(self, complete)
    }
}

// The associated constants are not reachable through `self`, so the
// delegate macro goes through this helper.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
    fn progress(&self) -> u8;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }

    fn progress(&self) -> u8 {
        T::PROGRESS
    }
}

macro_rules! stage_from {
    ($($ty:ident),*) => {
        $(
            impl From<$ty> for Stage {
                fn from(s: $ty) -> Self {
                    Self::$ty(s)
                }
            }
        )*
    };
}

stage_from!(Pending, ColorsRemoved, ContiguousRemoved, HolesFilled, SpecksRemoved, EdgesCleaned);

// ───────────────────── Pipeline entry point ──────────────────────────

/// Staged background-removal pipeline.
///
/// [`Pipeline::new`] stores the raster and settings without processing.
/// Settings are not validated here; callers at an input boundary should
/// call [`EditorSettings::validate`] first.
pub struct Pipeline;

impl Pipeline {
    /// Start a pipeline over `image` with default scan limits.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(image: RgbaImage, settings: EditorSettings) -> Pending {
        Self::with_limits(image, settings, ScanLimits::default())
    }

    /// Start a pipeline with explicit scan limits.
    pub fn with_limits(image: RgbaImage, settings: EditorSettings, limits: ScanLimits) -> Pending {
        Pending {
            carry: Carry {
                settings,
                limits,
                started: Instant::now(),
                transparent_before: count_transparent(&image),
                warnings: Vec::new(),
                diagnostics: StageRecords::default(),
            },
            image,
        }
    }
}

// ───────────────────── Cancellable driver ────────────────────────────

/// Shared cooperative cancellation flag.
///
/// Clones share the flag. Cancellation is polled at stage boundaries; a
/// stage already running always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A progress checkpoint for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Name of the stage that just finished, or `"complete"`.
    pub stage: &'static str,
    /// Percent complete, strictly increasing within one run.
    pub percent: u8,
}

/// Percent reported once the output has been assembled.
pub const PROGRESS_COMPLETE: u8 = 100;

/// How a driven run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// All stages ran.
    Completed(Box<PipelineOutput>),
    /// Cancellation was observed at a stage boundary; partial work was
    /// discarded.
    Cancelled,
}

/// Drive a pipeline to completion, reporting progress after each stage
/// and checking `cancel` before each stage and before assembling the
/// output.
pub fn run(pending: Pending, cancel: &CancelToken, mut on_progress: impl FnMut(Progress)) -> RunOutcome {
    let mut stage = Stage::from(pending);
    loop {
        if cancel.is_cancelled() {
            log::debug!("pipeline cancelled after stage {}", stage.name());
            return RunOutcome::Cancelled;
        }
        match stage.advance() {
            Advance::Next(next) => {
                on_progress(Progress {
                    stage: next.name(),
                    percent: next.progress(),
                });
                stage = next;
            }
            Advance::Complete(done) => {
                let output = done.complete();
                on_progress(Progress {
                    stage: "complete",
                    percent: PROGRESS_COMPLETE,
                });
                return RunOutcome::Completed(Box::new(output));
            }
        }
    }
}
