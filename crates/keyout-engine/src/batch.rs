//! Image queue: run the pipeline over several images, one at a time.
//!
//! Each [`ImageItem`] moves `Pending → Processing → Completed` or ends in
//! `Error`. A failed image never stops the batch. Cancellation is checked
//! between images and at every stage boundary; the image that was in
//! flight is restored to the state it had before the batch touched it.

use std::hash::Hasher;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

use crate::diagnostics::PipelineDiagnostics;
use crate::pipeline::{CancelToken, Pipeline, Progress, RunOutcome};
use crate::scan::ScanLimits;
use crate::settings::EditorSettings;
use crate::types::{EngineError, PipelineWarning, RgbaImage, ensure_same_dimensions};

/// Default pause between images.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

/// Lifecycle of one queued image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "camelCase")]
pub enum ItemStatus {
    /// Not yet processed, or reset.
    #[default]
    Pending,
    /// The pipeline is running on it.
    Processing,
    /// A processed raster is available.
    Completed,
    /// Decoding or processing failed.
    Error(String),
}

/// Fingerprint of a raster plus the settings that affect its processed
/// output.
///
/// Display and download effects are excluded; changing them never
/// requires reprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessKey(u64);

impl ProcessKey {
    /// Hash `raster` together with the processing-relevant settings.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSettings`] if the settings cannot be
    /// serialized.
    pub fn compute(raster: &RgbaImage, settings: &EditorSettings) -> Result<Self, EngineError> {
        let relevant = (&settings.color_removal, &settings.edge_cleanup, &settings.speckle);
        let json = serde_json::to_vec(&relevant).map_err(|e| EngineError::InvalidSettings(e.to_string()))?;
        let mut hasher = SipHasher13::new();
        hasher.write_u32(raster.width());
        hasher.write_u32(raster.height());
        hasher.write(raster.as_raw());
        hasher.write(&json);
        Ok(Self(hasher.finish()))
    }

    /// The raw hash value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// One image in the queue.
#[derive(Debug, Clone)]
pub struct ImageItem {
    id: u64,
    name: String,
    source: Vec<u8>,
    status: ItemStatus,
    progress: u8,
    original: Option<RgbaImage>,
    processed: Option<RgbaImage>,
    warnings: Vec<PipelineWarning>,
    diagnostics: Option<PipelineDiagnostics>,
    process_key: Option<ProcessKey>,
}

/// The fields a cancelled run puts back.
struct Snapshot {
    status: ItemStatus,
    progress: u8,
    processed: Option<RgbaImage>,
    warnings: Vec<PipelineWarning>,
    diagnostics: Option<PipelineDiagnostics>,
    process_key: Option<ProcessKey>,
}

impl ImageItem {
    /// Queue encoded image file bytes. Decoding happens on first use.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>, source: Vec<u8>) -> Self {
        Self {
            id,
            name: name.into(),
            source,
            status: ItemStatus::Pending,
            progress: 0,
            original: None,
            processed: None,
            warnings: Vec::new(),
            diagnostics: None,
            process_key: None,
        }
    }

    /// Queue an already-decoded raster.
    #[must_use]
    pub fn from_raster(id: u64, name: impl Into<String>, raster: RgbaImage) -> Self {
        let mut item = Self::new(id, name, Vec::new());
        item.original = Some(raster);
        item
    }

    /// Caller-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Display/file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> &ItemStatus {
        &self.status
    }

    /// Percent complete of the latest run.
    #[must_use]
    pub const fn progress(&self) -> u8 {
        self.progress
    }

    /// The processed raster, once completed.
    #[must_use]
    pub const fn processed(&self) -> Option<&RgbaImage> {
        self.processed.as_ref()
    }

    /// Warnings from the latest successful run.
    #[must_use]
    pub fn warnings(&self) -> &[PipelineWarning] {
        &self.warnings
    }

    /// Diagnostics from the latest successful run.
    #[must_use]
    pub const fn diagnostics(&self) -> Option<&PipelineDiagnostics> {
        self.diagnostics.as_ref()
    }

    /// Key of the latest successful run.
    #[must_use]
    pub const fn process_key(&self) -> Option<ProcessKey> {
        self.process_key
    }

    /// The decoded source raster, decoding on first access.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::decode::decode`] failures.
    pub fn original(&mut self) -> Result<&RgbaImage, EngineError> {
        let raster = match self.original.take() {
            Some(raster) => raster,
            None => crate::decode::decode(&self.source)?,
        };
        Ok(self.original.insert(raster))
    }

    /// Replace the processed raster after a manual edit such as an erase
    /// stroke. The process key is kept, so an unchanged-settings rerun
    /// leaves the edit in place.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] if `raster` differs in
    /// size from the current processed raster, or
    /// [`EngineError::InvalidSettings`] if there is none yet.
    pub fn replace_processed(&mut self, raster: RgbaImage) -> Result<(), EngineError> {
        let Some(current) = self.processed.as_mut() else {
            return Err(EngineError::InvalidSettings(format!(
                "image {} has no processed raster to edit",
                self.id
            )));
        };
        ensure_same_dimensions(current, &raster)?;
        *current = raster;
        Ok(())
    }

    /// Drop processed output and return to `Pending`.
    pub fn reset(&mut self) {
        self.status = ItemStatus::Pending;
        self.progress = 0;
        self.processed = None;
        self.warnings.clear();
        self.diagnostics = None;
        self.process_key = None;
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status.clone(),
            progress: self.progress,
            processed: self.processed.clone(),
            warnings: self.warnings.clone(),
            diagnostics: self.diagnostics.clone(),
            process_key: self.process_key,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.status = snapshot.status;
        self.progress = snapshot.progress;
        self.processed = snapshot.processed;
        self.warnings = snapshot.warnings;
        self.diagnostics = snapshot.diagnostics;
        self.process_key = snapshot.process_key;
    }

    fn fail(&mut self, message: String) {
        self.status = ItemStatus::Error(message);
        self.progress = 0;
    }
}

/// Something that happened to one queued image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BatchEvent {
    /// The pipeline started on the image.
    Started {
        /// Item id.
        id: u64,
    },
    /// A stage finished.
    Progress {
        /// Item id.
        id: u64,
        /// The checkpoint reached.
        progress: Progress,
    },
    /// The image completed.
    Completed {
        /// Item id.
        id: u64,
        /// Number of warnings attached.
        warnings: usize,
    },
    /// The image was already processed with the same key.
    Skipped {
        /// Item id.
        id: u64,
    },
    /// The image failed; the batch continues.
    Failed {
        /// Item id.
        id: u64,
        /// Error message, also stored on the item.
        message: String,
    },
}

/// Per-batch counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Images that completed.
    pub succeeded: usize,
    /// Images that ended in `Error`.
    pub failed: usize,
    /// Images skipped because their key was unchanged.
    pub skipped: usize,
    /// Images left untouched because the batch was cancelled, including
    /// the one that was in flight.
    pub cancelled: usize,
}

/// How a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every image was visited.
    Completed(BatchSummary),
    /// Cancellation stopped the batch early.
    Cancelled(BatchSummary),
}

impl BatchOutcome {
    /// The counts, however the batch ended.
    #[must_use]
    pub const fn summary(&self) -> &BatchSummary {
        match self {
            Self::Completed(s) | Self::Cancelled(s) => s,
        }
    }
}

/// Runs the pipeline over a queue with fixed settings.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    settings: EditorSettings,
    limits: ScanLimits,
    settle: Duration,
}

impl BatchRunner {
    /// Validate `settings` and build a runner with default limits and
    /// settle delay.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSettings`] if validation fails.
    pub fn new(settings: EditorSettings) -> Result<Self, EngineError> {
        settings.validate()?;
        Ok(Self {
            settings,
            limits: ScanLimits::default(),
            settle: DEFAULT_SETTLE,
        })
    }

    /// Override scan limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Override the pause between images. Zero disables it.
    #[must_use]
    pub const fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// The settings every image is processed with.
    #[must_use]
    pub const fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    /// Process `items` in order.
    pub fn run(
        &self,
        items: &mut [ImageItem],
        cancel: &CancelToken,
        mut on_event: impl FnMut(BatchEvent),
    ) -> BatchOutcome {
        let mut summary = BatchSummary::default();
        let total = items.len();

        for (index, item) in items.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = total - index;
                log::info!("batch cancelled: {summary:?}");
                return BatchOutcome::Cancelled(summary);
            }
            if index > 0 {
                self.settle();
            }

            match self.process_item(item, cancel, &mut on_event) {
                Ok(ItemResult::Completed) => summary.succeeded += 1,
                Ok(ItemResult::Skipped) => summary.skipped += 1,
                Ok(ItemResult::Cancelled) => {
                    summary.cancelled = total - index;
                    log::info!("batch cancelled: {summary:?}");
                    return BatchOutcome::Cancelled(summary);
                }
                Err(e) => {
                    let message = e.to_string();
                    log::warn!("{} failed: {message}", item.name);
                    item.fail(message.clone());
                    on_event(BatchEvent::Failed { id: item.id, message });
                    summary.failed += 1;
                }
            }
        }

        log::info!(
            "batch complete: {} succeeded, {} failed, {} skipped",
            summary.succeeded,
            summary.failed,
            summary.skipped
        );
        BatchOutcome::Completed(summary)
    }

    fn process_item(
        &self,
        item: &mut ImageItem,
        cancel: &CancelToken,
        on_event: &mut impl FnMut(BatchEvent),
    ) -> Result<ItemResult, EngineError> {
        let original = item.original()?.clone();
        let key = ProcessKey::compute(&original, &self.settings)?;
        if item.status == ItemStatus::Completed && item.process_key == Some(key) {
            log::debug!("{} unchanged, skipping", item.name);
            on_event(BatchEvent::Skipped { id: item.id });
            return Ok(ItemResult::Skipped);
        }

        let snapshot = item.snapshot();
        item.status = ItemStatus::Processing;
        item.progress = 0;
        on_event(BatchEvent::Started { id: item.id });

        let id = item.id;
        let pending = Pipeline::with_limits(original, self.settings.clone(), self.limits);
        let outcome = crate::pipeline::run(pending, cancel, |progress| {
            item.progress = progress.percent;
            on_event(BatchEvent::Progress { id, progress });
        });

        match outcome {
            RunOutcome::Completed(output) => {
                for warning in &output.warnings {
                    log::warn!("{}: {warning}", item.name);
                }
                on_event(BatchEvent::Completed {
                    id,
                    warnings: output.warnings.len(),
                });
                let output = *output;
                item.processed = Some(output.image);
                item.warnings = output.warnings;
                item.diagnostics = Some(output.diagnostics);
                item.process_key = Some(key);
                item.status = ItemStatus::Completed;
                Ok(ItemResult::Completed)
            }
            RunOutcome::Cancelled => {
                item.restore(snapshot);
                Ok(ItemResult::Cancelled)
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn settle(&self) {
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
    }

    // The browser main thread cannot block; the host schedules batches.
    #[cfg(target_arch = "wasm32")]
    const fn settle(&self) {}
}

enum ItemResult {
    Completed,
    Skipped,
    Cancelled,
}
