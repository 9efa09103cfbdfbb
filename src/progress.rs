//! Progress callbacks and cooperative cancellation.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through each unit. The CLI turns them into
//! an indicatif bar; the HTTP service turns them into NDJSON events.
//!
//! # Example
//!
//! ```rust
//! use pagewise::{ExtractionProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_unit_complete(&self, index: usize, total: usize, _title: &str, chars: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Unit {index}/{total} done ({chars} chars)");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Called by the pipeline as it processes each unit of a Source.
///
/// Units are processed one at a time, so calls never overlap for one
/// Source. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once per Source before the first unit.
    ///
    /// # Arguments
    /// * `source`      — path or URL of the Source
    /// * `total_units` — number of units that will be processed
    fn on_source_start(&self, source: &str, total_units: usize) {
        let _ = (source, total_units);
    }

    /// Called before a unit is fetched.
    ///
    /// # Arguments
    /// * `position`    — 1-based position in the run
    /// * `total_units` — units in this Source
    fn on_unit_start(&self, position: usize, total_units: usize) {
        let _ = (position, total_units);
    }

    /// Called by sources that learn a unit's title before fetching its payload
    /// (the video title, ahead of the subtitle download).
    fn on_unit_fetching(&self, position: usize, total_units: usize, title: &str) {
        let _ = (position, total_units, title);
    }

    /// Called when a unit produced text.
    fn on_unit_complete(&self, position: usize, total_units: usize, title: &str, chars: usize) {
        let _ = (position, total_units, title, chars);
    }

    /// Called when a unit failed or had no content; it is written empty.
    ///
    /// `no_content` separates "nothing there" from a real failure.
    fn on_unit_error(
        &self,
        position: usize,
        total_units: usize,
        title: &str,
        no_content: bool,
        error: String,
    ) {
        let _ = (position, total_units, title, no_content, error);
    }

    /// Called once after every unit was attempted (or the run was cancelled).
    ///
    /// # Arguments
    /// * `total_units`   — units in the Source
    /// * `success_count` — units that produced text
    fn on_source_complete(&self, total_units: usize, success_count: usize) {
        let _ = (total_units, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

/// Shared stop flag. Cloning shares the same flag.
///
/// The pipeline checks it between units: the in-flight unit finishes and is
/// written, sinks are finalised, and the run returns with `cancelled = true`.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
