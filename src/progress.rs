//! Progress-callback trait for import job events.
//!
//! Inject an [`Arc<dyn ImportProgressCallback>`] via
//! [`crate::config::ImportConfigBuilder::progress_callback`] to observe jobs
//! as they move through the pipeline. The authoritative state is still the
//! [`crate::model::ImportJob`] record in the store; callbacks are a push
//! channel for terminals, logs and tests.
//!
//! Every method carries the job id, because one importer may run several
//! documents concurrently and share a single callback between them.
//!
//! # Example
//!
//! ```rust
//! use budget_import::{ImportConfig, ImportProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicU8, Ordering}};
//! use uuid::Uuid;
//!
//! struct LastProgress(AtomicU8);
//!
//! impl ImportProgressCallback for LastProgress {
//!     fn on_progress(&self, _job_id: Uuid, progress: u8) {
//!         self.0.store(progress, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ImportConfig::builder()
//!     .progress_callback(Arc::new(LastProgress(AtomicU8::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use uuid::Uuid;

/// Observer of import job events.
///
/// Implementations must be `Send + Sync`: jobs for different documents run
/// on different tasks. All methods default to no-ops.
pub trait ImportProgressCallback: Send + Sync {
    /// Called once the job is RUNNING and the page text is available.
    fn on_import_start(&self, job_id: Uuid, total_pages: usize) {
        let _ = (job_id, total_pages);
    }

    /// Called after every committed progress change (0–100).
    fn on_progress(&self, job_id: Uuid, progress: u8) {
        let _ = (job_id, progress);
    }

    /// Called before a section is sent to the extractor.
    ///
    /// # Arguments
    /// * `index`: 0-based section position
    /// * `total`: number of sections in the document
    /// * `title_path`: rendered breadcrumb
    fn on_section_start(&self, job_id: Uuid, index: usize, total: usize, title_path: String) {
        let _ = (job_id, index, total, title_path);
    }

    /// Called after a section's items were committed.
    fn on_section_complete(&self, job_id: Uuid, index: usize, total: usize, item_count: usize) {
        let _ = (job_id, index, total, item_count);
    }

    /// Called when a section's extraction failed and it contributes no items.
    fn on_section_error(&self, job_id: Uuid, index: usize, total: usize, error: String) {
        let _ = (job_id, index, total, error);
    }

    /// Called once the job reached DONE.
    fn on_import_complete(&self, job_id: Uuid, item_count: usize) {
        let _ = (job_id, item_count);
    }

    /// Called once the job reached FAILED.
    fn on_import_failed(&self, job_id: Uuid, error: String) {
        let _ = (job_id, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ImportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ImportConfig`].
pub type ProgressCallback = Arc<dyn ImportProgressCallback>;
