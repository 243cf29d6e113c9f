//! Import job state machine and progress checkpoints.
//!
//! ```text
//! PENDING ──begin──▶ RUNNING ──finish──▶ DONE
//!                       │
//!                       └────fail──────▶ FAILED
//! ```
//!
//! DONE and FAILED are terminal: no transition and no progress change is
//! accepted once either is reached. While RUNNING, progress never decreases.
//!
//! [`ImportJob`]'s transition methods are pure; [`JobTracker`] wraps them
//! and commits every change to the store before notifying the callback.

use crate::error::{ImportError, JobStateError};
use crate::model::{ImportJob, JobStatus};
use crate::progress::ProgressCallback;
use crate::store::BudgetStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress once page text has been extracted and stored.
pub const PAGES_STORED: u8 = 10;
/// Progress once sections have been built and stored.
pub const SECTIONS_STORED: u8 = 20;
/// Share of progress spread across section processing.
pub const SECTION_SPAN: u8 = 70;

/// Progress after `completed` of `total` sections: `20 + ⌊70·completed/total⌋`.
pub fn section_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return SECTIONS_STORED + SECTION_SPAN;
    }
    let done = completed.min(total);
    SECTIONS_STORED + (SECTION_SPAN as usize * done / total) as u8
}

impl ImportJob {
    /// PENDING → RUNNING, progress reset to 0.
    pub fn begin(&mut self) -> Result<(), JobStateError> {
        self.ensure_not_terminal()?;
        if self.status != JobStatus::Pending {
            return Err(JobStateError::InvalidTransition {
                from: self.status,
                to: JobStatus::Running,
            });
        }
        self.status = JobStatus::Running;
        self.progress = 0;
        self.error_message = None;
        Ok(())
    }

    /// Raise progress to `progress` (clamped to 100).
    ///
    /// Returns whether the stored value changed; a lower value is ignored.
    pub fn set_progress(&mut self, progress: u8) -> Result<bool, JobStateError> {
        self.ensure_running()?;
        let next = progress.min(100).max(self.progress);
        let changed = next != self.progress;
        self.progress = next;
        Ok(changed)
    }

    /// RUNNING → DONE, progress forced to 100.
    pub fn finish(&mut self) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.status = JobStatus::Done;
        self.progress = 100;
        Ok(())
    }

    /// RUNNING → FAILED with `message`; progress is frozen where it was.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), JobStateError> {
        self.ensure_running()?;
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        Ok(())
    }

    fn ensure_not_terminal(&self) -> Result<(), JobStateError> {
        if self.status.is_terminal() {
            Err(JobStateError::Terminal {
                status: self.status,
            })
        } else {
            Ok(())
        }
    }

    fn ensure_running(&self) -> Result<(), JobStateError> {
        self.ensure_not_terminal()?;
        if self.status == JobStatus::Pending {
            return Err(JobStateError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Running,
            });
        }
        Ok(())
    }
}

/// Drives one job through its checkpoints, persisting each change.
pub struct JobTracker {
    job: ImportJob,
    store: Arc<dyn BudgetStore>,
    callback: Option<ProgressCallback>,
}

impl JobTracker {
    pub fn new(job: ImportJob, store: Arc<dyn BudgetStore>, callback: Option<ProgressCallback>) -> Self {
        Self {
            job,
            store,
            callback,
        }
    }

    /// Current in-memory state (identical to the last committed state).
    pub fn job(&self) -> &ImportJob {
        &self.job
    }

    pub fn into_job(self) -> ImportJob {
        self.job
    }

    /// PENDING → RUNNING at 0 %.
    pub async fn start(&mut self) -> Result<(), ImportError> {
        let mut next = self.job.clone();
        next.begin()?;
        self.commit(next).await?;
        info!("Job {} started", self.job.id);
        self.notify_progress();
        Ok(())
    }

    /// Move progress forward; lower values and repeats are no-ops.
    pub async fn advance(&mut self, progress: u8) -> Result<(), ImportError> {
        let mut next = self.job.clone();
        if !next.set_progress(progress)? {
            return Ok(());
        }
        self.commit(next).await?;
        debug!("Job {} progress {}%", self.job.id, self.job.progress);
        self.notify_progress();
        Ok(())
    }

    /// RUNNING → DONE at 100 %.
    pub async fn complete(&mut self) -> Result<(), ImportError> {
        let mut next = self.job.clone();
        next.finish()?;
        self.commit(next).await?;
        info!("Job {} done", self.job.id);
        self.notify_progress();
        Ok(())
    }

    /// RUNNING → FAILED with `message`.
    ///
    /// The in-memory job is marked FAILED even when the store write fails,
    /// so the caller never retries the transition.
    pub async fn fail(&mut self, message: &str) -> Result<(), ImportError> {
        self.job.fail(message)?;
        warn!("Job {} failed: {}", self.job.id, message);
        self.store.save_job(&self.job).await?;
        Ok(())
    }

    async fn commit(&mut self, next: ImportJob) -> Result<(), ImportError> {
        self.store.save_job(&next).await?;
        self.job = next;
        Ok(())
    }

    fn notify_progress(&self) {
        if let Some(ref cb) = self.callback {
            cb.on_progress(self.job.id, self.job.progress);
        }
    }
}
