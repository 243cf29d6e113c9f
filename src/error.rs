//! Error types for the budget-import library.
//!
//! Failures are split along the two containment tiers of the pipeline:
//!
//! * [`ImportError`]: **Fatal**: the job cannot continue (unreadable source,
//!   store unreachable, job in the wrong state). The job is marked FAILED with
//!   the error's display text and `Err(ImportError)` is returned from
//!   [`crate::import::Importer::run`].
//!
//! * [`AnalystError`]: **Non-fatal**: one extractor / categorizer / explainer
//!   call failed after its retries. The orchestrator replaces the result with
//!   a fallback and keeps going; the error is kept in
//!   [`crate::model::ImportReport::failed_sections`] for inspection.
//!
//! [`StoreError`] and [`JobStateError`] are the persistence and state-machine
//! failures; both convert into [`ImportError`].

use crate::model::JobStatus;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// All fatal (job-level) errors returned by the budget-import library.
#[derive(Debug, Error)]
pub enum ImportError {
    // ── Lookup errors ─────────────────────────────────────────────────────
    /// No import job with this id exists in the store.
    #[error("Import job {job_id} not found")]
    JobNotFound { job_id: Uuid },

    /// The job exists but its document does not.
    #[error("Document not found")]
    DocumentNotFound { document_id: Uuid },

    // ── Source errors ─────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("Source file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Text could not be pulled out of a page or file.
    #[error("Text extraction failed for '{path}': {detail}")]
    TextExtraction { path: PathBuf, detail: String },

    // ── Persistence / state ───────────────────────────────────────────────
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job state error: {0}")]
    JobState(#[from] JobStateError),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config / output ───────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of one analyst call.
///
/// Produced at the provider boundary once the retry policy gives up, or when
/// a response cannot be used at all.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum AnalystError {
    /// Every attempt of the retry policy failed.
    #[error("{operation}: failed after {attempts} attempts: {detail}")]
    Exhausted {
        operation: String,
        attempts: u32,
        detail: String,
    },

    /// The call succeeded but the response could not be interpreted.
    #[error("{operation}: malformed response: {detail}")]
    MalformedResponse { operation: String, detail: String },

    /// The capability is not available (no provider, disabled backend, ...).
    #[error("{operation}: unavailable: {detail}")]
    Unavailable { operation: String, detail: String },
}

/// Failure at the persistence boundary.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record with the same id already exists.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// An update targeted a record that does not exist.
    #[error("record not found: {0}")]
    Missing(String),
}

/// An illegal transition of the import job state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobStateError {
    /// DONE and FAILED accept no further transitions or progress changes.
    #[error("job is already {status} and cannot change")]
    Terminal { status: JobStatus },

    /// The requested transition is not part of the state machine.
    #[error("cannot move job from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_not_found_message_is_stable() {
        let e = ImportError::DocumentNotFound {
            document_id: Uuid::nil(),
        };
        assert_eq!(e.to_string(), "Document not found");
    }

    #[test]
    fn exhausted_display() {
        let e = AnalystError::Exhausted {
            operation: "extract".into(),
            attempts: 3,
            detail: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn store_error_converts_into_import_error() {
        let e: ImportError = StoreError::Unavailable("connection refused".into()).into();
        assert!(e.to_string().contains("connection refused"));
    }

    #[test]
    fn terminal_state_display() {
        let e = JobStateError::Terminal {
            status: JobStatus::Done,
        };
        assert_eq!(e.to_string(), "job is already DONE and cannot change");
    }

    #[test]
    fn analyst_error_serialises() {
        let e = AnalystError::MalformedResponse {
            operation: "extract".into(),
            detail: "expected value".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        let back: AnalystError = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, e);
    }
}
