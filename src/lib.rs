//! # budget-import
//!
//! Turn a multi-page budget document into evidence-linked, categorised line
//! items.
//!
//! Page text is split into breadcrumb sections by a line-level heading
//! heuristic. Each section is sent to a language model that lists the line
//! items it contains; every item is then categorised into a fixed 13-entry
//! taxonomy, explained in plain words and normalised to EUR. A job record
//! tracks status and progress so callers can poll it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / text
//!  │
//!  ├─ 1. Pages     per-page text via pdfium (spawn_blocking)        10 %
//!  ├─ 2. Sections  heading heuristic + breadcrumb stack             20 %
//!  ├─ 3. Items     per section: extract → categorise → explain
//!  │               → normalise → commit                       20–90 %
//!  └─ 4. Done      job DONE                                        100 %
//! ```
//!
//! A failed model call never aborts a job: extraction falls back to no
//! items, categorisation to the side's default category, explanation to a
//! template. Only failures outside those calls (unreadable file, store
//! errors) mark the job FAILED.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use budget_import::{Document, ImportConfig, ImportJob, Importer, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let document = Document::new(2024, "orcamento-2024.pdf");
//!     let job = ImportJob::pending(document.id);
//!     store.insert_document(document.clone())?;
//!     store.insert_job(job.clone())?;
//!
//!     // Provider from BUDGET_LLM_PROVIDER / BUDGET_LLM_MODEL or the environment.
//!     let importer = Importer::from_config(store.clone(), ImportConfig::default())?;
//!     let report = importer.run(document.id, job.id).await?;
//!     eprintln!("{} items from {} sections", report.item_count, report.section_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `budget-import` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyst;
pub mod config;
pub mod error;
pub mod import;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyst::{Analyst, Categorizer, DisabledAnalyst, Explainer, Extractor, LlmAnalyst, RetryPolicy};
pub use config::{ImportConfig, ImportConfigBuilder};
pub use error::{AnalystError, ImportError, JobStateError, StoreError};
pub use import::{resolve_analyst, resolve_provider, write_json_atomic, Importer};
pub use model::{
    BudgetItem, Category, Document, ExtractedItem, ImportJob, ImportReport, JobStatus, PageRecord,
    PageText, Section, SectionFailure, SectionRecord, Side, Unit,
};
pub use pipeline::normalize::normalize;
pub use pipeline::sections::build_sections;
pub use pipeline::source::{FormFeedTextSource, PdfTextSource, PdfiumTextSource};
pub use progress::{ImportProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::{BudgetStore, DocumentSnapshot, MemoryStore};
