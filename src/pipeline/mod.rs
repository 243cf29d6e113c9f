//! Pipeline stages for budget document imports.
//!
//! Each submodule implements one step; [`crate::import::Importer`] wires
//! them together.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ sections ──▶ orchestrator ──▶ store
//! (pages)    (breadcrumbs)  (extract, categorise,
//!                            explain, normalize)
//!                 └──── job: status + progress at each checkpoint
//! ```
//!
//! 1. [`source`]   : page texts from a PDF (pdfium) or form-feed text;
//!    pdfium runs in `spawn_blocking`
//! 2. [`sections`] : heading heuristic and breadcrumb stack
//! 3. [`orchestrator`]: per-section analyst calls with fallbacks
//! 4. [`normalize`]: unit conversion to EUR
//! 5. [`job`]      : job state machine and progress checkpoints

pub mod job;
pub mod normalize;
pub mod orchestrator;
pub mod sections;
pub mod source;
