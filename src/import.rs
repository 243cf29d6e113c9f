//! Import job runner.
//!
//! [`Importer::run`] takes one `(document_id, job_id)` pair through the whole
//! pipeline:
//!
//! | Step | Checkpoint |
//! |------|-----------|
//! | job PENDING → RUNNING | 0 % |
//! | page text extracted and stored | 10 % |
//! | sections built and stored | 20 % |
//! | each section's items stored | 20 + ⌊70·k/n⌋ % |
//! | job DONE | 100 % |
//!
//! Any error escaping the orchestrator's per-call containment (unreadable
//! file, store failure) marks the job FAILED with the error text and is
//! returned. Everything committed before the failure stays committed.
//!
//! Documents are independent: [`Importer::spawn`] runs one job as its own
//! task, and [`Importer::run_batch`] drives several with bounded
//! concurrency.

use crate::analyst::{Analyst, DisabledAnalyst, LlmAnalyst};
use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::model::{Document, ImportReport};
use crate::pipeline::job::{JobTracker, PAGES_STORED, SECTIONS_STORED};
use crate::pipeline::orchestrator::ExtractionOrchestrator;
use crate::pipeline::sections::build_sections;
use crate::pipeline::source::{PdfTextSource, PdfiumTextSource};
use crate::store::BudgetStore;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runs import jobs against one store with one set of capabilities.
pub struct Importer {
    source: Arc<dyn PdfTextSource>,
    store: Arc<dyn BudgetStore>,
    analyst: Analyst,
    config: ImportConfig,
}

impl Importer {
    pub fn new(
        source: Arc<dyn PdfTextSource>,
        store: Arc<dyn BudgetStore>,
        analyst: Analyst,
        config: ImportConfig,
    ) -> Self {
        Self {
            source,
            store,
            analyst,
            config,
        }
    }

    /// A pdfium-backed importer whose analyst is resolved from `config`.
    pub fn from_config(store: Arc<dyn BudgetStore>, config: ImportConfig) -> Result<Self, ImportError> {
        let analyst = resolve_analyst(&config)?;
        let source = Arc::new(PdfiumTextSource::new(config.password.clone()));
        Ok(Self::new(source, store, analyst, config))
    }

    /// Replace the page source (e.g. with a pre-extracted text reader).
    pub fn with_source(mut self, source: Arc<dyn PdfTextSource>) -> Self {
        self.source = source;
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Run one job to DONE or FAILED.
    ///
    /// # Errors
    /// Returns `Err` without touching the job when it does not exist or is
    /// not PENDING. Every other error is returned after the job was marked
    /// FAILED.
    pub async fn run(&self, document_id: Uuid, job_id: Uuid) -> Result<ImportReport, ImportError> {
        let job = self
            .store
            .job(job_id)
            .await?
            .ok_or(ImportError::JobNotFound { job_id })?;

        let mut tracker = JobTracker::new(job, Arc::clone(&self.store), self.config.progress_callback.clone());
        tracker.start().await?;

        match self.execute(document_id, &mut tracker).await {
            Ok(report) => {
                info!(
                    "Import complete: document {}, {} sections, {} items, {} failed sections, {}ms",
                    document_id,
                    report.section_count,
                    report.item_count,
                    report.failed_sections.len(),
                    report.duration_ms
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_import_complete(job_id, report.item_count);
                }
                Ok(report)
            }
            Err(e) => {
                let message = e.to_string();
                if !tracker.job().status.is_terminal() {
                    if let Err(persist_err) = tracker.fail(&message).await {
                        error!("Job {}: could not record failure: {}", job_id, persist_err);
                    }
                }
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_import_failed(job_id, message);
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, document_id: Uuid, tracker: &mut JobTracker) -> Result<ImportReport, ImportError> {
        let start = Instant::now();
        let job_id = tracker.job().id;

        if tracker.job().document_id != document_id {
            return Err(ImportError::Internal(format!(
                "job {} belongs to document {}, not {}",
                job_id,
                tracker.job().document_id,
                document_id
            )));
        }

        let document: Document = self
            .store
            .document(document_id)
            .await?
            .ok_or(ImportError::DocumentNotFound { document_id })?;
        info!("Importing {} ({})", document.filename, document.year);

        // ── Step 1: Page text ────────────────────────────────────────────
        let pages = self.source.extract_pages(&document.filepath).await?;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_import_start(job_id, pages.len());
        }
        self.store
            .insert_pages(pages.iter().map(|p| p.to_record(document.id)).collect())
            .await?;
        tracker.advance(PAGES_STORED).await?;

        // ── Step 2: Sections ─────────────────────────────────────────────
        let sections = build_sections(&pages);
        self.store
            .insert_sections(sections.iter().map(|s| s.to_record(document.id)).collect())
            .await?;
        tracker.advance(SECTIONS_STORED).await?;

        // ── Step 3: Items ────────────────────────────────────────────────
        let orchestrator = ExtractionOrchestrator::new(
            self.analyst.clone(),
            Arc::clone(&self.store),
            self.config.explanation_excerpt_chars,
            self.config.progress_callback.clone(),
        );
        let outcome = orchestrator.run(&document, &sections, &pages, tracker).await?;

        Ok(ImportReport {
            document_id: document.id,
            job_id,
            page_count: pages.len(),
            section_count: sections.len(),
            item_count: outcome.item_count,
            failed_sections: outcome.failed_sections,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Dispatch one job as an independent task.
    pub fn spawn(self: &Arc<Self>, document_id: Uuid, job_id: Uuid) -> JoinHandle<Result<ImportReport, ImportError>> {
        let importer = Arc::clone(self);
        tokio::spawn(async move { importer.run(document_id, job_id).await })
    }

    /// Run several `(document_id, job_id)` jobs, at most
    /// `config.concurrency` at a time. Results are in input order.
    pub async fn run_batch(&self, jobs: &[(Uuid, Uuid)]) -> Vec<Result<ImportReport, ImportError>> {
        let mut results: Vec<(usize, Result<ImportReport, ImportError>)> =
            stream::iter(jobs.iter().copied().enumerate().map(|(i, (document_id, job_id))| async move {
                (i, self.run(document_id, job_id).await)
            }))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        results.sort_by_key(|(i, _)| *i);
        results.into_iter().map(|(_, r)| r).collect()
    }
}

// ── Capability resolution ────────────────────────────────────────────────

/// Build the analyst described by `config`.
///
/// `llm_disabled` selects the dry-run analyst and skips provider resolution.
pub fn resolve_analyst(config: &ImportConfig) -> Result<Analyst, ImportError> {
    if config.llm_disabled {
        info!("LLM disabled, using dry-run analyst");
        return Ok(Analyst::uniform(Arc::new(DisabledAnalyst)));
    }
    let provider = resolve_provider(config)?;
    Ok(Analyst::uniform(Arc::new(LlmAnalyst::from_config(provider, config))))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ImportError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ImportError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    [`crate::config::DEFAULT_MODEL`].
/// 3. **Environment pair** `BUDGET_LLM_PROVIDER` + `BUDGET_LLM_MODEL`, when
///    both are set and non-empty.
/// 4. **Auto-detection** through `ProviderFactory::from_env`.
pub fn resolve_provider(config: &ImportConfig) -> Result<Arc<dyn LLMProvider>, ImportError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("BUDGET_LLM_PROVIDER"),
        std::env::var("BUDGET_LLM_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ImportError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set BUDGET_LLM_PROVIDER and BUDGET_LLM_MODEL (e.g. ollama / qwen3:4b-instruct),\n\
                an API key such as OPENAI_API_KEY, or use --dry-run.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

// ── Output ───────────────────────────────────────────────────────────────

/// Serialise `value` as pretty JSON and write it atomically (temp file +
/// rename), creating parent directories as needed.
pub async fn write_json_atomic<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), ImportError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ImportError::Internal(format!("JSON serialisation failed: {e}")))?;

    let write_failed = |source| ImportError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        warn!("Rename to {} failed, removing temp file", path.display());
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }
    Ok(())
}
