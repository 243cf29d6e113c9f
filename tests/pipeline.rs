//! Integration tests for the import pipeline.
//!
//! Every test drives the public API end to end with in-process fakes for the
//! analyst capabilities and, where needed, a failure-injecting store. Page
//! text comes from form-feed separated temp files, so no test needs pdfium
//! or a network connection.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use budget_import::analyst::parse::first_page_marker;
use budget_import::{
    Analyst, AnalystError, BudgetItem, BudgetStore, Categorizer, Category, Document, Explainer,
    ExtractedItem, Extractor, FormFeedTextSource, ImportConfig, ImportError, ImportJob,
    ImportProgressCallback, ImportReport, Importer, JobStatus, MemoryStore, PageRecord,
    SectionRecord, Side, StoreError, Unit,
};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use uuid::Uuid;

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// Three pages, one level-1 heading each → three single-page sections.
const THREE_SECTIONS: &str = "RECEITAS\nIRS 1 200\n\x0c\
                              DESPESAS\nSaúde 800\n\x0c\
                              DÍVIDA PÚBLICA\nJuros 300\n\x0c";

fn text_file(content: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("create temp file");
    f.write_all(content.as_bytes()).expect("write temp file");
    f
}

/// Register a document for `file` with a PENDING job.
fn register(store: &MemoryStore, file: &NamedTempFile) -> (Document, ImportJob) {
    let document = Document::new(2024, file.path());
    let job = ImportJob::pending(document.id);
    store.insert_document(document.clone()).unwrap();
    store.insert_job(job.clone()).unwrap();
    (document, job)
}

fn importer(store: Arc<dyn BudgetStore>, analyst: Analyst, config: ImportConfig) -> Importer {
    Importer::new(Arc::new(FormFeedTextSource), store, analyst, config)
}

fn fast_config() -> ImportConfig {
    ImportConfig::builder().retry_backoff_ms(1).build().unwrap()
}

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Extracts one item per section; the section's breadcrumb decides the side.
/// Fails for any breadcrumb listed in `failing`.
struct FakeExtractor {
    failing: Vec<&'static str>,
    calls: Mutex<Vec<String>>,
}

impl FakeExtractor {
    fn new(failing: &[&'static str]) -> Self {
        Self {
            failing: failing.to_vec(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract_items(
        &self,
        title_path: &str,
        marked_text: &str,
    ) -> Result<Vec<ExtractedItem>, AnalystError> {
        self.calls.lock().unwrap().push(title_path.to_string());
        if self.failing.contains(&title_path) {
            return Err(AnalystError::Exhausted {
                operation: "extract".into(),
                attempts: 3,
                detail: "HTTP 503".into(),
            });
        }
        let side = if title_path.starts_with("RECEITAS") {
            Side::Revenue
        } else {
            Side::Expense
        };
        let page = first_page_marker(marked_text).unwrap_or(1);
        let evidence = marked_text.lines().nth(2).unwrap_or_default().to_string();
        Ok(vec![ExtractedItem {
            side,
            description: format!("Item de {title_path}"),
            value: Some(1.5),
            unit: Unit::ThousandEur,
            page_number: page,
            evidence_text: evidence,
        }])
    }
}

/// Answers every categorisation with the same text.
struct FixedCategorizer(&'static str);

#[async_trait]
impl Categorizer for FixedCategorizer {
    async fn categorize(&self, _side: Side, _title: &str, _desc: &str) -> Result<String, AnalystError> {
        Ok(self.0.to_string())
    }
}

/// Always fails, like a provider that is down.
struct DownExplainer;

#[async_trait]
impl Explainer for DownExplainer {
    async fn explain(&self, _title: &str, _evidence: &str) -> Result<String, AnalystError> {
        Err(AnalystError::Unavailable {
            operation: "explain".into(),
            detail: "connection refused".into(),
        })
    }
}

struct EchoExplainer;

#[async_trait]
impl Explainer for EchoExplainer {
    async fn explain(&self, title: &str, _evidence: &str) -> Result<String, AnalystError> {
        Ok(format!("Explicação para {title}."))
    }
}

fn analyst(extractor: Arc<FakeExtractor>, categorizer: &'static str) -> Analyst {
    Analyst::new(
        extractor,
        Arc::new(FixedCategorizer(categorizer)),
        Arc::new(EchoExplainer),
    )
}

/// Delegates to a [`MemoryStore`] but refuses the `fail_on`-th item batch
/// (1-based) and every batch after it.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_on: usize,
    batches: AtomicUsize,
}

#[async_trait]
impl BudgetStore for FlakyStore {
    async fn document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        self.inner.document(id).await
    }

    async fn job(&self, id: Uuid) -> Result<Option<ImportJob>, StoreError> {
        self.inner.job(id).await
    }

    async fn save_job(&self, job: &ImportJob) -> Result<(), StoreError> {
        self.inner.save_job(job).await
    }

    async fn insert_pages(&self, pages: Vec<PageRecord>) -> Result<(), StoreError> {
        self.inner.insert_pages(pages).await
    }

    async fn insert_sections(&self, sections: Vec<SectionRecord>) -> Result<(), StoreError> {
        self.inner.insert_sections(sections).await
    }

    async fn insert_items(&self, items: Vec<BudgetItem>) -> Result<(), StoreError> {
        let n = self.batches.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.fail_on {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.insert_items(items).await
    }
}

#[derive(Default)]
struct ProgressRecorder {
    progress: Mutex<Vec<u8>>,
    section_errors: AtomicUsize,
    failures: Mutex<Vec<String>>,
}

impl ImportProgressCallback for ProgressRecorder {
    fn on_progress(&self, _job_id: Uuid, progress: u8) {
        self.progress.lock().unwrap().push(progress);
    }

    fn on_section_error(&self, _job_id: Uuid, _index: usize, _total: usize, _error: String) {
        self.section_errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_import_failed(&self, _job_id: Uuid, error: String) {
        self.failures.lock().unwrap().push(error);
    }
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_stores_pages_sections_and_items() {
    let file = text_file(THREE_SECTIONS);
    let store = Arc::new(MemoryStore::new());
    let (document, job) = register(&store, &file);
    let extractor = Arc::new(FakeExtractor::new(&[]));

    let report = importer(store.clone(), analyst(extractor.clone(), "Dívida pública"), fast_config())
        .run(document.id, job.id)
        .await
        .expect("import should succeed");

    assert_eq!(report.page_count, 3);
    assert_eq!(report.section_count, 3);
    assert_eq!(report.item_count, 3);
    assert!(report.failed_sections.is_empty());

    let snap = store.snapshot(document.id).unwrap();
    assert_eq!(snap.jobs[0].status, JobStatus::Done);
    assert_eq!(snap.jobs[0].progress, 100);

    let pages: Vec<usize> = snap.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(pages, vec![1, 2, 3]);

    let sections: Vec<(&str, usize, usize)> = snap
        .sections
        .iter()
        .map(|s| (s.title_path.as_str(), s.page_start, s.page_end))
        .collect();
    assert_eq!(
        sections,
        vec![("RECEITAS", 1, 1), ("DESPESAS", 2, 2), ("DÍVIDA PÚBLICA", 3, 3)]
    );

    // Sections are processed in order and items keep that order.
    assert_eq!(
        *extractor.calls.lock().unwrap(),
        vec!["RECEITAS", "DESPESAS", "DÍVIDA PÚBLICA"]
    );
    let pages_of_items: Vec<usize> = snap.items.iter().map(|i| i.page_number).collect();
    assert_eq!(pages_of_items, vec![1, 2, 3]);

    let item = &snap.items[1];
    assert_eq!(item.year, 2024);
    assert_eq!(item.value, Some(1.5));
    assert_eq!(item.normalized_value, Some(1_500.0));
    assert_eq!(item.evidence_text, "Saúde 800");
    assert_eq!(item.explanation, "Explicação para DESPESAS.");
}

#[tokio::test]
async fn progress_checkpoints_for_three_sections() {
    let file = text_file(THREE_SECTIONS);
    let store = Arc::new(MemoryStore::new());
    let (document, job) = register(&store, &file);
    let recorder = Arc::new(ProgressRecorder::default());

    let config = ImportConfig::builder()
        .retry_backoff_ms(1)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    importer(store.clone(), analyst(Arc::new(FakeExtractor::new(&[])), "Saúde"), config)
        .run(document.id, job.id)
        .await
        .unwrap();

    assert_eq!(
        *recorder.progress.lock().unwrap(),
        vec![0, 10, 20, 43, 66, 90, 100]
    );
}

// ── Containment ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_failing_section_does_not_fail_the_job() {
    let file = text_file(THREE_SECTIONS);
    let store = Arc::new(MemoryStore::new());
    let (document, job) = register(&store, &file);
    let recorder = Arc::new(ProgressRecorder::default());
    let config = ImportConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let report = importer(
        store.clone(),
        analyst(Arc::new(FakeExtractor::new(&["DESPESAS"])), "Saúde"),
        config,
    )
    .run(document.id, job.id)
    .await
    .expect("section failure is contained");

    assert_eq!(report.item_count, 2);
    assert_eq!(report.failed_sections.len(), 1);
    assert_eq!(report.failed_sections[0].index, 1);
    assert_eq!(report.failed_sections[0].title_path, "DESPESAS");
    assert_eq!(recorder.section_errors.load(Ordering::SeqCst), 1);

    let snap = store.snapshot(document.id).unwrap();
    assert_eq!(snap.jobs[0].status, JobStatus::Done);
    assert!(snap.items.iter().all(|i| i.page_number != 2));
    assert_eq!(snap.items.len(), 2);
}

#[tokio::test]
async fn unmatched_category_falls_back_per_side() {
    let file = text_file(THREE_SECTIONS);
    let store = Arc::new(MemoryStore::new());
    let (document, job) = register(&store, &file);

    importer(
        store.clone(),
        analyst(Arc::new(FakeExtractor::new(&[])), "Categoria inventada"),
        fast_config(),
    )
    .run(document.id, job.id)
    .await
    .unwrap();

    let snap = store.snapshot(document.id).unwrap();
    let categories: Vec<(Side, Category)> = snap.items.iter().map(|i| (i.side, i.category)).collect();
    assert_eq!(
        categories,
        vec![
            (Side::Revenue, Category::OtherRevenue),
            (Side::Expense, Category::InfrastructureEnvironment),
            (Side::Expense, Category::InfrastructureEnvironment),
        ]
    );
}

#[tokio::test]
async fn failing_explainer_yields_templated_text() {
    let file = text_file(THREE_SECTIONS);
    let store = Arc::new(MemoryStore::new());
    let (document, job) = register(&store, &file);

    let analyst = Analyst::new(
        Arc::new(FakeExtractor::new(&[])),
        Arc::new(FixedCategorizer("Impostos sobre pessoas")),
        Arc::new(DownExplainer),
    );
    importer(store.clone(), analyst, fast_config())
        .run(document.id, job.id)
        .await
        .unwrap();

    let snap = store.snapshot(document.id).unwrap();
    assert_eq!(snap.items[0].category, Category::PersonalTaxes);
    assert_eq!(
        snap.items[0].explanation,
        "This item appears in section RECEITAS. Evidence: IRS 1 200..."
    );
}

// ── Job-level failures ───────────────────────────────────────────────────────

#[tokio::test]
async fn missing_source_file_fails_the_job() {
    let store = Arc::new(MemoryStore::new());
    let document = Document::new(2024, "/nonexistent/orcamento-2024.txt");
    let job = ImportJob::pending(document.id);
    store.insert_document(document.clone()).unwrap();
    store.insert_job(job.clone()).unwrap();
    let recorder = Arc::new(ProgressRecorder::default());
    let config = ImportConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let err = importer(store.clone(), analyst(Arc::new(FakeExtractor::new(&[])), "Saúde"), config)
        .run(document.id, job.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::FileNotFound { .. }));

    let stored = store.job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.progress, 0);
    assert_eq!(stored.error_message.as_deref(), Some(err.to_string().as_str()));
    assert_eq!(recorder.failures.lock().unwrap().len(), 1);
    assert!(store.snapshot(document.id).unwrap().pages.is_empty());
}

#[tokio::test]
async fn missing_document_fails_the_job() {
    let store = Arc::new(MemoryStore::new());
    let job = ImportJob::pending(Uuid::new_v4());
    store.insert_job(job.clone()).unwrap();

    let err = importer(store.clone(), analyst(Arc::new(FakeExtractor::new(&[])), "Saúde"), fast_config())
        .run(job.document_id, job.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::DocumentNotFound { .. }));

    let stored = store.job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("Document not found"));
}

#[tokio::test]
async fn store_failure_mid_job_keeps_committed_data() {
    let file = text_file(THREE_SECTIONS);
    let memory = Arc::new(MemoryStore::new());
    let (document, job) = register(&memory, &file);
    let flaky = Arc::new(FlakyStore {
        inner: memory.clone(),
        fail_on: 2,
        batches: AtomicUsize::new(0),
    });
    let extractor = Arc::new(FakeExtractor::new(&[]));

    let err = importer(flaky, analyst(extractor.clone(), "Saúde"), fast_config())
        .run(document.id, job.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::Store(StoreError::Unavailable(_))));

    let snap = memory.snapshot(document.id).unwrap();
    assert_eq!(snap.jobs[0].status, JobStatus::Failed);
    assert_eq!(snap.jobs[0].progress, 43);
    assert!(snap.jobs[0]
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("connection reset"));
    // Earlier checkpoints stay; processing stopped at the failing section.
    assert_eq!(snap.pages.len(), 3);
    assert_eq!(snap.sections.len(), 3);
    assert_eq!(snap.items.len(), 1);
    assert_eq!(extractor.calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn only_pending_jobs_can_start() {
    let file = text_file(THREE_SECTIONS);
    let store = Arc::new(MemoryStore::new());
    let (document, job) = register(&store, &file);
    let importer = importer(
        store.clone(),
        analyst(Arc::new(FakeExtractor::new(&[])), "Saúde"),
        fast_config(),
    );

    importer.run(document.id, job.id).await.unwrap();
    let done = store.job(job.id).await.unwrap().unwrap();

    let err = importer.run(document.id, job.id).await.unwrap_err();
    assert!(matches!(err, ImportError::JobState(_)));
    assert_eq!(store.job(job.id).await.unwrap().unwrap(), done);
}

#[tokio::test]
async fn unknown_job_is_reported() {
    let store = Arc::new(MemoryStore::new());
    let job_id = Uuid::new_v4();
    let err = importer(store, analyst(Arc::new(FakeExtractor::new(&[])), "Saúde"), fast_config())
        .run(Uuid::new_v4(), job_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::JobNotFound { job_id: id } if id == job_id));
}

// ── Segmentation through the importer ────────────────────────────────────────

#[tokio::test]
async fn headingless_document_is_one_section() {
    let file = text_file("apenas texto corrido.\x0cmais texto corrido.\x0c");
    let store = Arc::new(MemoryStore::new());
    let (document, job) = register(&store, &file);
    let extractor = Arc::new(FakeExtractor::new(&[]));

    let report = importer(store.clone(), analyst(extractor.clone(), "Saúde"), fast_config())
        .run(document.id, job.id)
        .await
        .unwrap();

    assert_eq!(report.section_count, 1);
    let snap = store.snapshot(document.id).unwrap();
    assert_eq!(snap.sections[0].title_path, "Document");
    assert_eq!((snap.sections[0].page_start, snap.sections[0].page_end), (1, 2));
    assert_eq!(*extractor.calls.lock().unwrap(), vec!["Document"]);
}

#[tokio::test]
async fn empty_document_completes_without_sections() {
    let file = text_file("");
    let store = Arc::new(MemoryStore::new());
    let (document, job) = register(&store, &file);

    let report = importer(store.clone(), analyst(Arc::new(FakeExtractor::new(&[])), "Saúde"), fast_config())
        .run(document.id, job.id)
        .await
        .unwrap();

    assert_eq!((report.page_count, report.section_count, report.item_count), (0, 0, 0));
    let stored = store.job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Done);
    assert_eq!(stored.progress, 100);
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_runs_documents_independently() {
    let good = text_file(THREE_SECTIONS);
    let store = Arc::new(MemoryStore::new());
    let (doc_a, job_a) = register(&store, &good);

    let missing = Document::new(2024, "/nonexistent/b.txt");
    let job_b = ImportJob::pending(missing.id);
    store.insert_document(missing.clone()).unwrap();
    store.insert_job(job_b.clone()).unwrap();

    let importer = importer(
        store.clone(),
        analyst(Arc::new(FakeExtractor::new(&[])), "Saúde"),
        ImportConfig::builder().concurrency(2).build().unwrap(),
    );
    let results: Vec<Result<ImportReport, ImportError>> = importer
        .run_batch(&[(doc_a.id, job_a.id), (missing.id, job_b.id)])
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().document_id, doc_a.id);
    assert!(results[1].is_err());
    assert_eq!(store.job(job_a.id).await.unwrap().unwrap().status, JobStatus::Done);
    assert_eq!(store.job(job_b.id).await.unwrap().unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn spawned_job_runs_to_completion() {
    let file = text_file(THREE_SECTIONS);
    let store = Arc::new(MemoryStore::new());
    let (document, job) = register(&store, &file);
    let importer = Arc::new(importer(
        store.clone(),
        analyst(Arc::new(FakeExtractor::new(&[])), "Saúde"),
        fast_config(),
    ));

    let report = importer
        .spawn(document.id, job.id)
        .await
        .expect("task must not panic")
        .expect("import should succeed");
    assert_eq!(report.item_count, 3);
}

#[tokio::test]
async fn dry_run_analyst_stores_sections_but_no_items() {
    let file = text_file(THREE_SECTIONS);
    let store = Arc::new(MemoryStore::new());
    let (document, job) = register(&store, &file);

    let config = ImportConfig::builder().llm_disabled(true).build().unwrap();
    let report = Importer::from_config(store.clone(), config)
        .unwrap()
        .with_source(Arc::new(FormFeedTextSource))
        .run(document.id, job.id)
        .await
        .unwrap();

    assert_eq!(report.section_count, 3);
    assert_eq!(report.item_count, 0);
    assert_eq!(store.job(job.id).await.unwrap().unwrap().status, JobStatus::Done);
}
