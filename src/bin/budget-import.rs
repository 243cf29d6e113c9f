//! CLI binary for budget-import.
//!
//! A thin shim over the library crate: registers each input file as a
//! document with a PENDING job in an in-memory store, runs the jobs, and
//! prints or writes what was stored.

use anyhow::{Context, Result};
use budget_import::{
    write_json_atomic, Document, DocumentSnapshot, FormFeedTextSource, ImportConfig, ImportJob,
    ImportProgressCallback, ImportReport, Importer, JobStatus, MemoryStore, ProgressCallback,
};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One progress bar per job, driven by the job's own 0–100 progress.
struct CliProgressCallback {
    bars: HashMap<Uuid, ProgressBar>,
}

impl CliProgressCallback {
    fn new(multi: &MultiProgress, jobs: &[(Uuid, String)]) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold:<28}  [{bar:36.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bars = jobs
            .iter()
            .map(|(job_id, filename)| {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                bar.set_prefix(truncate(filename, 28));
                bar.set_message("waiting…");
                bar.enable_steady_tick(Duration::from_millis(80));
                (*job_id, bar)
            })
            .collect();

        Arc::new(Self { bars })
    }

    fn bar(&self, job_id: Uuid) -> Option<&ProgressBar> {
        self.bars.get(&job_id)
    }
}

impl ImportProgressCallback for CliProgressCallback {
    fn on_import_start(&self, job_id: Uuid, total_pages: usize) {
        if let Some(bar) = self.bar(job_id) {
            bar.set_message(format!("{total_pages} pages"));
        }
    }

    fn on_progress(&self, job_id: Uuid, progress: u8) {
        if let Some(bar) = self.bar(job_id) {
            bar.set_position(progress as u64);
        }
    }

    fn on_section_start(&self, job_id: Uuid, index: usize, total: usize, title_path: String) {
        if let Some(bar) = self.bar(job_id) {
            bar.set_message(format!("{}/{} {}", index + 1, total, truncate(&title_path, 40)));
        }
    }

    fn on_section_error(&self, job_id: Uuid, index: usize, total: usize, error: String) {
        if let Some(bar) = self.bar(job_id) {
            bar.println(format!(
                "  {} section {}/{}  {}",
                red("✗"),
                index + 1,
                total,
                red(&truncate(&error, 80)),
            ));
        }
    }

    fn on_import_complete(&self, job_id: Uuid, item_count: usize) {
        if let Some(bar) = self.bar(job_id) {
            bar.finish_with_message(format!("{} {} items", green("✔"), item_count));
        }
    }

    fn on_import_failed(&self, job_id: Uuid, error: String) {
        if let Some(bar) = self.bar(job_id) {
            bar.abandon_with_message(format!("{} {}", red("✘"), truncate(&error, 60)));
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Import one budget PDF (provider from the environment)
  budget-import --year 2024 orcamento-2024.pdf

  # Several documents, two at a time, results to a file
  budget-import --year 2024 --concurrency 2 mapa-receitas.pdf mapa-despesas.pdf -o budget.json

  # Local model through Ollama
  budget-import --year 2024 --provider ollama --model qwen3:4b-instruct orcamento.pdf

  # Pre-extracted text (pdftotext output, pages separated by form feeds)
  pdftotext -layout orcamento.pdf orcamento.txt
  budget-import --year 2024 --text orcamento.txt --json

  # Check the section split without calling a model
  budget-import --year 2024 --dry-run orcamento.pdf --json

ENVIRONMENT VARIABLES:
  BUDGET_LLM_PROVIDER     Provider (openai, ollama, anthropic, gemini, …)
  BUDGET_LLM_MODEL        Model ID (default with a named provider: qwen3:4b-instruct)
  OPENAI_API_KEY          OpenAI API key (auto-detection)
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Extract categorised budget line items from budget documents.
#[derive(Parser, Debug)]
#[command(
    name = "budget-import",
    version,
    about = "Extract categorised, evidence-linked line items from budget documents",
    long_about = "Split budget documents into sections, extract their line items with an LLM, \
categorise each item into a fixed revenue/expense taxonomy, explain it in plain words and \
normalise its value to EUR.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Budget documents (PDF, or form-feed text with --text).
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Budget year the documents refer to.
    #[arg(long, env = "BUDGET_IMPORT_YEAR")]
    year: i32,

    /// Inputs are pre-extracted text with pages separated by form feeds.
    #[arg(long, env = "BUDGET_IMPORT_TEXT")]
    text: bool,

    /// Do not call a model: no items, default categories, templated explanations.
    #[arg(long, env = "BUDGET_IMPORT_DRY_RUN")]
    dry_run: bool,

    /// LLM provider: openai, ollama, anthropic, gemini, …
    #[arg(long, env = "BUDGET_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "BUDGET_LLM_MODEL")]
    model: Option<String>,

    /// Attempts per model call, including the first.
    #[arg(long, env = "BUDGET_IMPORT_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Documents processed at the same time.
    #[arg(short, long, env = "BUDGET_IMPORT_CONCURRENCY", default_value_t = 2)]
    concurrency: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "BUDGET_IMPORT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "BUDGET_IMPORT_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "BUDGET_IMPORT_PASSWORD")]
    password: Option<String>,

    /// Write the stored records as JSON to this file.
    #[arg(short, long, env = "BUDGET_IMPORT_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the stored records as JSON on stdout.
    #[arg(long, env = "BUDGET_IMPORT_JSON")]
    json: bool,

    /// Disable progress bars.
    #[arg(long, env = "BUDGET_IMPORT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BUDGET_IMPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "BUDGET_IMPORT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bars carry the feedback; keep library logs quiet under them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Register documents and jobs ──────────────────────────────────────
    let store = Arc::new(MemoryStore::new());
    let mut jobs = Vec::with_capacity(cli.files.len());
    let mut labels = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let document = Document::new(cli.year, path);
        let job = ImportJob::pending(document.id);
        labels.push((job.id, document.filename.clone()));
        jobs.push((document.id, job.id));
        store
            .insert_document(document)
            .context("Failed to register document")?;
        store.insert_job(job).context("Failed to register job")?;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let multi = MultiProgress::new();
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new(&multi, &labels);
        Some(cb as Arc<dyn ImportProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let mut importer =
        Importer::from_config(store.clone(), config).context("Failed to set up the importer")?;
    if cli.text {
        importer = importer.with_source(Arc::new(FormFeedTextSource));
    }

    // ── Run ──────────────────────────────────────────────────────────────
    if !cli.quiet && show_progress {
        multi
            .println(format!(
                "{} {}",
                cyan("◆"),
                bold(&format!("Importing {} document(s) for {}…", jobs.len(), cli.year))
            ))
            .ok();
    }
    let results = importer.run_batch(&jobs).await;

    let snapshots = jobs
        .iter()
        .map(|(document_id, _)| store.snapshot(*document_id))
        .collect::<Result<Vec<DocumentSnapshot>, _>>()
        .context("Failed to read stored records")?;

    // ── Output ───────────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        write_json_atomic(output_path, &snapshots)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!("{} wrote {}", green("✔"), bold(&output_path.display().to_string()));
        }
    }
    if cli.json {
        let json = serde_json::to_string_pretty(&snapshots).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&snapshots, &results);
    }

    let failed = snapshots
        .iter()
        .flat_map(|s| s.jobs.iter())
        .filter(|j| j.status == JobStatus::Failed)
        .count();
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Map CLI args to `ImportConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ImportConfig> {
    let mut builder = ImportConfig::builder()
        .llm_disabled(cli.dry_run)
        .max_attempts(cli.max_attempts)
        .concurrency(cli.concurrency)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Human-readable per-document summary on stderr.
fn print_summary(
    snapshots: &[DocumentSnapshot],
    results: &[Result<ImportReport, budget_import::ImportError>],
) {
    for (snapshot, result) in snapshots.iter().zip(results) {
        let name = snapshot
            .document
            .as_ref()
            .map(|d| d.filename.as_str())
            .unwrap_or("?");
        match result {
            Ok(report) => {
                eprintln!(
                    "{} {}  {} pages  {} sections  {} items  {}",
                    if report.failed_sections.is_empty() {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    bold(name),
                    report.page_count,
                    report.section_count,
                    report.item_count,
                    dim(&format!("{}ms", report.duration_ms)),
                );
                for failure in &report.failed_sections {
                    eprintln!(
                        "   {} section {} ({}): {}",
                        red("✗"),
                        failure.index + 1,
                        failure.title_path,
                        failure.error
                    );
                }
                for item in &snapshot.items {
                    let value = item
                        .normalized_value
                        .map(|v| format!("{v:.2} EUR"))
                        .unwrap_or_else(|| "n/a".to_string());
                    eprintln!(
                        "   {:<8} {:<36} {:>20}  {}",
                        item.side.as_str(),
                        truncate(item.category.label(), 36),
                        value,
                        dim(&truncate(&item.description, 60)),
                    );
                }
            }
            Err(e) => {
                eprintln!("{} {}  {}", red("✘"), bold(name), red(&e.to_string()));
            }
        }
    }
}
