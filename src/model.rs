//! Data model: budget sides, units, categories, sections, items and jobs.
//!
//! Internal page indices are 0-based; every page number that leaves the
//! crate (page markers, persisted records, item `page_number`) is 1-based.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ── Side ─────────────────────────────────────────────────────────────────

/// Which side of the budget a line item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Revenue,
    Expense,
}

impl Side {
    /// Parse a model-supplied side token. Accepts the wire tokens and their
    /// Portuguese equivalents, ignoring case and surrounding whitespace.
    pub fn from_token(token: &str) -> Option<Self> {
        let t = token.trim();
        if t.eq_ignore_ascii_case("REVENUE") || t.eq_ignore_ascii_case("RECEITA") {
            Some(Side::Revenue)
        } else if t.eq_ignore_ascii_case("EXPENSE") || t.eq_ignore_ascii_case("DESPESA") {
            Some(Side::Expense)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Revenue => "REVENUE",
            Side::Expense => "EXPENSE",
        }
    }

    /// Portuguese name used in prompts.
    pub fn label_pt(self) -> &'static str {
        match self {
            Side::Revenue => "RECEITA",
            Side::Expense => "DESPESA",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Unit ─────────────────────────────────────────────────────────────────

/// Monetary unit a value was printed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Unit {
    Eur,
    ThousandEur,
    MillionEur,
    #[default]
    Unknown,
}

impl Unit {
    /// Parse a unit token; anything unrecognised is [`Unit::Unknown`].
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "EUR" => Unit::Eur,
            "THOUSAND_EUR" => Unit::ThousandEur,
            "MILLION_EUR" => Unit::MillionEur,
            _ => Unit::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Eur => "EUR",
            Unit::ThousandEur => "THOUSAND_EUR",
            Unit::MillionEur => "MILLION_EUR",
            Unit::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Category ─────────────────────────────────────────────────────────────

/// The fixed budget taxonomy: 5 revenue and 8 expense categories.
///
/// The Portuguese label is the persisted token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Impostos sobre pessoas")]
    PersonalTaxes,
    #[serde(rename = "Impostos sobre empresas")]
    CorporateTaxes,
    #[serde(rename = "Impostos sobre compras")]
    TaxesOnPurchases,
    #[serde(rename = "Contribuições para segurança social")]
    SocialSecurityContributions,
    #[serde(rename = "Outras receitas")]
    OtherRevenue,

    #[serde(rename = "Saúde")]
    Health,
    #[serde(rename = "Educação")]
    Education,
    #[serde(rename = "Pensões e apoio social")]
    PensionsSocialSupport,
    #[serde(rename = "Funcionamento do governo")]
    RunningGovernment,
    #[serde(rename = "Segurança e defesa")]
    SecurityDefense,
    #[serde(rename = "Justiça")]
    Justice,
    #[serde(rename = "Infraestrutura e ambiente")]
    InfrastructureEnvironment,
    #[serde(rename = "Dívida pública")]
    PublicDebt,
}

impl Category {
    pub const REVENUE: [Category; 5] = [
        Category::PersonalTaxes,
        Category::CorporateTaxes,
        Category::TaxesOnPurchases,
        Category::SocialSecurityContributions,
        Category::OtherRevenue,
    ];

    pub const EXPENSE: [Category; 8] = [
        Category::Health,
        Category::Education,
        Category::PensionsSocialSupport,
        Category::RunningGovernment,
        Category::SecurityDefense,
        Category::Justice,
        Category::InfrastructureEnvironment,
        Category::PublicDebt,
    ];

    /// Categories a model may choose from for the given side.
    pub fn allowed(side: Side) -> &'static [Category] {
        match side {
            Side::Revenue => &Self::REVENUE,
            Side::Expense => &Self::EXPENSE,
        }
    }

    /// Category used when the model's answer cannot be matched.
    pub fn default_for(side: Side) -> Category {
        match side {
            Side::Revenue => Category::OtherRevenue,
            Side::Expense => Category::InfrastructureEnvironment,
        }
    }

    pub fn side(self) -> Side {
        if Self::REVENUE.contains(&self) {
            Side::Revenue
        } else {
            Side::Expense
        }
    }

    /// Persisted Portuguese label.
    pub fn label(self) -> &'static str {
        match self {
            Category::PersonalTaxes => "Impostos sobre pessoas",
            Category::CorporateTaxes => "Impostos sobre empresas",
            Category::TaxesOnPurchases => "Impostos sobre compras",
            Category::SocialSecurityContributions => "Contribuições para segurança social",
            Category::OtherRevenue => "Outras receitas",
            Category::Health => "Saúde",
            Category::Education => "Educação",
            Category::PensionsSocialSupport => "Pensões e apoio social",
            Category::RunningGovernment => "Funcionamento do governo",
            Category::SecurityDefense => "Segurança e defesa",
            Category::Justice => "Justiça",
            Category::InfrastructureEnvironment => "Infraestrutura e ambiente",
            Category::PublicDebt => "Dívida pública",
        }
    }

    /// English alias, also accepted when matching model answers.
    pub fn english_label(self) -> &'static str {
        match self {
            Category::PersonalTaxes => "Personal taxes",
            Category::CorporateTaxes => "Corporate taxes",
            Category::TaxesOnPurchases => "Taxes on purchases",
            Category::SocialSecurityContributions => "Social security contributions",
            Category::OtherRevenue => "Other revenue",
            Category::Health => "Health",
            Category::Education => "Education",
            Category::PensionsSocialSupport => "Pensions & social support",
            Category::RunningGovernment => "Running the government",
            Category::SecurityDefense => "Security & defense",
            Category::Justice => "Justice",
            Category::InfrastructureEnvironment => "Infrastructure & environment",
            Category::PublicDebt => "Public debt",
        }
    }

    /// Match a model answer against the side's vocabulary: exact first,
    /// then case-insensitive. Returns `None` when nothing matches.
    pub fn matching(side: Side, answer: &str) -> Option<Category> {
        let answer = answer.trim();
        let allowed = Self::allowed(side);

        allowed
            .iter()
            .copied()
            .find(|c| c.label() == answer || c.english_label() == answer)
            .or_else(|| {
                let lower = answer.to_lowercase();
                allowed.iter().copied().find(|c| {
                    c.label().to_lowercase() == lower || c.english_label().to_lowercase() == lower
                })
            })
    }

    /// Match a model answer, falling back to [`Category::default_for`].
    pub fn resolve(side: Side, answer: &str) -> Category {
        Self::matching(side, answer).unwrap_or_else(|| Self::default_for(side))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Pages ────────────────────────────────────────────────────────────────

/// Plain text of one page, as produced by a page source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based.
    pub ordinal: usize,
    pub content: String,
}

impl PageText {
    pub fn new(ordinal: usize, content: impl Into<String>) -> Self {
        Self {
            ordinal,
            content: content.into(),
        }
    }

    /// Number the pages 1..=N in order.
    pub fn numbered<I, S>(texts: I) -> Vec<PageText>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, t)| PageText::new(i + 1, t))
            .collect()
    }

    pub fn to_record(&self, document_id: Uuid) -> PageRecord {
        PageRecord {
            document_id,
            page_number: self.ordinal,
            text: self.content.clone(),
        }
    }
}

impl AsRef<str> for PageText {
    fn as_ref(&self) -> &str {
        &self.content
    }
}

// ── Sections ─────────────────────────────────────────────────────────────

/// A contiguous, inclusive page range under one breadcrumb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading labels from outermost to innermost.
    pub title_path: Vec<String>,
    /// First page, 0-based.
    pub page_start: usize,
    /// Last page, 0-based, inclusive.
    pub page_end: usize,
}

impl Section {
    pub fn new(title_path: Vec<String>, page_start: usize, page_end: usize) -> Self {
        Self {
            title_path,
            page_start,
            page_end,
        }
    }

    /// Breadcrumb rendered as `"L1 > L2 > L3"`.
    pub fn title(&self) -> String {
        self.title_path.join(" > ")
    }

    pub fn page_count(&self) -> usize {
        self.page_end - self.page_start + 1
    }

    /// Persisted shape, with 1-based page numbers.
    pub fn to_record(&self, document_id: Uuid) -> SectionRecord {
        SectionRecord {
            document_id,
            title_path: self.title(),
            page_start: self.page_start + 1,
            page_end: self.page_end + 1,
        }
    }
}

/// Section as stored: breadcrumb string and 1-based inclusive page range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub document_id: Uuid,
    pub title_path: String,
    pub page_start: usize,
    pub page_end: usize,
}

/// Raw page text as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub document_id: Uuid,
    /// 1-based.
    pub page_number: usize,
    pub text: String,
}

// ── Items ────────────────────────────────────────────────────────────────

/// One line item as returned by an [`crate::analyst::Extractor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedItem {
    pub side: Side,
    /// Verbatim description from the document.
    #[serde(rename = "descriptionOriginal")]
    pub description: String,
    /// Printed amount; `None` when the model could not read one.
    pub value: Option<f64>,
    pub unit: Unit,
    /// 1-based page the evidence was found on.
    pub page_number: usize,
    /// Verbatim excerpt backing the item.
    pub evidence_text: String,
}

/// A categorised, explained and normalised line item, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetItem {
    pub id: Uuid,
    pub document_id: Uuid,
    pub year: i32,
    pub side: Side,
    pub category: Category,
    pub description: String,
    /// Amount as printed, in `unit`.
    pub value: Option<f64>,
    pub unit: Unit,
    /// Amount in EUR; `None` whenever `value` is `None`.
    pub normalized_value: Option<f64>,
    pub page_number: usize,
    pub evidence_text: String,
    pub explanation: String,
}

// ── Documents and jobs ───────────────────────────────────────────────────

/// An uploaded budget document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub year: i32,
    pub filename: String,
    pub filepath: PathBuf,
    pub uploaded_at: DateTime<Utc>,
    pub archived: bool,
}

impl Document {
    /// A new, non-archived document whose filename is taken from `filepath`.
    pub fn new(year: i32, filepath: impl AsRef<Path>) -> Self {
        let filepath = filepath.as_ref().to_path_buf();
        let filename = filepath
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filepath.display().to_string());
        Self {
            id: Uuid::new_v4(),
            year,
            filename,
            filepath,
            uploaded_at: Utc::now(),
            archived: false,
        }
    }
}

/// Lifecycle state of an [`ImportJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    /// DONE and FAILED are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        })
    }
}

/// Background processing job for one document.
///
/// Status and progress change only through the methods in
/// [`crate::pipeline::job`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub document_id: Uuid,
    pub status: JobStatus,
    /// 0–100.
    pub progress: u8,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ImportJob {
    /// A fresh PENDING job at 0 %.
    pub fn pending(document_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            status: JobStatus::Pending,
            progress: 0,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}

// ── Report ───────────────────────────────────────────────────────────────

/// A section whose extraction call failed and contributed no items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionFailure {
    /// 0-based position in the section list.
    pub index: usize,
    pub title_path: String,
    pub error: crate::error::AnalystError,
}

/// Summary of a job that reached DONE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub document_id: Uuid,
    pub job_id: Uuid,
    pub page_count: usize,
    pub section_count: usize,
    pub item_count: usize,
    pub failed_sections: Vec<SectionFailure>,
    pub duration_ms: u64,
}
