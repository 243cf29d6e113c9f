//! Per-section extraction: the core of an import job.
//!
//! For each section, in order:
//!
//! 1. join the covered pages into one text, each page prefixed by
//!    `--- PAGE n ---` (1-based) and separated by a blank line;
//! 2. ask the [`Extractor`](crate::analyst::Extractor) for items; a failure
//!    becomes an empty list and a [`SectionFailure`];
//! 3. for each item: categorise (falling back to the side default), explain
//!    (falling back to a template quoting the evidence), normalise the value;
//! 4. commit the section's items in one write and advance job progress.
//!
//! Analyst failures never escape this module. Store failures do, and end
//! the job in [`crate::import::Importer`].

use crate::analyst::Analyst;
use crate::error::ImportError;
use crate::model::{BudgetItem, Category, Document, ExtractedItem, PageText, Section, SectionFailure};
use crate::pipeline::job::{section_progress, JobTracker};
use crate::pipeline::normalize::normalize;
use crate::progress::ProgressCallback;
use crate::prompts::fallback_explanation;
use crate::store::BudgetStore;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of processing every section of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchestratorOutcome {
    pub item_count: usize,
    pub failed_sections: Vec<SectionFailure>,
}

/// Join a section's pages into the text sent to the extractor.
pub fn marked_section_text(section: &Section, pages: &[PageText]) -> String {
    let end = section.page_end.min(pages.len().saturating_sub(1));
    pages
        .get(section.page_start..=end)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(offset, page)| {
            let number = section.page_start + offset + 1;
            format!("--- PAGE {} ---\n{}", number, page.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct ExtractionOrchestrator {
    analyst: Analyst,
    store: Arc<dyn BudgetStore>,
    excerpt_chars: usize,
    callback: Option<ProgressCallback>,
}

impl ExtractionOrchestrator {
    pub fn new(
        analyst: Analyst,
        store: Arc<dyn BudgetStore>,
        excerpt_chars: usize,
        callback: Option<ProgressCallback>,
    ) -> Self {
        Self {
            analyst,
            store,
            excerpt_chars,
            callback,
        }
    }

    /// Process `sections` sequentially, then mark the job DONE.
    ///
    /// `tracker` must be RUNNING at the 20 % checkpoint.
    pub async fn run(
        &self,
        document: &Document,
        sections: &[Section],
        pages: &[PageText],
        tracker: &mut JobTracker,
    ) -> Result<OrchestratorOutcome, ImportError> {
        let job_id = tracker.job().id;
        let total = sections.len();
        let mut outcome = OrchestratorOutcome::default();

        for (index, section) in sections.iter().enumerate() {
            let title_path = section.title();
            info!(
                "Section {}/{}: {} (pages {}-{})",
                index + 1,
                total,
                title_path,
                section.page_start + 1,
                section.page_end + 1
            );
            if let Some(ref cb) = self.callback {
                cb.on_section_start(job_id, index, total, title_path.clone());
            }

            let text = marked_section_text(section, pages);
            let extracted = match self.analyst.extractor.extract_items(&title_path, &text).await {
                Ok(items) => items,
                Err(e) => {
                    warn!("Section {} ({}): extraction failed: {}", index + 1, title_path, e);
                    if let Some(ref cb) = self.callback {
                        cb.on_section_error(job_id, index, total, e.to_string());
                    }
                    outcome.failed_sections.push(SectionFailure {
                        index,
                        title_path: title_path.clone(),
                        error: e,
                    });
                    Vec::new()
                }
            };

            let mut items = Vec::with_capacity(extracted.len());
            for item in extracted {
                items.push(self.build_item(document, &title_path, item).await);
            }

            let count = items.len();
            if !items.is_empty() {
                self.store.insert_items(items).await?;
            }
            outcome.item_count += count;

            if let Some(ref cb) = self.callback {
                cb.on_section_complete(job_id, index, total, count);
            }
            tracker.advance(section_progress(index + 1, total)).await?;
        }

        tracker.complete().await?;
        Ok(outcome)
    }

    /// Categorise, explain and normalise one extracted item.
    async fn build_item(&self, document: &Document, title_path: &str, item: ExtractedItem) -> BudgetItem {
        let category = match self
            .analyst
            .categorizer
            .categorize(item.side, title_path, &item.description)
            .await
        {
            Ok(answer) => Category::matching(item.side, &answer).unwrap_or_else(|| {
                warn!("Could not match category {:?}, using default", answer);
                Category::default_for(item.side)
            }),
            Err(e) => {
                warn!("Categorisation failed for {:?}: {}", item.description, e);
                Category::default_for(item.side)
            }
        };

        let explanation = match self
            .analyst
            .explainer
            .explain(title_path, &item.evidence_text)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Explanation failed for {:?}: {}", item.description, e);
                fallback_explanation(title_path, &item.evidence_text, self.excerpt_chars)
            }
        };

        debug!("Item {:?} → {}", item.description, category);

        BudgetItem {
            id: Uuid::new_v4(),
            document_id: document.id,
            year: document.year,
            side: item.side,
            category,
            normalized_value: normalize(item.value, item.unit),
            description: item.description,
            value: item.value,
            unit: item.unit,
            page_number: item.page_number,
            evidence_text: item.evidence_text,
            explanation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyst::{Categorizer, Explainer, Extractor};
    use crate::error::AnalystError;
    use crate::model::{ImportJob, JobStatus, Side, Unit};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    /// Returns one fixed item per section; answers and explanations are scripted.
    struct Scripted {
        item: ExtractedItem,
        category: Result<String, AnalystError>,
        explanation: Result<String, AnalystError>,
    }

    #[async_trait]
    impl Extractor for Scripted {
        async fn extract_items(&self, _t: &str, _x: &str) -> Result<Vec<ExtractedItem>, AnalystError> {
            Ok(vec![self.item.clone()])
        }
    }

    #[async_trait]
    impl Categorizer for Scripted {
        async fn categorize(&self, _s: Side, _t: &str, _d: &str) -> Result<String, AnalystError> {
            self.category.clone()
        }
    }

    #[async_trait]
    impl Explainer for Scripted {
        async fn explain(&self, _t: &str, _e: &str) -> Result<String, AnalystError> {
            self.explanation.clone()
        }
    }

    fn item(side: Side, value: Option<f64>, unit: Unit) -> ExtractedItem {
        ExtractedItem {
            side,
            description: "Imposto sobre o Valor Acrescentado".into(),
            value,
            unit,
            page_number: 1,
            evidence_text: "Imposto sobre o Valor Acrescentado 2,5 milhões".into(),
        }
    }

    fn unavailable() -> AnalystError {
        AnalystError::Unavailable {
            operation: "test".into(),
            detail: "down".into(),
        }
    }

    async fn run_one(scripted: Scripted) -> BudgetItem {
        let store = Arc::new(MemoryStore::new());
        let doc = Document::new(2024, "orcamento.pdf");
        let job = ImportJob::pending(doc.id);
        store.insert_document(doc.clone()).unwrap();
        store.insert_job(job.clone()).unwrap();

        let mut tracker = JobTracker::new(job, store.clone(), None);
        tracker.start().await.unwrap();

        let orchestrator = ExtractionOrchestrator::new(
            Analyst::uniform(Arc::new(scripted)),
            store.clone(),
            10,
            None,
        );
        let pages = PageText::numbered(["Receitas\nIVA 2,5"]);
        let sections = vec![Section::new(vec!["Receitas".into()], 0, 0)];
        let outcome = orchestrator.run(&doc, &sections, &pages, &mut tracker).await.unwrap();
        assert_eq!(outcome.item_count, 1);
        assert_eq!(tracker.job().status, JobStatus::Done);

        store.snapshot(doc.id).unwrap().items.remove(0)
    }

    #[test]
    fn marked_text_uses_one_based_markers() {
        let pages = PageText::numbered(["a", "b", "c", "d"]);
        let section = Section::new(vec!["X".into()], 1, 2);
        assert_eq!(
            marked_section_text(&section, &pages),
            "--- PAGE 2 ---\nb\n\n--- PAGE 3 ---\nc"
        );
    }

    #[test]
    fn marked_text_single_page() {
        let pages = PageText::numbered(["só uma"]);
        let section = Section::new(vec!["Document".into()], 0, 0);
        assert_eq!(marked_section_text(&section, &pages), "--- PAGE 1 ---\nsó uma");
    }

    #[tokio::test]
    async fn matched_category_and_normalised_value() {
        let built = run_one(Scripted {
            item: item(Side::Revenue, Some(2.5), Unit::MillionEur),
            category: Ok("impostos sobre compras".into()),
            explanation: Ok("O IVA é um imposto sobre o consumo.".into()),
        })
        .await;
        assert_eq!(built.category, Category::TaxesOnPurchases);
        assert_eq!(built.normalized_value, Some(2_500_000.0));
        assert_eq!(built.value, Some(2.5));
        assert_eq!(built.year, 2024);
        assert_eq!(built.explanation, "O IVA é um imposto sobre o consumo.");
    }

    #[tokio::test]
    async fn unknown_answer_falls_back_per_side() {
        let revenue = run_one(Scripted {
            item: item(Side::Revenue, None, Unit::Eur),
            category: Ok("Lotaria".into()),
            explanation: Ok("x".into()),
        })
        .await;
        assert_eq!(revenue.category, Category::OtherRevenue);
        assert_eq!(revenue.normalized_value, None);

        let expense = run_one(Scripted {
            item: item(Side::Expense, Some(1.0), Unit::Unknown),
            category: Err(unavailable()),
            explanation: Ok("x".into()),
        })
        .await;
        assert_eq!(expense.category, Category::InfrastructureEnvironment);
        assert_eq!(expense.normalized_value, Some(1.0));
    }

    #[tokio::test]
    async fn failed_explanation_is_templated() {
        let built = run_one(Scripted {
            item: item(Side::Revenue, Some(1.0), Unit::Eur),
            category: Ok("Outras receitas".into()),
            explanation: Err(unavailable()),
        })
        .await;
        assert_eq!(
            built.explanation,
            "This item appears in section Receitas. Evidence: Imposto so..."
        );
    }
}
