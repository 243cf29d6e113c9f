//! Model-backed capabilities used by the orchestrator.
//!
//! Three narrow traits, one per question asked of a model:
//!
//! * [`Extractor`]: which line items does this section contain?
//! * [`Categorizer`]: which budget category does this item belong to?
//! * [`Explainer`]: what does this item mean, in plain words?
//!
//! They are injected as `Arc<dyn Trait>` through an [`Analyst`] bundle, so a
//! test can substitute a fake for any one of them. Implementations apply
//! their own retry policy; a returned `Err` means the call is exhausted and
//! the orchestrator falls back.

pub mod disabled;
pub mod llm;
pub mod parse;
pub mod retry;

use crate::error::AnalystError;
use crate::model::{ExtractedItem, Side};
use async_trait::async_trait;
use std::sync::Arc;

pub use disabled::DisabledAnalyst;
pub use llm::LlmAnalyst;
pub use retry::RetryPolicy;

/// Pull line items out of one section's page-marked text.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// `marked_text` is the section's pages, each prefixed by
    /// `--- PAGE n ---`. Malformed or empty model output yields an empty
    /// list; `Err` is reserved for calls that could not be made.
    async fn extract_items(
        &self,
        title_path: &str,
        marked_text: &str,
    ) -> Result<Vec<ExtractedItem>, AnalystError>;
}

/// Choose a category for one item.
#[async_trait]
pub trait Categorizer: Send + Sync {
    /// Returns the model's raw answer; matching it against the closed
    /// category set is done by [`crate::model::Category::resolve`].
    async fn categorize(
        &self,
        side: Side,
        title_path: &str,
        description: &str,
    ) -> Result<String, AnalystError>;
}

/// Write a short (2–3 sentence) explanation for one item.
#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(&self, title_path: &str, evidence_text: &str) -> Result<String, AnalystError>;
}

/// The capabilities an import job runs with.
#[derive(Clone)]
pub struct Analyst {
    pub extractor: Arc<dyn Extractor>,
    pub categorizer: Arc<dyn Categorizer>,
    pub explainer: Arc<dyn Explainer>,
}

impl Analyst {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        categorizer: Arc<dyn Categorizer>,
        explainer: Arc<dyn Explainer>,
    ) -> Self {
        Self {
            extractor,
            categorizer,
            explainer,
        }
    }

    /// Use one value for all three capabilities.
    pub fn uniform<A>(analyst: Arc<A>) -> Self
    where
        A: Extractor + Categorizer + Explainer + 'static,
    {
        Self {
            extractor: analyst.clone(),
            categorizer: analyst.clone(),
            explainer: analyst,
        }
    }
}

impl std::fmt::Debug for Analyst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyst").finish_non_exhaustive()
    }
}
