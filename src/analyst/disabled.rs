//! Dry-run analyst: answers every question without a model.
//!
//! Extraction finds nothing, categorisation answers with the side's default
//! category and explanations are templated. Page and section stages still
//! run in full, which makes this useful for checking segmentation.

use super::{Categorizer, Explainer, Extractor};
use crate::error::AnalystError;
use crate::model::{Category, ExtractedItem, Side};
use crate::prompts::fallback_explanation;
use async_trait::async_trait;

/// Evidence characters quoted by dry-run explanations.
pub const DRY_RUN_EXCERPT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAnalyst;

#[async_trait]
impl Extractor for DisabledAnalyst {
    async fn extract_items(
        &self,
        _title_path: &str,
        _marked_text: &str,
    ) -> Result<Vec<ExtractedItem>, AnalystError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl Categorizer for DisabledAnalyst {
    async fn categorize(
        &self,
        side: Side,
        _title_path: &str,
        _description: &str,
    ) -> Result<String, AnalystError> {
        Ok(Category::default_for(side).label().to_string())
    }
}

#[async_trait]
impl Explainer for DisabledAnalyst {
    async fn explain(&self, title_path: &str, evidence_text: &str) -> Result<String, AnalystError> {
        Ok(fallback_explanation(
            title_path,
            evidence_text,
            DRY_RUN_EXCERPT_CHARS,
        ))
    }
}
