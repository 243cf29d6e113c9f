//! LLM-backed analyst over an `edgequake_llm` provider.
//!
//! Each capability is one chat call: a fixed system prompt from
//! [`crate::prompts`] plus a user message carrying the section breadcrumb and
//! the text in question. Transport failures go through the [`RetryPolicy`].
//! A response that arrives but cannot be used is not retried: extraction
//! logs it and returns no items, while categorisation and explanation report
//! [`AnalystError::MalformedResponse`] so the caller applies its fallback.

use super::parse::{first_page_marker, parse_extraction};
use super::retry::RetryPolicy;
use super::{Categorizer, Explainer, Extractor};
use crate::config::ImportConfig;
use crate::error::AnalystError;
use crate::model::{ExtractedItem, Side};
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct LlmAnalyst {
    provider: Arc<dyn LLMProvider>,
    retry: RetryPolicy,
    temperature: f32,
    max_tokens: usize,
}

impl LlmAnalyst {
    pub fn new(provider: Arc<dyn LLMProvider>, retry: RetryPolicy) -> Self {
        let defaults = ImportConfig::default();
        Self {
            provider,
            retry,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }

    /// Take sampling and retry settings from `config`.
    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &ImportConfig) -> Self {
        Self {
            provider,
            retry: config.retry_policy(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    /// One system + user exchange, retried on transport failure.
    async fn ask(&self, operation: &str, system: &str, user: String) -> Result<String, AnalystError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let options = self.options();

        let provider = &self.provider;
        let messages = &messages;
        let options = &options;

        let content = self
            .retry
            .run(operation, move || async move {
                provider
                    .chat(messages, Some(options))
                    .await
                    .map(|response| response.content)
            })
            .await?;

        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(AnalystError::MalformedResponse {
                operation: operation.to_string(),
                detail: "empty response".into(),
            });
        }
        Ok(content)
    }
}

#[async_trait]
impl Extractor for LlmAnalyst {
    async fn extract_items(
        &self,
        title_path: &str,
        marked_text: &str,
    ) -> Result<Vec<ExtractedItem>, AnalystError> {
        let raw = self
            .ask(
                "extract",
                prompts::EXTRACT_SYSTEM_PROMPT,
                prompts::extract_user_prompt(title_path, marked_text),
            )
            .await;
        let raw = match raw {
            Ok(raw) => raw,
            Err(e @ AnalystError::MalformedResponse { .. }) => {
                warn!("Section {}: {}, no items", title_path, e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let default_page = first_page_marker(marked_text).unwrap_or(1);
        match parse_extraction(&raw, default_page) {
            Ok(items) => {
                info!("Extracted {} items from section {}", items.len(), title_path);
                Ok(items)
            }
            Err(e) => {
                warn!("Section {}: {}, no items", title_path, e);
                debug!("Unparseable extraction response: {}", truncate(&raw, 500));
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl Categorizer for LlmAnalyst {
    async fn categorize(
        &self,
        side: Side,
        title_path: &str,
        description: &str,
    ) -> Result<String, AnalystError> {
        self.ask(
            "categorize",
            &prompts::categorize_system_prompt(side),
            prompts::categorize_user_prompt(title_path, description),
        )
        .await
    }
}

#[async_trait]
impl Explainer for LlmAnalyst {
    async fn explain(&self, title_path: &str, evidence_text: &str) -> Result<String, AnalystError> {
        self.ask(
            "explain",
            prompts::EXPLAIN_SYSTEM_PROMPT,
            prompts::explain_user_prompt(title_path, evidence_text),
        )
        .await
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
