//! Configuration types for budget document imports.
//!
//! All import behaviour is controlled through [`ImportConfig`], built via its
//! [`ImportConfigBuilder`]. The same config is shared by every job an
//! [`crate::import::Importer`] runs, so it is `Clone` and cheap to pass
//! around (`Arc` for the provider and callback).

use crate::analyst::retry::RetryPolicy;
use crate::error::ImportError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Model used with a named provider when none is given.
pub const DEFAULT_MODEL: &str = "qwen3:4b-instruct";

/// Configuration for importing budget documents.
///
/// Built via [`ImportConfig::builder()`] or using [`ImportConfig::default()`].
///
/// # Example
/// ```rust
/// use budget_import::ImportConfig;
///
/// let config = ImportConfig::builder()
///     .provider_name("ollama")
///     .model("qwen3:4b-instruct")
///     .max_attempts(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Clone)]
pub struct ImportConfig {
    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// LLM provider name (e.g. "openai", "ollama").
    /// If None along with `provider`, the environment decides.
    pub provider_name: Option<String>,

    /// Model identifier for a named provider. Default: [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Dry-run mode: no model calls at all. Default: false.
    ///
    /// Extraction returns no items, categories fall back to the side default
    /// and explanations are templated. Useful for exercising the page and
    /// section stages on a machine without a provider.
    pub llm_disabled: bool,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 2048.
    pub max_tokens: usize,

    /// Attempts per analyst call, including the first one. Default: 3.
    pub max_attempts: u32,

    /// Backoff before the second attempt, in milliseconds. Default: 1000.
    ///
    /// Doubles after each failed attempt: 1 s → 2 s → 4 s.
    pub retry_backoff_ms: u64,

    /// Characters of evidence quoted by the fallback explanation. Default: 200.
    pub explanation_excerpt_chars: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Number of documents imported concurrently by
    /// [`crate::import::Importer::run_batch`]. Default: 2.
    ///
    /// Sections within one document are always processed sequentially.
    pub concurrency: usize,

    /// Optional observer for job events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            provider: None,
            provider_name: None,
            model: None,
            llm_disabled: false,
            temperature: 0.0,
            max_tokens: 2048,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            explanation_excerpt_chars: 200,
            password: None,
            concurrency: 2,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ImportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportConfig")
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("llm_disabled", &self.llm_disabled)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("explanation_excerpt_chars", &self.explanation_excerpt_chars)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ImportProgressCallback>"),
            )
            .finish()
    }
}

impl ImportConfig {
    /// Create a new builder for `ImportConfig`.
    pub fn builder() -> ImportConfigBuilder {
        ImportConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model used with a named provider.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Retry policy applied to every analyst call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}

/// Builder for [`ImportConfig`].
#[derive(Debug)]
pub struct ImportConfigBuilder {
    config: ImportConfig,
}

impl ImportConfigBuilder {
    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn llm_disabled(mut self, v: bool) -> Self {
        self.config.llm_disabled = v;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn explanation_excerpt_chars(mut self, n: usize) -> Self {
        self.config.explanation_excerpt_chars = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ImportConfig, ImportError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(ImportError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(ImportError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ImportError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.provider_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ImportError::InvalidConfig(
                "provider name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
