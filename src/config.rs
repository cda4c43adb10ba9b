//! Configuration types for invoice extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across worker tasks, log them, and diff two
//! runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use crate::provider::VisionProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for an invoice extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use invoice2json::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("claude-3-5-haiku-20241022")
///     .concurrency(2)
///     .validate_vat(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Maximum rendered image dimension (width or height) in pixels. Default: 2048.
    ///
    /// Invoices are dense with small print, so the cap sits near the top of
    /// the sweet spot for vision models while keeping the base64 request body
    /// well under typical API upload limits. An A4 page at this cap resolves
    /// 8-point text reliably; raising it mostly adds tokens, not accuracy.
    pub max_rendered_pixels: u32,

    /// Model identifier, e.g. "claude-3-5-haiku-20241022", "gpt-4o-mini".
    /// If None, uses the resolved provider's default.
    pub model: Option<String>,

    /// Provider name (e.g. "anthropic", "groq", "openai").
    /// If None along with `provider`, the provider is auto-detected from
    /// API-key environment variables.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    /// Useful in tests or when the caller needs custom middleware.
    pub provider: Option<Arc<dyn VisionProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction wants the model deterministic and faithful to what is on
    /// the page; any creativity shows up as fabricated amounts.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 1024.
    ///
    /// A filled-in record with a dozen line items fits comfortably; setting
    /// this too low truncates the JSON mid-object and fails parsing.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient inference failure. Default: 3.
    ///
    /// 429/5xx/timeout errors are retried; authentication errors are not —
    /// they surface immediately and abort a batch.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s, so concurrent workers
    /// do not hammer a recovering endpoint in lockstep.
    pub retry_backoff_ms: u64,

    /// Per-inference-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Whether to cross-check the extracted VAT identifier against the
    /// public registry. Default: true.
    pub validate_vat: bool,

    /// Override for the VAT registry endpoint. If None, the Czech Ministry
    /// of Finance unreliable-payer service is used.
    pub registry_url: Option<String>,

    /// VAT registry request timeout in seconds. Default: 10.
    ///
    /// A slow registry must not stall the pipeline; on timeout the lookup
    /// degrades to `unavailable` and the record is still written.
    pub registry_timeout_secs: u64,

    /// Number of documents processed concurrently in a batch. Default: 4.
    ///
    /// Inference APIs are network-bound, so a small pool cuts wall-clock
    /// time on multi-invoice batches without tripping rate limits.
    pub concurrency: usize,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Directory for output JSON files. If None, each output lands next to
    /// its source document.
    pub output_dir: Option<PathBuf>,

    /// Per-document progress events for batch runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 2048,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 1024,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            validate_vat: true,
            registry_url: None,
            registry_timeout_secs: 10,
            concurrency: 4,
            system_prompt: None,
            output_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("validate_vat", &self.validate_vat)
            .field("registry_url", &self.registry_url)
            .field("registry_timeout_secs", &self.registry_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(256);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn VisionProvider>) -> Self {
        self.config.provider = Some(provider);
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

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn validate_vat(mut self, v: bool) -> Self {
        self.config.validate_vat = v;
        self
    }

    pub fn registry_url(mut self, url: impl Into<String>) -> Self {
        self.config.registry_url = Some(url.into());
        self
    }

    pub fn registry_timeout_secs(mut self, secs: u64) -> Self {
        self.config.registry_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ExtractError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.max_rendered_pixels < 256 {
            return Err(ExtractError::InvalidConfig(format!(
                "max_rendered_pixels must be ≥ 256, got {}",
                c.max_rendered_pixels
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExtractionConfig::builder().build().unwrap();
        assert_eq!(config.max_rendered_pixels, 2048);
        assert_eq!(config.max_retries, 3);
        assert!(config.validate_vat);
        assert!(config.model.is_none());
    }

    #[test]
    fn builder_clamps_out_of_range_values() {
        let config = ExtractionConfig::builder()
            .temperature(5.0)
            .concurrency(0)
            .max_rendered_pixels(10)
            .build()
            .unwrap();
        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_rendered_pixels, 256);
    }

    #[test]
    fn debug_does_not_require_provider_debug() {
        let config = ExtractionConfig::default();
        let s = format!("{config:?}");
        assert!(s.contains("max_rendered_pixels"));
    }
}
