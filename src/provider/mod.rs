//! The inference-provider seam: send one image plus instructions, get text.
//!
//! The hosted model is an external dependency with no local substitute, so it
//! sits behind the deliberately narrow [`VisionProvider`] trait — the rest of
//! the pipeline (and every test) only ever sees "image in, text out". Swapping
//! providers, or substituting a cheaper model for a more accurate one, never
//! touches the parser.
//!
//! Two wire formats cover the hosted APIs in use:
//!
//! * [`anthropic::AnthropicProvider`] — the Anthropic Messages API, images as
//!   base64 source blocks.
//! * [`openai::OpenAiCompatProvider`] — OpenAI-style chat completions with
//!   base64 data-URL images; serves OpenAI, Groq, and any compatible endpoint.

pub mod anthropic;
pub mod openai;

use crate::error::ExtractError;
use crate::pipeline::encode::EncodedPage;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiCompatProvider;

/// One inference request: the rendered page plus the fixed instructions.
#[derive(Debug)]
pub struct VisionRequest<'a> {
    pub system_prompt: &'a str,
    pub user_text: &'a str,
    pub image: &'a EncodedPage,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Raw model output plus token accounting.
#[derive(Debug, Clone)]
pub struct VisionReply {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Provider-level failures, classified for the retry loop.
///
/// Authentication failures are terminal. Rate limits and transient failures
/// are retried with backoff by [`crate::pipeline::inference`]; everything
/// else is a permanent API error for this request.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 401/403 — credentials rejected. Never retried.
    #[error("authentication rejected: {detail}")]
    Auth { detail: String },

    /// 429 — back off and retry. `retry_after_secs` carries the server's
    /// Retry-After header when present.
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// 5xx, connection failure, or request timeout — retryable.
    #[error("transient failure: {detail}")]
    Transient { detail: String },

    /// Any other failure: 4xx request errors, unexpected response shape.
    #[error("API error: {detail}")]
    Api { detail: String },
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::Transient { .. }
        )
    }
}

/// A hosted multimodal inference endpoint.
///
/// Implementations hold their own HTTP client and credentials; no state is
/// retained between calls.
#[async_trait]
pub trait VisionProvider: Send + Sync + std::fmt::Debug {
    /// Short provider name for logs and error messages.
    fn name(&self) -> &str;

    /// The model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Send one synchronous inference request.
    async fn complete(&self, request: VisionRequest<'_>) -> Result<VisionReply, ProviderError>;
}

/// Instantiate a named provider, reading its API key from the environment.
///
/// Known names: `anthropic`, `groq`, `openai`. The model falls back to a
/// per-provider default when `model` is None.
pub fn create(
    name: &str,
    model: Option<&str>,
    timeout_secs: u64,
) -> Result<Arc<dyn VisionProvider>, ExtractError> {
    match name {
        "anthropic" => {
            let key = require_env("ANTHROPIC_API_KEY", name)?;
            Ok(Arc::new(AnthropicProvider::new(key, model, timeout_secs)?))
        }
        "groq" => {
            let key = require_env("GROQ_API_KEY", name)?;
            Ok(Arc::new(OpenAiCompatProvider::groq(key, model, timeout_secs)?))
        }
        "openai" => {
            let key = require_env("OPENAI_API_KEY", name)?;
            Ok(Arc::new(OpenAiCompatProvider::openai(key, model, timeout_secs)?))
        }
        other => Err(ExtractError::ProviderNotConfigured {
            provider: other.to_string(),
            hint: "Known providers: anthropic, groq, openai.".into(),
        }),
    }
}

/// Auto-detect a provider from API-key environment variables.
///
/// Checked in order: `ANTHROPIC_API_KEY`, `GROQ_API_KEY`, `OPENAI_API_KEY`.
pub fn from_env(
    model: Option<&str>,
    timeout_secs: u64,
) -> Result<Arc<dyn VisionProvider>, ExtractError> {
    for (var, name) in [
        ("ANTHROPIC_API_KEY", "anthropic"),
        ("GROQ_API_KEY", "groq"),
        ("OPENAI_API_KEY", "openai"),
    ] {
        if std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false) {
            return create(name, model, timeout_secs);
        }
    }

    Err(ExtractError::ProviderNotConfigured {
        provider: "auto".into(),
        hint: "No provider could be auto-detected from the environment.\n\
               Set ANTHROPIC_API_KEY, GROQ_API_KEY, or OPENAI_API_KEY, or pass --provider."
            .into(),
    })
}

fn require_env(var: &str, provider: &str) -> Result<String, ExtractError> {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ExtractError::ProviderNotConfigured {
            provider: provider.to_string(),
            hint: format!("Set the {var} environment variable."),
        }),
    }
}

/// Map an HTTP error response to a [`ProviderError`].
///
/// Shared by both wire formats — the status-code semantics are identical.
pub(crate) fn classify_status(
    status: reqwest::StatusCode,
    retry_after_secs: Option<u64>,
    body: String,
) -> ProviderError {
    use reqwest::StatusCode;

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth { detail: body },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after_secs },
        s if s.is_server_error() => ProviderError::Transient {
            detail: format!("HTTP {s}: {body}"),
        },
        s => ProviderError::Api {
            detail: format!("HTTP {s}: {body}"),
        },
    }
}

/// Map a reqwest transport error to a [`ProviderError`].
pub(crate) fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() {
        ProviderError::Transient {
            detail: err.to_string(),
        }
    } else {
        ProviderError::Api {
            detail: err.to_string(),
        }
    }
}

/// Parse a Retry-After header value (seconds form only).
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn auth_status_is_terminal() {
        let e = classify_status(StatusCode::UNAUTHORIZED, None, "bad key".into());
        assert!(matches!(e, ProviderError::Auth { .. }));
        assert!(!e.is_retryable());
    }

    #[test]
    fn rate_limit_keeps_retry_after() {
        let e = classify_status(StatusCode::TOO_MANY_REQUESTS, Some(30), String::new());
        match e {
            ProviderError::RateLimited { retry_after_secs } => {
                assert_eq!(retry_after_secs, Some(30));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn server_errors_are_retryable() {
        let e = classify_status(StatusCode::SERVICE_UNAVAILABLE, None, "overloaded".into());
        assert!(e.is_retryable());
    }

    #[test]
    fn client_errors_are_permanent() {
        let e = classify_status(StatusCode::BAD_REQUEST, None, "bad image".into());
        assert!(!e.is_retryable());
        assert!(matches!(e, ProviderError::Api { .. }));
    }

    #[test]
    fn unknown_provider_name_rejected() {
        let err = create("mistral", None, 60).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::ProviderNotConfigured { .. }
        ));
    }
}
