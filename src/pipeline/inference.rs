//! Driving the vision provider: the only stage with network I/O on the
//! extraction path, and the owner of the retry policy.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 5xx errors from inference APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^(attempt-1)`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s, totalling < 4 s of back-off per document. A
//! server-supplied Retry-After overrides the computed delay.
//!
//! Authentication failures are different in kind: they will reproduce for
//! every document in the batch, so they are returned immediately without
//! consuming a single retry.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::encode::EncodedPage;
use crate::prompts::{DEFAULT_SYSTEM_PROMPT, USER_INSTRUCTION};
use crate::provider::{ProviderError, VisionProvider, VisionReply, VisionRequest};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// A successful inference plus how many retries it cost.
#[derive(Debug)]
pub struct InferenceOutcome {
    pub reply: VisionReply,
    pub retries: u32,
}

/// Send the rendered page to the provider, retrying transient failures.
pub async fn run_inference(
    provider: &Arc<dyn VisionProvider>,
    page: &EncodedPage,
    config: &ExtractionConfig,
) -> Result<InferenceOutcome, ExtractError> {
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let mut last_err: Option<ProviderError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = match &last_err {
                Some(ProviderError::RateLimited {
                    retry_after_secs: Some(secs),
                }) => Duration::from_secs(*secs),
                _ => Duration::from_millis(config.retry_backoff_ms * 2u64.pow(attempt - 1)),
            };
            warn!(
                "Inference retry {}/{} after {:?}",
                attempt, config.max_retries, backoff
            );
            sleep(backoff).await;
        }

        let request = VisionRequest {
            system_prompt,
            user_text: USER_INSTRUCTION,
            image: page,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        match provider.complete(request).await {
            Ok(reply) => {
                return Ok(InferenceOutcome {
                    reply,
                    retries: attempt,
                })
            }
            Err(ProviderError::Auth { detail }) => {
                return Err(ExtractError::Auth {
                    provider: provider.name().to_string(),
                    detail,
                })
            }
            Err(e) if !e.is_retryable() => {
                return Err(ExtractError::Inference {
                    retries: attempt,
                    detail: e.to_string(),
                })
            }
            Err(e) => {
                warn!(
                    "Inference attempt {} failed — {}",
                    attempt + 1,
                    e
                );
                last_err = Some(e);
            }
        }
    }

    Err(ExtractError::Inference {
        retries: config.max_retries,
        detail: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".into()),
    })
}
