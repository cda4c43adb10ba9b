//! Extraction entry points: one document, one document to file, and batch.
//!
//! A batch is nothing more than independent single-document runs driven
//! through a bounded pool — there is no shared mutable state between
//! documents, so one bad invoice can only ever take itself down. The single
//! exception is authentication: a rejected API key will fail every document
//! identically, so the batch stops early instead of burning the whole input
//! set against a dead credential.

use crate::config::ExtractionConfig;
use crate::error::{DocumentFailure, ExtractError};
use crate::pipeline::render::DocumentInfo;
use crate::pipeline::{encode, inference, input, parse, render, write};
use crate::provider::{self, VisionProvider};
use crate::record::{BatchOutput, BatchStats, DocumentOutput, DocumentResult, ExtractionStats};
use crate::vat::VatValidator;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Extract structured data from a single invoice document.
///
/// This is the primary library entry point. Nothing is written to disk; use
/// [`extract_to_file`] or [`extract_batch`] for that.
///
/// # Errors
/// Any [`ExtractError`] variant; see the module docs of [`crate::error`] for
/// which ones are per-document and which indicate a broken setup.
pub async fn extract(
    input_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<DocumentOutput, ExtractError> {
    let provider = resolve_provider(config)?;
    let validator = build_validator(config)?;
    run_pipeline(input_path.as_ref(), &provider, validator.as_ref(), config).await
}

/// Extract a single document and write `<stem>.json` (honouring
/// `config.output_dir`). Returns the output together with where it landed.
pub async fn extract_to_file(
    input_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<(DocumentOutput, PathBuf), ExtractError> {
    let input_path = input_path.as_ref();
    let output = extract(input_path, config).await?;

    let output_path = write::output_path_for(input_path, config.output_dir.as_deref());
    write::write_record(&output.record, output.vat_status, &output_path).await?;

    Ok((output, output_path))
}

/// Process a set of documents through independent pipeline runs, at most
/// `config.concurrency` in flight, writing one JSON file per success.
///
/// Per-document failures are logged, recorded in the returned
/// [`BatchOutput`], and do not stop the batch. Failures for which
/// [`ExtractError::aborts_batch`] holds (bad credentials, unusable
/// configuration) abort the run early and are returned as `Err`.
pub async fn extract_batch(
    inputs: &[PathBuf],
    config: &ExtractionConfig,
) -> Result<BatchOutput, ExtractError> {
    let batch_start = Instant::now();
    let provider = resolve_provider(config)?;
    let validator = Arc::new(build_validator(config)?);
    let total = inputs.len();

    info!(
        "Starting batch: {} documents, concurrency {}, provider '{}' model '{}'",
        total,
        config.concurrency,
        provider.name(),
        provider.model()
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut tasks = stream::iter(inputs.iter().cloned().enumerate().map(|(index, path)| {
        let provider = Arc::clone(&provider);
        let validator = Arc::clone(&validator);
        let config = config.clone();
        async move {
            let name = display_name(&path);
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_start(&name, total);
            }
            let result = process_one(&path, &provider, validator.as_ref().as_ref(), &config).await;
            (index, path, result)
        }
    }))
    .buffer_unordered(config.concurrency);

    let mut results: Vec<(usize, DocumentResult)> = Vec::with_capacity(total);

    while let Some((index, path, result)) = tasks.next().await {
        let name = display_name(&path);
        match result {
            Ok(doc_result) => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_complete(&name, total);
                }
                results.push((index, doc_result));
            }
            Err(e) if e.aborts_batch() => {
                error!("{}: {} — aborting batch", path.display(), e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_error(&name, total, &e.to_string());
                    cb.on_batch_complete(total, results.iter().filter(|(_, r)| r.succeeded()).count());
                }
                return Err(e);
            }
            Err(e) => {
                error!("{}: {:?} failure — {}", path.display(), e.kind(), e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_error(&name, total, &e.to_string());
                }
                results.push((
                    index,
                    DocumentResult {
                        input: path,
                        output: None,
                        record: None,
                        vat_status: None,
                        stats: ExtractionStats::default(),
                        error: Some(DocumentFailure::from(&e)),
                    },
                ));
            }
        }
    }

    // buffer_unordered yields in completion order; restore input order.
    results.sort_by_key(|(index, _)| *index);
    let documents: Vec<DocumentResult> = results.into_iter().map(|(_, r)| r).collect();

    let succeeded = documents.iter().filter(|d| d.succeeded()).count();
    let stats = BatchStats {
        total_documents: documents.len(),
        succeeded,
        failed: documents.len() - succeeded,
        total_input_tokens: documents.iter().map(|d| d.stats.input_tokens as u64).sum(),
        total_output_tokens: documents.iter().map(|d| d.stats.output_tokens as u64).sum(),
        total_duration_ms: batch_start.elapsed().as_millis() as u64,
    };

    info!(
        "Batch complete: {}/{} documents in {}ms",
        succeeded, stats.total_documents, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, succeeded);
    }

    Ok(BatchOutput { documents, stats })
}

/// Report a document's kind and page count without any inference.
///
/// Does not require a provider or API key.
pub async fn inspect(input_path: impl AsRef<Path>) -> Result<DocumentInfo, ExtractError> {
    let document = input::load_document(input_path).await?;
    render::inspect_document(&document).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// One full pipeline run plus the output write, batch-style.
async fn process_one(
    path: &Path,
    provider: &Arc<dyn VisionProvider>,
    validator: Option<&VatValidator>,
    config: &ExtractionConfig,
) -> Result<DocumentResult, ExtractError> {
    let output = run_pipeline(path, provider, validator, config).await?;

    let output_path = write::output_path_for(path, config.output_dir.as_deref());
    write::write_record(&output.record, output.vat_status, &output_path).await?;

    Ok(DocumentResult {
        input: path.to_path_buf(),
        output: Some(output_path),
        record: Some(output.record),
        vat_status: output.vat_status,
        stats: output.stats,
        error: None,
    })
}

/// The fixed linear pipeline for one document.
async fn run_pipeline(
    path: &Path,
    provider: &Arc<dyn VisionProvider>,
    validator: Option<&VatValidator>,
    config: &ExtractionConfig,
) -> Result<DocumentOutput, ExtractError> {
    let start = Instant::now();
    info!("Processing {}", path.display());

    // ── Step 1: Load and classify ────────────────────────────────────────
    let document = input::load_document(path).await?;

    // ── Step 2: Rasterise the first page ─────────────────────────────────
    let rendered = render::render_first_page(&document, config).await?;

    // ── Step 3: Encode for the request body ──────────────────────────────
    let page = encode::encode_page(&rendered.image).map_err(|e| ExtractError::RenderFailed {
        path: path.to_path_buf(),
        detail: format!("image encoding failed: {e}"),
    })?;
    // The bitmap is no longer needed once encoded.
    drop(rendered.image);

    // ── Step 4: Inference ────────────────────────────────────────────────
    let outcome = inference::run_inference(provider, &page, config).await?;
    drop(page);

    // ── Step 5: Parse and validate the reply ─────────────────────────────
    let record = parse::parse_response(&outcome.reply.text)?;
    if record.is_partial() {
        warn!(
            "{}: record is partial (some expected fields absent)",
            path.display()
        );
    }

    // ── Step 6: Optional registry lookup ─────────────────────────────────
    let vat_status = match (validator, record.vat_id.as_deref()) {
        (Some(validator), Some(vat_id)) => Some(validator.check(vat_id).await?),
        _ => None,
    };

    let stats = ExtractionStats {
        page_count: rendered.page_count,
        input_tokens: outcome.reply.input_tokens,
        output_tokens: outcome.reply.output_tokens,
        retries: outcome.retries,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "{}: extracted '{}' total {} {} in {}ms",
        path.display(),
        record.issuer,
        record.total,
        record.currency.as_deref().unwrap_or(""),
        stats.duration_ms
    );

    Ok(DocumentOutput {
        record,
        vat_status,
        stats,
    })
}

/// Resolve the vision provider, from most-specific to least-specific.
///
/// The four-level fallback chain lets library users and CLI users each set
/// exactly as much or as little as they need:
///
/// 1. **Pre-built provider** (`config.provider`) — the caller constructed and
///    configured the provider entirely; used as-is. This is also the test
///    seam: scripted providers go in here.
///
/// 2. **Named provider** (`config.provider_name`) — the caller named a
///    provider (e.g. `"anthropic"`); the API key is read from the
///    corresponding environment variable.
///
/// 3. **Environment pair** (`INVOICE2JSON_PROVIDER` + `INVOICE2JSON_MODEL`) —
///    both set means the execution environment (Makefile, shell profile, CI)
///    chose; checked before auto-detection so the choice is honoured even
///    when multiple API keys are present.
///
/// 4. **Auto-detection** — the first provider whose API key variable is set.
fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn VisionProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return provider::create(name, config.model.as_deref(), config.api_timeout_secs);
    }

    if let (Ok(name), Ok(model)) = (
        std::env::var("INVOICE2JSON_PROVIDER"),
        std::env::var("INVOICE2JSON_MODEL"),
    ) {
        if !name.is_empty() && !model.is_empty() {
            return provider::create(&name, Some(&model), config.api_timeout_secs);
        }
    }

    provider::from_env(config.model.as_deref(), config.api_timeout_secs)
}

fn build_validator(config: &ExtractionConfig) -> Result<Option<VatValidator>, ExtractError> {
    if config.validate_vat {
        Ok(Some(VatValidator::new(config)?))
    } else {
        Ok(None)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
