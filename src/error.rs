//! Error types for the invoice2json library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — the full failure taxonomy for a single pipeline run.
//!   Returned as `Err(ExtractError)` from [`crate::extract::extract`] and
//!   friends.
//!
//! * [`DocumentFailure`] — a serialisable summary of a per-document failure,
//!   stored inside [`crate::record::DocumentResult`] so a batch run can report
//!   partial success rather than losing the whole batch to one bad invoice.
//!
//! Almost every error is per-document and non-fatal to a batch. The exception
//! is [`ExtractError::Auth`] (and unrecoverable configuration problems): a bad
//! API key will reproduce for every subsequent document, so
//! [`ExtractError::aborts_batch`] tells the batch loop to stop early.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All errors a single extraction run can produce.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Invoice file not found: '{}'\nCheck the path exists and is readable.", path.display())]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{}'\nTry: chmod +r {path:?}", path.display())]
    PermissionDenied { path: PathBuf },

    /// The file extension is not one of the supported invoice formats.
    #[error("Unsupported format '{extension}' for '{}'\nSupported: pdf, png, jpg, jpeg, gif, webp", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// PDF structure is corrupt, or a raster image could not be decoded.
    #[error("Document '{}' could not be read: {detail}", path.display())]
    CorruptDocument { path: PathBuf, detail: String },

    /// The PDF opened cleanly but contains no pages to render.
    #[error("Document '{}' has no pages", path.display())]
    EmptyDocument { path: PathBuf },

    /// pdfium or the image encoder failed on the first page.
    #[error("Rendering failed for '{}': {detail}", path.display())]
    RenderFailed { path: PathBuf, detail: String },

    // ── Inference errors ──────────────────────────────────────────────────
    /// No provider could be resolved (missing API key etc.).
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The inference API rejected our credentials (401/403). Never retried;
    /// aborts a batch because it will reproduce for every document.
    #[error("Authentication error from provider '{provider}': {detail}")]
    Auth { provider: String, detail: String },

    /// The inference API returned HTTP 429 — transient, retried with backoff.
    ///
    /// Check `retry_after_secs` for a server-specified delay.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// The inference call failed after all retries were exhausted.
    #[error("Inference failed after {retries} retries: {detail}")]
    Inference { retries: u32, detail: String },

    // ── Parsing errors ────────────────────────────────────────────────────
    /// No parseable JSON object was found in the model output.
    #[error("No JSON object found in model response: {detail}")]
    Parse { detail: String },

    /// The JSON parsed but a required field (issuer, total) is missing.
    #[error("Model response missing required field '{field}'")]
    Schema { field: &'static str },

    // ── VAT errors ────────────────────────────────────────────────────────
    /// The extracted VAT identifier does not match the expected pattern.
    /// Raised before any registry call is made.
    #[error("Malformed VAT identifier '{vat_id}': expected two letters followed by 8-10 digits")]
    MalformedVatId { vat_id: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{}': {source}", path.display())]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium and make sure the shared library is on the loader path,\n\
or set PDFIUM_DYNAMIC_LIB_PATH to the directory containing it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Whether a batch run should stop instead of moving on to the next
    /// document. True only for failures that will reproduce on every
    /// document: bad credentials and unusable configuration.
    pub fn aborts_batch(&self) -> bool {
        matches!(
            self,
            ExtractError::Auth { .. }
                | ExtractError::ProviderNotConfigured { .. }
                | ExtractError::InvalidConfig(_)
                | ExtractError::PdfiumBindingFailed(_)
        )
    }

    /// The coarse failure category, for batch summaries and logs.
    pub fn kind(&self) -> FailureKind {
        match self {
            ExtractError::FileNotFound { .. }
            | ExtractError::PermissionDenied { .. }
            | ExtractError::OutputWriteFailed { .. } => FailureKind::Io,
            ExtractError::UnsupportedFormat { .. }
            | ExtractError::CorruptDocument { .. }
            | ExtractError::MalformedVatId { .. } => FailureKind::Format,
            ExtractError::EmptyDocument { .. } => FailureKind::EmptyDocument,
            ExtractError::Auth { .. } => FailureKind::Auth,
            ExtractError::RateLimited { .. }
            | ExtractError::Inference { .. }
            | ExtractError::ProviderNotConfigured { .. } => FailureKind::Inference,
            ExtractError::Parse { .. } => FailureKind::Parse,
            ExtractError::Schema { .. } => FailureKind::Schema,
            ExtractError::RenderFailed { .. } | ExtractError::PdfiumBindingFailed(_) => {
                FailureKind::Render
            }
            ExtractError::InvalidConfig(_) | ExtractError::Internal(_) => FailureKind::Internal,
        }
    }
}

/// Coarse failure categories for per-document reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Io,
    Format,
    EmptyDocument,
    Render,
    Auth,
    Inference,
    Parse,
    Schema,
    Internal,
}

/// A serialisable per-document failure, stored in
/// [`crate::record::DocumentResult`] when a document fails.
///
/// The batch continues unless the underlying error aborts it.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct DocumentFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ExtractError> for DocumentFailure {
    fn from(err: &ExtractError) -> Self {
        DocumentFailure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
