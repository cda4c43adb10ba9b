//! # invoice2json
//!
//! Extract structured data from invoice documents (PDF or image) using
//! Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Template- and OCR-based invoice parsers break on every new supplier
//! layout. Instead this crate rasterises the first page into a PNG and lets
//! a VLM read it as a bookkeeper would, returning issuer, amounts, dates,
//! VAT identifier, and line items as one JSON record per document — with an
//! optional cross-check of the VAT identifier against the public registry.
//!
//! ## Pipeline Overview
//!
//! ```text
//! invoice (PDF / PNG / JPEG / GIF / WEBP)
//!  │
//!  ├─ 1. Input      load bytes, classify PDF vs raster image
//!  ├─ 2. Render     rasterise page one via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode     PNG → base64 request payload
//!  ├─ 4. Inference  one VLM call with bounded retry/backoff
//!  ├─ 5. Parse      locate the JSON object, validate required fields
//!  ├─ 6. VAT check  optional registry lookup (valid / invalid / unavailable)
//!  └─ 7. Output     atomic write of <stem>.json
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice2json::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from ANTHROPIC_API_KEY / GROQ_API_KEY / OPENAI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let output = extract("invoice1.pdf", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.record)?);
//!     if let Some(status) = output.vat_status {
//!         eprintln!("VAT payer status: {status}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice2json` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! invoice2json = { version = "0.3", default-features = false }
//! ```
//!
//! ## Choosing a Model
//!
//! Accuracy and cost trade against each other per document; the endpoint is
//! substituted manually via `--provider`/`--model` — there is no automatic
//! fallback. `claude-3-5-haiku-20241022` (the default on the Anthropic
//! provider) reads typical invoices reliably at a fraction of a cent per
//! document; step up to a larger model for handwritten or badly scanned
//! input, or down to a Groq-hosted open model for bulk runs.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod record;
pub mod vat;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{DocumentFailure, ExtractError, FailureKind};
pub use extract::{extract, extract_batch, extract_to_file, inspect};
pub use pipeline::input::{collect_inputs, is_supported, SUPPORTED_EXTENSIONS};
pub use pipeline::render::DocumentInfo;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use provider::{VisionProvider, VisionReply, VisionRequest};
pub use record::{
    BatchOutput, BatchStats, DocumentOutput, DocumentResult, ExtractionRecord, ExtractionStats,
    LineItem,
};
pub use vat::VatStatus;
