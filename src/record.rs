//! Output types: the extraction record and batch result structures.
//!
//! [`ExtractionRecord`] is the structured representation of one invoice as
//! parsed from model output. Serialisation skips fields the model did not
//! supply, so the JSON written next to a document contains exactly the fields
//! that were extracted — consumers can distinguish "absent on the invoice"
//! from "zero".

use crate::error::DocumentFailure;
use crate::vat::VatStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One line item on an invoice, in the order it appears on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
}

/// Structured data extracted from one invoice.
///
/// `issuer` and `total` are the required minimum; everything else is optional
/// and omitted from serialised output when absent. `tax_date` is the Czech
/// DUZP (date the taxable supply took place); the `taxable_*`/`vat_*` pairs
/// are the per-rate summary lines found on Czech invoices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Legal name of the entity that issued the invoice.
    pub issuer: String,

    /// VAT identifier (two-letter country prefix + digits), if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,

    /// Issue date, normalised to dd.mm.yyyy by the model prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,

    /// DUZP — the VAT point date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_date: Option<String>,

    /// Base amount taxed at 21 %.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxable_21: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_21: Option<f64>,

    /// Base amount taxed at 12 %.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxable_12: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_12: Option<f64>,

    /// Total amount payable, including VAT.
    pub total: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Line items in page order. Always serialised, even when empty.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

impl ExtractionRecord {
    /// Whether expected optional fields are absent from the record.
    ///
    /// `vat_id`, `invoice_number`, `issue_date`, and `currency` appear on any
    /// readable invoice; a record missing one of them usually means a bad
    /// scan or a model that could not read part of the page. Fields that are
    /// legitimately absent from many invoices (the per-rate VAT summary,
    /// due/tax dates) do not count.
    pub fn is_partial(&self) -> bool {
        self.vat_id.is_none()
            || self.invoice_number.is_none()
            || self.issue_date.is_none()
            || self.currency.is_none()
    }
}

/// Timing and token accounting for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the source document (1 for raster images).
    pub page_count: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Inference retries that were needed before success.
    pub retries: u32,
    pub duration_ms: u64,
}

/// The outcome of a successful single-document extraction.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutput {
    pub record: ExtractionRecord,
    /// Registry verdict for the record's VAT identifier, when the lookup ran.
    pub vat_status: Option<VatStatus>,
    pub stats: ExtractionStats,
}

/// One entry in a batch result: either a record or a failure, never both.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResult {
    pub input: PathBuf,
    /// Where the JSON output landed, when one was written.
    pub output: Option<PathBuf>,
    pub record: Option<ExtractionRecord>,
    pub vat_status: Option<VatStatus>,
    pub stats: ExtractionStats,
    pub error: Option<DocumentFailure>,
}

impl DocumentResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate accounting across a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub total_documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutput {
    /// Per-document results, in input order.
    pub documents: Vec<DocumentResult>,
    pub stats: BatchStats,
}
