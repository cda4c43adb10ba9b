//! Prompts for VLM-based invoice extraction.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the JSON keys promised to the model here
//!    must match the field names [`crate::pipeline::parse`] looks for;
//!    changing either side means editing exactly two well-known places.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without
//!    spinning up a real VLM, making key mismatches easy to catch.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Default system prompt for extracting structured data from an invoice image.
///
/// Field semantics target Czech invoices (the two domestic VAT rates, DUZP,
/// the variabilní symbol fallback for invoice numbers) but degrade gracefully
/// on invoices from elsewhere — unknown fields simply come back absent.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an AI system that extracts structured data from a scanned invoice image and returns a single JSON object.

Extract the following fields:

- issuer: Legal name of the entity that issued the invoice. Prefer the name carrying a legal form (s.r.o., a.s., spol. s r.o., GmbH, Ltd., Inc. and similar) over any brand or trade name, even when the brand is displayed more prominently. If the issuer is an individual person there is no legal form; use the full personal name.
- vat_id: VAT identifier: two letters (usually CZ) followed by 8 digits for a company or 9-10 digits for an individual. Look in the header, footer, and company-details block. If the first character reads "C" followed by what looks like the digit "2", read it as "CZ".
- invoice_number: The unique identifier of this invoice document, labelled "číslo faktury", "daňový doklad číslo", or "doklad číslo". Do not use payer, client, customer, or order numbers. If no labelled invoice number exists, use the "variabilní symbol" value. Keep digits only.
- issue_date: Date the invoice was issued ("Datum vystavení", "Vystaveno"). Format dd.mm.yyyy regardless of the format on the invoice.
- due_date: Payment due date ("Datum splatnosti"). If missing, repeat issue_date. Format dd.mm.yyyy.
- tax_date: Date the taxable supply took place ("Datum uskutečnění zdanitelného plnění", often abbreviated or written as "DUZP"). If missing, repeat issue_date. Format dd.mm.yyyy.
- taxable_21: Total base amount taxed at the 21% VAT rate, before VAT. Omit the field if the invoice has no 21% line.
- vat_21: Total 21% VAT amount, from the same summary line as taxable_21. Omit if there is no 21% line.
- taxable_12: Total base amount taxed at the 12% VAT rate, before VAT. Omit if there is no 12% line.
- vat_12: Total 12% VAT amount. Omit if there is no 12% line.
- total: Total amount payable including VAT — the amount the client pays.
- currency: ISO 4217 code of the invoice currency (CZK, EUR, ...).
- line_items: Array of the billed items in page order, each an object with "description", "quantity", and "unit_price". Use an empty array if the items are not legible.

Rules:
1. Respond with ONLY the JSON object. No commentary, no markdown fences.
2. Amounts are JSON numbers with a dot decimal separator.
3. Omit any field you cannot read from the invoice. Never invent values."#;

/// The single user-turn text accompanying the invoice image.
///
/// Vision APIs require at least one user turn to respond to; the image
/// carries all the actual content.
pub const USER_INSTRUCTION: &str =
    "Extract the invoice data and return it in the specified JSON format.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_record_field() {
        for key in [
            "issuer",
            "vat_id",
            "invoice_number",
            "issue_date",
            "due_date",
            "tax_date",
            "taxable_21",
            "vat_21",
            "taxable_12",
            "vat_12",
            "total",
            "currency",
            "line_items",
        ] {
            assert!(
                DEFAULT_SYSTEM_PROMPT.contains(key),
                "prompt does not mention field {key}"
            );
        }
    }

    #[test]
    fn prompt_forbids_fences() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("No commentary, no markdown fences"));
    }
}
