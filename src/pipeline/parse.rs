//! Response parsing: free-form model text → validated [`ExtractionRecord`].
//!
//! This is the most failure-prone stage — model output is not guaranteed
//! well-formed. Despite a prompt that forbids it, replies arrive wrapped in
//! ```` ```json ```` fences, prefixed with "Here is the extracted data:",
//! with amounts as strings, or with European decimal commas. The rules here
//! are deterministic and individually testable, so prompt changes and parser
//! tolerance evolve independently.
//!
//! ## JSON location strategy
//!
//! Splitting on fence markers is brittle against the many ways models decorate
//! output. Instead the parser scans for the first balanced brace-delimited
//! span that parses as a JSON object, tracking string and escape state so
//! braces inside string values do not terminate the scan. Surrounding prose
//! of any shape is ignored by construction.

use crate::error::ExtractError;
use crate::record::{ExtractionRecord, LineItem};
use serde_json::Value;
use tracing::warn;

/// Parse a raw model reply into a validated record.
///
/// Fails with [`ExtractError::Parse`] when no JSON object can be located and
/// with [`ExtractError::Schema`] when the required `issuer` or `total` field
/// is absent — a missing required field is never fabricated.
pub fn parse_response(text: &str) -> Result<ExtractionRecord, ExtractError> {
    let value = locate_json_object(text).ok_or_else(|| ExtractError::Parse {
        detail: preview(text),
    })?;

    build_record(value)
}

/// Find the first balanced `{...}` span that parses as a JSON object.
///
/// Candidate spans are tried left to right, so an outer object wins over the
/// sub-objects nested inside it, and stray `{` characters in surrounding
/// prose are skipped when their span fails to parse.
fn locate_json_object(text: &str) -> Option<Value> {
    for (start, _) in text.char_indices().filter(|&(_, c)| c == '{') {
        let Some(span) = balanced_span(&text[start..]) else {
            continue;
        };
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(span) {
            return Some(value);
        }
    }
    None
}

/// The balanced brace-delimited prefix of `text` (which starts with `{`),
/// or None when the braces never balance.
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Coerce the parsed JSON object into a record, validating required fields.
fn build_record(value: Value) -> Result<ExtractionRecord, ExtractError> {
    let Value::Object(map) = value else {
        unreachable!("locate_json_object only returns objects");
    };

    let issuer = map
        .get("issuer")
        .and_then(lenient_string)
        .ok_or(ExtractError::Schema { field: "issuer" })?;

    let total = map
        .get("total")
        .and_then(lenient_amount)
        .ok_or(ExtractError::Schema { field: "total" })?;

    Ok(ExtractionRecord {
        issuer,
        vat_id: map.get("vat_id").and_then(lenient_string),
        invoice_number: map.get("invoice_number").and_then(lenient_string),
        issue_date: map.get("issue_date").and_then(lenient_string),
        due_date: map.get("due_date").and_then(lenient_string),
        tax_date: map.get("tax_date").and_then(lenient_string),
        taxable_21: map.get("taxable_21").and_then(lenient_amount),
        vat_21: map.get("vat_21").and_then(lenient_amount),
        taxable_12: map.get("taxable_12").and_then(lenient_amount),
        vat_12: map.get("vat_12").and_then(lenient_amount),
        total,
        currency: map.get("currency").and_then(lenient_string),
        line_items: map
            .get("line_items")
            .map(parse_line_items)
            .unwrap_or_default(),
    })
}

fn parse_line_items(value: &Value) -> Vec<LineItem> {
    let Value::Array(items) = value else {
        warn!("line_items is not an array, dropping");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let Some(description) = obj.get("description").and_then(lenient_string) else {
                warn!("Dropping line item without description: {item}");
                return None;
            };
            Some(LineItem {
                description,
                quantity: obj.get("quantity").and_then(lenient_amount),
                unit_price: obj.get("unit_price").and_then(lenient_amount),
            })
        })
        .collect()
}

/// A non-empty trimmed string. Numbers are accepted too — models regularly
/// emit bare numbers for invoice_number.
fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// An amount, coerced from a JSON number or a numeric string.
///
/// String handling tolerates the formats models transcribe from invoices:
/// thousands separators (space, non-breaking space, or comma), a European
/// decimal comma, and a trailing currency token. Empty strings and null mean
/// "absent", not zero.
fn lenient_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            // Both separators present: the comma is a thousands separator.
            // Comma only: it is a European decimal point.
            let normalised = if cleaned.contains(',') && cleaned.contains('.') {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            };
            normalised.parse().ok()
        }
        _ => None,
    }
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() > 120 {
        let cut = trimmed
            .char_indices()
            .take_while(|&(i, _)| i < 120)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}…", &trimmed[..cut])
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str =
        r#"{"issuer":"ACME s.r.o.","vat_id":"CZ12345678","total":1500.0,"currency":"CZK","line_items":[]}"#;

    #[test]
    fn parses_bare_json() {
        let record = parse_response(MINIMAL).unwrap();
        assert_eq!(record.issuer, "ACME s.r.o.");
        assert_eq!(record.vat_id.as_deref(), Some("CZ12345678"));
        assert_eq!(record.total, 1500.0);
        assert_eq!(record.currency.as_deref(), Some("CZK"));
        assert!(record.line_items.is_empty());
    }

    #[test]
    fn fenced_json_parses_identically() {
        let fenced = format!("```json\n{MINIMAL}\n```");
        assert_eq!(parse_response(&fenced).unwrap(), parse_response(MINIMAL).unwrap());
    }

    #[test]
    fn surrounding_prose_is_ignored() {
        let wrapped = format!(
            "Here is the extracted data you asked for:\n\n{MINIMAL}\n\nLet me know if anything looks off."
        );
        assert_eq!(parse_response(&wrapped).unwrap(), parse_response(MINIMAL).unwrap());
    }

    #[test]
    fn stray_braces_in_prose_are_skipped() {
        let tricky = format!("The layout {{header, footer}} was unusual.\n{MINIMAL}");
        let record = parse_response(&tricky).unwrap();
        assert_eq!(record.issuer, "ACME s.r.o.");
    }

    #[test]
    fn braces_inside_string_values_do_not_truncate() {
        let input = r#"{"issuer":"Braces {and} Sons","total":10,"vat_id":"x","invoice_number":"1","issue_date":"x","currency":"EUR"}"#;
        let record = parse_response(input).unwrap();
        assert_eq!(record.issuer, "Braces {and} Sons");
    }

    #[test]
    fn escaped_quotes_inside_strings_handled() {
        let input = r#"{"issuer":"Quote \" Brace } Co","total":5}"#;
        let record = parse_response(input).unwrap();
        assert_eq!(record.issuer, r#"Quote " Brace } Co"#);
    }

    #[test]
    fn missing_issuer_is_schema_error() {
        let err = parse_response(r#"{"total": 100}"#).unwrap_err();
        assert!(matches!(err, ExtractError::Schema { field: "issuer" }));
    }

    #[test]
    fn empty_issuer_is_schema_error() {
        let err = parse_response(r#"{"issuer": "  ", "total": 100}"#).unwrap_err();
        assert!(matches!(err, ExtractError::Schema { field: "issuer" }));
    }

    #[test]
    fn missing_total_is_schema_error() {
        let err = parse_response(r#"{"issuer": "ACME"}"#).unwrap_err();
        assert!(matches!(err, ExtractError::Schema { field: "total" }));
    }

    #[test]
    fn no_json_at_all_is_parse_error() {
        let err = parse_response("I could not read the invoice, sorry.").unwrap_err();
        assert!(matches!(err, ExtractError::Parse { .. }));
    }

    #[test]
    fn unbalanced_json_is_parse_error() {
        let err = parse_response(r#"{"issuer": "ACME", "total": "#).unwrap_err();
        assert!(matches!(err, ExtractError::Parse { .. }));
    }

    #[test]
    fn amounts_coerced_from_strings() {
        let input = r#"{"issuer":"A","total":"1 500,50","taxable_21":"1240.08","vat_21":"260,42"}"#;
        let record = parse_response(input).unwrap();
        assert_eq!(record.total, 1500.50);
        assert_eq!(record.taxable_21, Some(1240.08));
        assert_eq!(record.vat_21, Some(260.42));
    }

    #[test]
    fn us_thousands_separator_handled() {
        let record = parse_response(r#"{"issuer":"A","total":"1,500.50"}"#).unwrap();
        assert_eq!(record.total, 1500.50);
    }

    #[test]
    fn currency_token_stripped_from_amount() {
        let record = parse_response(r#"{"issuer":"A","total":"1500 Kč"}"#).unwrap();
        assert_eq!(record.total, 1500.0);
    }

    #[test]
    fn empty_string_amount_is_absent_not_zero() {
        let record =
            parse_response(r#"{"issuer":"A","total":100,"taxable_12":""}"#).unwrap();
        assert_eq!(record.taxable_12, None);
    }

    #[test]
    fn numeric_invoice_number_accepted() {
        let record =
            parse_response(r#"{"issuer":"A","total":1,"invoice_number":2024001}"#).unwrap();
        assert_eq!(record.invoice_number.as_deref(), Some("2024001"));
    }

    #[test]
    fn partial_flag_raised_on_missing_expected_fields() {
        let record = parse_response(r#"{"issuer":"A","total":100}"#).unwrap();
        assert!(record.is_partial());

        let full = parse_response(
            r#"{"issuer":"A","total":100,"vat_id":"CZ12345678","invoice_number":"1","issue_date":"01.01.2024","currency":"CZK"}"#,
        )
        .unwrap();
        assert!(!full.is_partial());
    }

    #[test]
    fn line_items_parsed_in_order() {
        let input = r#"{"issuer":"A","total":3,"line_items":[
            {"description":"First","quantity":1,"unit_price":"1,00"},
            {"description":"Second","quantity":2}
        ]}"#;
        let record = parse_response(input).unwrap();
        assert_eq!(record.line_items.len(), 2);
        assert_eq!(record.line_items[0].description, "First");
        assert_eq!(record.line_items[0].unit_price, Some(1.0));
        assert_eq!(record.line_items[1].quantity, Some(2.0));
        assert_eq!(record.line_items[1].unit_price, None);
    }

    #[test]
    fn line_items_without_description_dropped() {
        let input = r#"{"issuer":"A","total":1,"line_items":[{"quantity":5},{"description":"Kept"}]}"#;
        let record = parse_response(input).unwrap();
        assert_eq!(record.line_items.len(), 1);
        assert_eq!(record.line_items[0].description, "Kept");
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = parse_response(MINIMAL).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let back: ExtractionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
