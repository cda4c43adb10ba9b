//! End-to-end integration tests for invoice2json.
//!
//! These tests use real invoice files in `./test_cases/` and make live API
//! calls (inference provider, VAT registry). They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use invoice2json::{extract, inspect, ExtractionConfig, VatStatus};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

// ── Inspect tests (no provider, no API key) ──────────────────────────────────

#[tokio::test]
async fn test_inspect_sample_invoice() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice1.pdf"));

    let info = inspect(path.to_str().unwrap())
        .await
        .expect("inspect() should succeed");

    assert_eq!(info.kind, "pdf");
    assert!(info.page_count >= 1);
    println!("Info: {info:?}");
}

#[tokio::test]
async fn test_inspect_nonexistent() {
    let result = inspect("/definitely/not/a/real/invoice.pdf").await;
    assert!(
        result.is_err(),
        "inspect() should return Err for nonexistent file"
    );
}

// ── Live extraction (needs an API key) ───────────────────────────────────────

#[tokio::test]
async fn test_extract_sample_invoice() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice1.pdf"));

    let config = ExtractionConfig::builder()
        .validate_vat(false)
        .build()
        .unwrap();

    let output = extract(path.to_str().unwrap(), &config)
        .await
        .expect("extraction should succeed");

    assert!(!output.record.issuer.trim().is_empty(), "issuer must be set");
    assert!(output.record.total > 0.0, "total must be positive");
    assert!(output.stats.page_count >= 1);
    println!(
        "Extracted: {} — {} {} ({} in / {} out tokens)",
        output.record.issuer,
        output.record.total,
        output.record.currency.as_deref().unwrap_or("?"),
        output.stats.input_tokens,
        output.stats.output_tokens
    );
}

// ── Live VAT registry ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_registry_known_payer() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }

    let config = ExtractionConfig::default();
    let validator = invoice2json::vat::VatValidator::new(&config).unwrap();

    // ČEZ, a. s. — a large, stable, registered VAT payer.
    let status = validator.check("CZ45274649").await.unwrap();
    println!("Registry verdict: {status}");
    assert_ne!(
        status,
        VatStatus::Invalid,
        "a major registered payer must not come back invalid"
    );
}
