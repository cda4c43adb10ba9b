//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch rendering backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ inference ──▶ parse ──▶ write
//! (path)    (pdfium/    (base64)   (VLM call,    (JSON →   (atomic
//!            image)                 retries)      record)   <stem>.json)
//! ```
//!
//! 1. [`input`]     — load the file, classify PDF vs raster image
//! 2. [`render`]    — rasterise the first page; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`encode`]    — PNG-encode and base64-wrap the page for the request body
//! 4. [`inference`] — drive the provider call with retry/backoff; the only
//!    stage with network I/O on the extraction path
//! 5. [`parse`]     — locate and validate the JSON object in the model reply
//! 6. [`write`]     — serialise the record to `<stem>.json`, atomically
//!
//! The optional VAT-registry lookup ([`crate::vat`]) sits between parse and
//! write but lives outside this module — it is a collaborator on the side,
//! not a pipeline stage every document passes through.

pub mod encode;
pub mod inference;
pub mod input;
pub mod parse;
pub mod render;
pub mod write;
