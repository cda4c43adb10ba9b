//! Input resolution: load an invoice file and classify it for the renderer.
//!
//! Classification is by extension with a magic-byte check for PDFs (`%PDF`),
//! so a mislabelled or truncated file produces a meaningful error here rather
//! than a pdfium crash two stages later. Raster formats are only sniffed at
//! decode time — the `image` crate does that better than extension guessing.

use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extensions the pipeline accepts, lower-case.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "gif", "webp"];

/// What the renderer will do with the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Rasterise page one via pdfium.
    Pdf,
    /// Decode directly with the `image` crate.
    Image,
}

/// A loaded invoice document. Immutable once loaded; the page count is
/// discovered by the renderer (pdfium owns the PDF structure).
#[derive(Debug)]
pub struct InvoiceDocument {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
}

/// Whether the path has a supported invoice extension.
pub fn is_supported(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Load and classify a single invoice file.
pub async fn load_document(path: impl AsRef<Path>) -> Result<InvoiceDocument, ExtractError> {
    let path = path.as_ref().to_path_buf();

    let extension = extension_of(&path).unwrap_or_default();
    let kind = match extension.as_str() {
        "pdf" => DocumentKind::Pdf,
        ext if SUPPORTED_EXTENSIONS.contains(&ext) => DocumentKind::Image,
        _ => {
            return Err(ExtractError::UnsupportedFormat {
                path,
                extension,
            })
        }
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied { path })
        }
        Err(_) => return Err(ExtractError::FileNotFound { path }),
    };

    if kind == DocumentKind::Pdf && !bytes.starts_with(b"%PDF") {
        return Err(ExtractError::CorruptDocument {
            path,
            detail: format!(
                "missing %PDF header, first bytes: {:?}",
                &bytes[..bytes.len().min(4)]
            ),
        });
    }

    debug!("Loaded {} ({} bytes, {:?})", path.display(), bytes.len(), kind);

    Ok(InvoiceDocument { path, bytes, kind })
}

/// Expand a mix of files and directories into a sorted list of invoice paths.
///
/// Directories are scanned one level deep for supported extensions; explicit
/// file arguments are kept as-is so an unsupported one fails loudly later
/// instead of being silently skipped.
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ExtractError> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let entries = std::fs::read_dir(input).map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    ExtractError::PermissionDenied {
                        path: input.clone(),
                    }
                } else {
                    ExtractError::FileNotFound {
                        path: input.clone(),
                    }
                }
            })?;

            let mut found: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| p.is_file() && is_supported(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }

    Ok(files)
}
