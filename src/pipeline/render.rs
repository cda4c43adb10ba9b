//! First-page rasterisation: PDF via pdfium, raster images via `image`.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking thread pool
//! so Tokio worker threads do not stall during CPU-heavy rendering.
//!
//! ## Why cap pixels?
//!
//! `max_rendered_pixels` caps the longest edge regardless of the physical
//! page size, keeping memory bounded and landing in the image-size sweet spot
//! for vision models. Oversized raster inputs are downscaled to the same cap
//! so a phone photo and a rendered PDF page hit the API at comparable sizes.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::input::{DocumentKind, InvoiceDocument};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The first page of a document, rasterised, plus the discovered page count.
#[derive(Debug)]
pub struct RenderedPage {
    pub image: DynamicImage,
    pub page_count: usize,
}

/// Rasterise the first page of a loaded document.
pub async fn render_first_page(
    document: &InvoiceDocument,
    config: &ExtractionConfig,
) -> Result<RenderedPage, ExtractError> {
    let max_pixels = config.max_rendered_pixels;

    match document.kind {
        DocumentKind::Pdf => {
            let path = document.path.clone();
            let bytes = document.bytes.clone();

            tokio::task::spawn_blocking(move || render_pdf_blocking(&path, &bytes, max_pixels))
                .await
                .map_err(|e| ExtractError::Internal(format!("Render task panicked: {e}")))?
        }
        DocumentKind::Image => decode_image(&document.path, &document.bytes, max_pixels),
    }
}

/// Blocking implementation of PDF first-page rendering.
fn render_pdf_blocking(
    path: &Path,
    bytes: &[u8],
    max_pixels: u32,
) -> Result<RenderedPage, ExtractError> {
    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{e:?}")))?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ExtractError::CorruptDocument {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    if page_count == 0 {
        return Err(ExtractError::EmptyDocument {
            path: path.to_path_buf(),
        });
    }
    debug!("PDF loaded: {} pages, rendering page 1", page_count);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let page = pages.get(0).map_err(|e| ExtractError::RenderFailed {
        path: path.to_path_buf(),
        detail: format!("{e:?}"),
    })?;

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ExtractError::RenderFailed {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let image = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());

    Ok(RenderedPage { image, page_count })
}

/// Decode a raster invoice and cap its longest edge.
fn decode_image(
    path: &Path,
    bytes: &[u8],
    max_pixels: u32,
) -> Result<RenderedPage, ExtractError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| ExtractError::CorruptDocument {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let image = if decoded.width().max(decoded.height()) > max_pixels {
        debug!(
            "Downscaling {}x{} image to fit {} px",
            decoded.width(),
            decoded.height(),
            max_pixels
        );
        decoded.thumbnail(max_pixels, max_pixels)
    } else {
        decoded
    };

    Ok(RenderedPage {
        image,
        page_count: 1,
    })
}

/// Basic facts about a document, without any inference.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub kind: &'static str,
    pub page_count: usize,
}

/// Report a document's kind and page count. No API key needed.
pub async fn inspect_document(document: &InvoiceDocument) -> Result<DocumentInfo, ExtractError> {
    let (kind, page_count) = match document.kind {
        DocumentKind::Image => ("image", 1),
        DocumentKind::Pdf => {
            let path = document.path.clone();
            let bytes = document.bytes.clone();
            let count = tokio::task::spawn_blocking(move || page_count_blocking(&path, &bytes))
                .await
                .map_err(|e| ExtractError::Internal(format!("Inspect task panicked: {e}")))??;
            ("pdf", count)
        }
    };

    Ok(DocumentInfo {
        path: document.path.clone(),
        kind,
        page_count,
    })
}

fn page_count_blocking(path: &Path, bytes: &[u8]) -> Result<usize, ExtractError> {
    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{e:?}")))?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ExtractError::CorruptDocument {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    Ok(document.pages().len() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([255, 255, 255, 255]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn decode_small_image_untouched() {
        let page = decode_image(Path::new("scan.png"), &png_bytes(100, 60), 2048).unwrap();
        assert_eq!(page.page_count, 1);
        assert_eq!((page.image.width(), page.image.height()), (100, 60));
    }

    #[test]
    fn decode_downscales_oversized_image() {
        let page = decode_image(Path::new("scan.png"), &png_bytes(1200, 600), 512).unwrap();
        assert!(page.image.width() <= 512);
        assert!(page.image.height() <= 512);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_image(Path::new("scan.png"), b"garbage", 2048).unwrap_err();
        assert!(matches!(err, ExtractError::CorruptDocument { .. }));
    }
}
