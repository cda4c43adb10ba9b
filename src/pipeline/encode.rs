//! Image encoding: `DynamicImage` → base64 PNG wrapped in [`EncodedPage`].
//!
//! Vision APIs accept images as base64 payloads embedded in the JSON request
//! body. PNG is chosen over JPEG because it is lossless — text crispness
//! matters far more than file size when the model has to read 8-point digits
//! in a VAT summary table.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// A rendered page ready for an inference request body.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    /// Base64-encoded image bytes (no data-URL prefix).
    pub data: String,
    pub mime_type: &'static str,
}

impl EncodedPage {
    /// The `data:` URL form used by OpenAI-style APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Encode a rasterised page as a base64 PNG ready for the inference API.
pub fn encode_page(img: &DynamicImage) -> Result<EncodedPage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());

    Ok(EncodedPage {
        data: b64,
        mime_type: "image/png",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let page = encode_page(&img).expect("encode should succeed");
        assert_eq!(page.mime_type, "image/png");
        assert!(!page.data.is_empty());
        // Verify it's valid base64
        let decoded = STANDARD.decode(&page.data).expect("valid base64");
        assert!(!decoded.is_empty());
    }

    #[test]
    fn data_url_has_prefix() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])));
        let page = encode_page(&img).unwrap();
        assert!(page.data_url().starts_with("data:image/png;base64,"));
    }
}
