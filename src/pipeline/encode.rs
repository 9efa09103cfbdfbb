//! Image encoding for the recognizers.
//!
//! Tesseract reads a PNG file; vision APIs take the same PNG as a base64
//! data URI. PNG is lossless, and JPEG artefacts around glyph edges measurably
//! hurt OCR accuracy on rendered text.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} page → {} PNG bytes", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Encode a rendered page as a base64 PNG ready for a vision API.
///
/// `detail: "high"` lets GPT-4-class models tile the image instead of
/// reading a single downscaled overview, which loses small print.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let b64 = STANDARD.encode(encode_png(img)?);
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
