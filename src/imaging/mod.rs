//! Image handling - provider payload decoding, PNG re-encoding and placeholders

pub mod base64;
pub mod placeholder;

use image::{DynamicImage, ImageError, ImageFormat};
use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

pub const PNG_MIME: &str = "image/png";

/// A decoded image ready to hand to a renderer or download button
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagePayload {
    /// PNG encoded bytes
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    /// Format the provider actually sent, when recognisable
    pub source_format: Option<&'static str>,
}

/// Decode whatever bitmap a provider returned and normalise it to PNG.
///
/// PNG input is validated by decoding and passed through untouched; every
/// other format is re-encoded.
pub fn normalize_to_png(data: &[u8]) -> Result<ImagePayload, ImageError> {
    let source_format = detect_image_format(data);
    let decoded = image::load_from_memory(data)?;

    let bytes = if source_format == Some("png") {
        data.to_vec()
    } else {
        encode_png(&decoded)?
    };

    debug!(
        source_format = source_format.unwrap_or("unknown"),
        width = decoded.width(),
        height = decoded.height(),
        size = bytes.len(),
        "Decoded provider image"
    );

    Ok(ImagePayload {
        bytes,
        mime_type: PNG_MIME,
        width: decoded.width(),
        height: decoded.height(),
        source_format,
    })
}

/// Encode an image as PNG
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Detect image format from binary data using magic bytes
pub fn detect_image_format(data: &[u8]) -> Option<&'static str> {
    if data.len() < 8 {
        return None;
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("png");
    }

    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }

    // GIF: GIF87a or GIF89a
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("gif");
    }

    // WebP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("webp");
    }

    // BMP: BM
    if data.starts_with(b"BM") {
        return Some("bmp");
    }

    None
}
