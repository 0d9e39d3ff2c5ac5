//! Decoding incoming images and encoding previews.
//!
//! The backend pushes images as base64 text, usually wrapped in a data URL
//! (`data:image/png;base64,...`). Decoding goes base64 → bytes → `image`
//! crate → 8-bit RGB. Alpha is discarded.

use super::PixelBuffer;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed data URL: {0}")]
    DataUrl(String),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// Strip an optional `data:<mime>;base64,` prefix and return the payload.
fn base64_payload(text: &str) -> Result<&str, DecodeError> {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("data:") else {
        return Ok(text);
    };
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| DecodeError::DataUrl("missing ',' separator".into()))?;
    if !header.ends_with(";base64") {
        return Err(DecodeError::DataUrl(format!(
            "expected base64 encoding, got '{header}'"
        )));
    }
    Ok(payload)
}

/// Decode a base64 string or data URL into an RGB pixel buffer.
pub fn decode_base64_image(text: &str) -> Result<PixelBuffer, DecodeError> {
    let bytes = STANDARD.decode(base64_payload(text)?)?;
    decode_image_bytes(&bytes)
}

/// Decode raw encoded image bytes (PNG, JPEG, WebP, TIFF) into an RGB pixel buffer.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<PixelBuffer, DecodeError> {
    let img = image::load_from_memory(bytes)?;
    to_pixel_buffer(img)
}

/// Load an image file into an RGB pixel buffer.
pub fn load_image_file(path: &Path) -> Result<PixelBuffer, DecodeError> {
    let img = image::open(path)?;
    to_pixel_buffer(img)
}

fn to_pixel_buffer(img: DynamicImage) -> Result<PixelBuffer, DecodeError> {
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(DecodeError::Empty { width, height });
    }
    Ok(img.into_rgb8())
}

/// Encode a buffer as PNG bytes.
pub fn encode_png(buffer: &PixelBuffer) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Cursor::new(Vec::new());
    buffer.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Encode a buffer as a `data:image/png;base64,` URL.
pub fn encode_png_data_url(buffer: &PixelBuffer) -> Result<String, image::ImageError> {
    let png = encode_png(buffer)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::gradient_image;

    #[test]
    fn decodes_data_url() {
        let img = gradient_image(12, 7);
        let url = encode_png_data_url(&img).unwrap();
        let decoded = decode_base64_image(&url).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn decodes_bare_base64() {
        let img = gradient_image(5, 5);
        let bare = STANDARD.encode(encode_png(&img).unwrap());
        assert_eq!(decode_base64_image(&bare).unwrap(), img);
    }

    #[test]
    fn discards_alpha() {
        let rgba = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 0]));
        let mut png = Cursor::new(Vec::new());
        rgba.write_to(&mut png, ImageFormat::Png).unwrap();
        let decoded = decode_image_bytes(png.get_ref()).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(*decoded.get_pixel(0, 0), image::Rgb([10, 20, 30]));
    }

    #[test]
    fn rejects_bad_base64() {
        let err = decode_base64_image("data:image/png;base64,@@@not base64@@@").unwrap_err();
        assert!(matches!(err, DecodeError::Base64(_)));
    }

    #[test]
    fn rejects_non_base64_data_url() {
        let err = decode_base64_image("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, DecodeError::DataUrl(_)));
    }

    #[test]
    fn rejects_data_url_without_payload_separator() {
        let err = decode_base64_image("data:image/png;base64").unwrap_err();
        assert!(matches!(err, DecodeError::DataUrl(_)));
    }

    #[test]
    fn rejects_non_image_bytes() {
        let text = STANDARD.encode(b"definitely not an image");
        let err = decode_base64_image(&text).unwrap_err();
        assert!(matches!(err, DecodeError::Image(_)));
    }

    #[test]
    fn load_image_file_reads_png() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("in.png");
        let img = gradient_image(9, 4);
        std::fs::write(&path, encode_png(&img).unwrap()).unwrap();
        assert_eq!(load_image_file(&path).unwrap(), img);
    }
}
