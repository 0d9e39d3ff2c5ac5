//! Shared test utilities for the live-adjust test suite.
//!
//! Builders for small deterministic images and the encoded forms the backend
//! sends them in.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let img = gradient_image(64, 32);
//! let url = png_data_url(&img);
//! session.ingest(&url, now).unwrap();
//! ```

use crate::imaging::PixelBuffer;
use crate::imaging::codec::encode_png_data_url;
use image::Rgb;

// =========================================================================
// Image builders
// =========================================================================

/// Red ramps left→right, green ramps top→bottom, blue fixed at 128.
/// The last column has red 255 and the last row green 255.
pub fn gradient_image(width: u32, height: u32) -> PixelBuffer {
    let ramp = |pos: u32, len: u32| -> u8 {
        if len <= 1 { 0 } else { (pos * 255 / (len - 1)) as u8 }
    };
    PixelBuffer::from_fn(width, height, |x, y| Rgb([ramp(x, width), ramp(y, height), 128]))
}

/// Every pixel the same color.
pub fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> PixelBuffer {
    PixelBuffer::from_pixel(width, height, Rgb(rgb))
}

// =========================================================================
// Encoding
// =========================================================================

/// PNG-encode a buffer as a `data:image/png;base64,` URL.
pub fn png_data_url(buffer: &PixelBuffer) -> String {
    encode_png_data_url(buffer).unwrap()
}
