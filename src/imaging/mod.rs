//! Image processing — pure Rust, no system libraries.
//!
//! | Step | Module / function |
//! |---|---|
//! | **Decode** | [`codec::decode_base64_image`] (`base64` + `image`) |
//! | **Color** | [`color::apply_color`] (brightness → contrast → saturation, rayon rows) |
//! | **Geometry** | [`geometry::apply_geometry`] (crop-to-aspect at an anchor, then resize) |
//! | **Fingerprint** | [`fingerprint`] (SHA-256 over dimensions + pixels) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing the adjustments
//! - **Engines**: color and geometry, each a pure function buffer → new buffer
//! - **Codec**: base64 / data-URL decoding and PNG encoding
//!
//! [`render`] is the preview pipeline: it always starts from the untouched
//! source and runs color, then geometry.

pub mod calculations;
pub mod codec;
pub mod color;
pub mod geometry;
mod params;

pub use calculations::{
    CropWindow, GeometryPlan, MAX_DIMENSION, bound_dimensions, linked_dimension, plan_geometry,
    resolve_target_dimensions,
};
pub use codec::{DecodeError, decode_base64_image, decode_image_bytes, encode_png};
pub use color::apply_color;
pub use geometry::{GeometryOptions, apply_geometry};
pub use params::{
    Adjustment, AdjustmentParameters, CropAnchor, GeometrySpec, MAX_MULTIPLIER, MIN_MULTIPLIER,
    Resample,
};

use sha2::{Digest, Sha256};

/// An 8-bit RGB image. Dimensions are fixed at creation.
pub type PixelBuffer = image::RgbImage;

/// Run the full preview pipeline on a source buffer.
pub fn render(
    source: &PixelBuffer,
    params: &AdjustmentParameters,
    geometry: &GeometrySpec,
    options: &GeometryOptions,
) -> PixelBuffer {
    let colored = apply_color(source, params);
    apply_geometry(&colored, geometry, options)
}

/// Flatten to RGBA bytes with full opacity, row-major.
pub fn to_rgba_bytes(buffer: &PixelBuffer) -> Vec<u8> {
    let mut out = Vec::with_capacity(buffer.as_raw().len() / 3 * 4);
    for px in buffer.pixels() {
        out.extend_from_slice(&[px[0], px[1], px[2], 255]);
    }
    out
}

/// SHA-256 of a buffer's dimensions and pixels, as a hex string.
pub fn fingerprint(buffer: &PixelBuffer) -> String {
    let mut hasher = Sha256::new();
    hasher.update(buffer.width().to_le_bytes());
    hasher.update(buffer.height().to_le_bytes());
    hasher.update(buffer.as_raw());
    format!("{:x}", hasher.finalize())
}
