//! Color transform engine.
//!
//! Applies brightness, then contrast, then saturation to every pixel. The
//! order is fixed; swapping any two steps changes the output.
//!
//! ```text
//! c' = min(255, c * brightness)
//! c' = c' * contrast + 128 * (1 - contrast)
//! if saturation != 1:
//!     luma = 0.299 r' + 0.587 g' + 0.114 b'
//!     c'   = luma + (c' - luma) * saturation
//! store clamp(c', 0, 255) rounded half-to-even
//! ```
//!
//! Rows are processed in parallel with rayon. Each pixel depends only on
//! itself, so the result is identical to a sequential pass.

use super::PixelBuffer;
use super::params::AdjustmentParameters;
use rayon::prelude::*;

const LUMA_R: f64 = 0.299;
const LUMA_G: f64 = 0.587;
const LUMA_B: f64 = 0.114;

/// Return a new buffer with `params` applied. The input is never modified.
pub fn apply_color(source: &PixelBuffer, params: &AdjustmentParameters) -> PixelBuffer {
    let mut out = source.clone();
    if params.is_identity() {
        return out;
    }

    let row_len = out.width() as usize * 3;
    if row_len == 0 {
        return out;
    }

    let params = *params;
    out.par_chunks_exact_mut(row_len).for_each(|row| {
        for px in row.chunks_exact_mut(3) {
            adjust_pixel(px, &params);
        }
    });
    out
}

#[inline]
fn adjust_pixel(px: &mut [u8], params: &AdjustmentParameters) {
    let contrast_offset = 128.0 * (1.0 - params.contrast);

    let mut rgb = [px[0] as f64, px[1] as f64, px[2] as f64];
    for c in rgb.iter_mut() {
        *c = (*c * params.brightness).min(255.0);
        *c = *c * params.contrast + contrast_offset;
    }

    if params.saturation != 1.0 {
        let luma = LUMA_R * rgb[0] + LUMA_G * rgb[1] + LUMA_B * rgb[2];
        for c in rgb.iter_mut() {
            *c = luma + (*c - luma) * params.saturation;
        }
    }

    for (dst, c) in px.iter_mut().zip(rgb) {
        *dst = to_channel(c);
    }
}

/// Clamp to the 8-bit range and round half to even.
#[inline]
fn to_channel(value: f64) -> u8 {
    value.clamp(0.0, 255.0).round_ties_even() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{gradient_image, solid_image};
    use image::Rgb;

    fn params(brightness: f64, contrast: f64, saturation: f64) -> AdjustmentParameters {
        AdjustmentParameters {
            brightness,
            contrast,
            saturation,
        }
    }

    #[test]
    fn identity_parameters_leave_pixels_untouched() {
        let img = gradient_image(37, 23);
        let out = apply_color(&img, &AdjustmentParameters::default());
        assert_eq!(out, img);
    }

    #[test]
    fn brightness_scales_channels() {
        let img = solid_image(2, 2, [100, 50, 10]);
        let out = apply_color(&img, &params(2.0, 1.0, 1.0));
        assert_eq!(*out.get_pixel(0, 0), Rgb([200, 100, 20]));
    }

    #[test]
    fn brightness_clamps_before_contrast() {
        // 200 * 2 = 400 → 255, then contrast 0.5: 255*0.5 + 64 = 191.5 → 192 (ties even)
        let img = solid_image(1, 1, [200, 200, 200]);
        let out = apply_color(&img, &params(2.0, 0.5, 1.0));
        assert_eq!(*out.get_pixel(0, 0), Rgb([192, 192, 192]));
    }

    #[test]
    fn zero_contrast_flattens_to_mid_grey() {
        let img = gradient_image(16, 16);
        let out = apply_color(&img, &params(1.0, 0.0, 1.0));
        assert!(out.pixels().all(|p| *p == Rgb([128, 128, 128])));
    }

    #[test]
    fn zero_saturation_produces_grey() {
        let img = solid_image(1, 1, [255, 0, 0]);
        let out = apply_color(&img, &params(1.0, 1.0, 0.0));
        // luma = 0.299 * 255 = 76.245 → 76
        assert_eq!(*out.get_pixel(0, 0), Rgb([76, 76, 76]));
    }

    #[test]
    fn extreme_parameters_stay_in_range() {
        // Every channel is a valid u8 by construction; check the extremes saturate.
        let img = gradient_image(64, 64);
        let out = apply_color(&img, &params(3.0, 3.0, 3.0));
        assert_eq!(out.dimensions(), img.dimensions());
        assert_eq!(*out.get_pixel(63, 63), Rgb([255, 255, 255]));
        let dark = apply_color(&solid_image(1, 1, [0, 0, 0]), &params(3.0, 3.0, 3.0));
        assert_eq!(*dark.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn step_order_is_brightness_contrast_saturation() {
        // Brightness 0 then contrast 2: 0*2 + 128*(1-2) = -128 → 0.
        // Contrast first would give 100*2 - 128 = 72, then *0 = 0 as well,
        // so use a case where the order is observable:
        // brightness 0.5, contrast 2: (100*0.5)*2 - 128 = -28 → 0,
        // contrast first: (100*2 - 128)*0.5 = 36.
        let img = solid_image(1, 1, [100, 100, 100]);
        let out = apply_color(&img, &params(0.5, 2.0, 1.0));
        assert_eq!(*out.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn input_buffer_is_not_mutated() {
        let img = gradient_image(8, 8);
        let before = img.clone();
        let _ = apply_color(&img, &params(1.7, 0.4, 2.2));
        assert_eq!(img, before);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let img = gradient_image(50, 31);
        let p = params(1.3, 1.2, 0.6);
        assert_eq!(apply_color(&img, &p), apply_color(&img, &p));
    }
}
