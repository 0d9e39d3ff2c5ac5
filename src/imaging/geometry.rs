//! Geometry transform engine: crop-to-aspect, then scale.
//!
//! The dimension math lives in [`calculations`](super::calculations); this
//! module executes a [`GeometryPlan`] against pixels.

use super::PixelBuffer;
use super::calculations::{ASPECT_TOLERANCE, GeometryPlan, MAX_DIMENSION, plan_geometry};
use super::params::{GeometrySpec, Resample};
use image::imageops;

/// Tuning knobs for the geometry engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryOptions {
    pub aspect_tolerance: f64,
    pub resample: Resample,
    /// Upper bound for either output side, applied after the target is resolved.
    pub max_dimension: u32,
}

impl Default for GeometryOptions {
    fn default() -> Self {
        Self {
            aspect_tolerance: ASPECT_TOLERANCE,
            resample: Resample::default(),
            max_dimension: MAX_DIMENSION,
        }
    }
}

/// Return a new buffer cropped to the target aspect and scaled to the target size.
pub fn apply_geometry(
    source: &PixelBuffer,
    spec: &GeometrySpec,
    options: &GeometryOptions,
) -> PixelBuffer {
    let plan = plan_geometry(
        source.dimensions(),
        spec,
        options.aspect_tolerance,
        options.max_dimension,
    );
    execute_plan(source, &plan, options.resample)
}

/// Execute a precomputed plan.
pub fn execute_plan(source: &PixelBuffer, plan: &GeometryPlan, resample: Resample) -> PixelBuffer {
    if plan.is_identity() {
        return source.clone();
    }

    let cropped = match plan.crop {
        Some(c) => imageops::crop_imm(source, c.x, c.y, c.width, c.height).to_image(),
        None => source.clone(),
    };

    if !plan.needs_scale() {
        return cropped;
    }

    let (w, h) = plan.target;
    imageops::resize(&cropped, w, h, resample.filter())
}
