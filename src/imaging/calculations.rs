//! Pure calculation functions for output geometry.
//!
//! All functions here are pure and testable without any I/O or images.
//! Dimensions are `(width, height)` tuples throughout.

use super::params::{CropAnchor, GeometrySpec};

/// Default tolerance when comparing aspect ratios.
pub const ASPECT_TOLERANCE: f64 = 0.01;

/// Default upper bound for either output side.
pub const MAX_DIMENSION: u32 = 8192;

/// Derive the other dimension from one set dimension, preserving the source aspect.
///
/// `set` is the requested size along one axis, `source_set` the source size
/// along the same axis, and `source_other` the source size along the other.
///
/// # Examples
/// ```
/// # use live_adjust::imaging::linked_dimension;
/// // 200x100 source, width set to 100 → height 50
/// assert_eq!(linked_dimension(100, 200, 100), 50);
/// ```
pub fn linked_dimension(set: u32, source_set: u32, source_other: u32) -> u32 {
    if source_set == 0 {
        return set.max(1);
    }
    let derived = (set as f64 * source_other as f64 / source_set as f64).round() as u32;
    derived.max(1)
}

/// Resolve the final output dimensions from a [`GeometrySpec`].
///
/// - Both targets 0 → the source dimensions.
/// - One target 0 with aspect lock → derived to preserve the source aspect.
/// - One target 0 without aspect lock → that axis keeps the source size.
/// - Both set → used as given.
pub fn resolve_target_dimensions(source: (u32, u32), spec: &GeometrySpec) -> (u32, u32) {
    let (src_w, src_h) = source;
    match (spec.target_width, spec.target_height) {
        (0, 0) => (src_w, src_h),
        (0, h) if spec.keep_aspect => (linked_dimension(h, src_h, src_w), h),
        (0, h) => (src_w, h),
        (w, 0) if spec.keep_aspect => (w, linked_dimension(w, src_w, src_h)),
        (w, 0) => (w, src_h),
        (w, h) => (w, h),
    }
}

/// Scale `target` down so neither side exceeds `max`, keeping its aspect.
///
/// Targets already inside the bound are returned unchanged. Each side of a
/// scaled target is rounded and kept in `[1, max]`.
///
/// # Examples
/// ```
/// # use live_adjust::imaging::bound_dimensions;
/// assert_eq!(bound_dimensions((64, 2048), 64), (2, 64));
/// assert_eq!(bound_dimensions((640, 480), 8192), (640, 480));
/// ```
pub fn bound_dimensions(target: (u32, u32), max: u32) -> (u32, u32) {
    let max = max.max(1);
    let longest = target.0.max(target.1);
    if longest <= max {
        return target;
    }
    let scale = max as f64 / longest as f64;
    let fit = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, max);
    (fit(target.0), fit(target.1))
}

/// Whether two aspect ratios differ by more than `tolerance`.
pub fn needs_crop(source: (u32, u32), target: (u32, u32), tolerance: f64) -> bool {
    (aspect(source) - aspect(target)).abs() > tolerance
}

fn aspect((w, h): (u32, u32)) -> f64 {
    w as f64 / h.max(1) as f64
}

/// Size of the largest window with the target's aspect ratio that fits the source.
///
/// Always crops, never pads. A wider target keeps the full source width and
/// crops height; a taller (or equal) target keeps the full height and crops width.
pub fn calculate_crop_size(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let target_aspect = aspect(target);

    if target_aspect > aspect(source) {
        let h = (src_w as f64 / target_aspect).round() as u32;
        (src_w, h.clamp(1, src_h))
    } else {
        let w = (src_h as f64 * target_aspect).round() as u32;
        (w.clamp(1, src_w), src_h)
    }
}

/// Top-left corner of a `crop`-sized window placed at `anchor` inside `source`.
///
/// Center splits the remainder evenly (rounding down); edge anchors sit flush
/// against their edge with the other axis centered; corner anchors are flush
/// on both axes. Both coordinates are clamped to `[0, source - crop]`.
pub fn calculate_crop_origin(source: (u32, u32), crop: (u32, u32), anchor: CropAnchor) -> (u32, u32) {
    let spare_x = source.0.saturating_sub(crop.0);
    let spare_y = source.1.saturating_sub(crop.1);
    let (mid_x, mid_y) = (spare_x / 2, spare_y / 2);

    let (x, y) = match anchor {
        CropAnchor::Center => (mid_x, mid_y),
        CropAnchor::Top => (mid_x, 0),
        CropAnchor::Bottom => (mid_x, spare_y),
        CropAnchor::Left => (0, mid_y),
        CropAnchor::Right => (spare_x, mid_y),
        CropAnchor::TopLeft => (0, 0),
        CropAnchor::TopRight => (spare_x, 0),
        CropAnchor::BottomLeft => (0, spare_y),
        CropAnchor::BottomRight => (spare_x, spare_y),
    };
    (x.min(spare_x), y.min(spare_y))
}

/// A rectangular region of the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The resolved geometry steps for one source/spec pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryPlan {
    pub source: (u32, u32),
    pub target: (u32, u32),
    /// `None` when the aspect ratios already match.
    pub crop: Option<CropWindow>,
}

impl GeometryPlan {
    /// Size of the buffer entering the scale step.
    pub fn scale_input(&self) -> (u32, u32) {
        self.crop
            .map(|c| (c.width, c.height))
            .unwrap_or(self.source)
    }

    /// Whether the scale step can be skipped.
    pub fn needs_scale(&self) -> bool {
        self.scale_input() != self.target
    }

    /// No crop and no scale: output equals input.
    pub fn is_identity(&self) -> bool {
        self.crop.is_none() && !self.needs_scale()
    }
}

/// Plan a geometry transform without executing it.
///
/// The resolved target is bounded by `max_dimension` before any crop is
/// computed, so a derived side can never exceed it.
pub fn plan_geometry(
    source: (u32, u32),
    spec: &GeometrySpec,
    tolerance: f64,
    max_dimension: u32,
) -> GeometryPlan {
    let target = bound_dimensions(resolve_target_dimensions(source, spec), max_dimension);

    let crop = needs_crop(source, target, tolerance).then(|| {
        let (width, height) = calculate_crop_size(source, target);
        let (x, y) = calculate_crop_origin(source, (width, height), spec.anchor);
        CropWindow {
            x,
            y,
            width,
            height,
        }
    });

    GeometryPlan {
        source,
        target,
        crop,
    }
}
