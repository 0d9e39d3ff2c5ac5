//! Parameter types for the adjustment pipeline.
//!
//! These structs describe *what* to do to a buffer, not *how*. The session
//! owns one of each and mutates them from user input; the engines in
//! [`color`](super::color) and [`geometry`](super::geometry) read them.
//!
//! ## Types
//!
//! - [`AdjustmentParameters`] — brightness, contrast, saturation multipliers (0–3, default 1.0).
//! - [`Adjustment`] — names one of the three multipliers.
//! - [`GeometrySpec`] — target width/height (0 = derive), aspect lock, crop anchor.
//! - [`CropAnchor`] — one of nine named positions for the crop window.
//! - [`Resample`] — filter used when scaling the cropped window.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest accepted multiplier.
pub const MIN_MULTIPLIER: f64 = 0.0;
/// Highest accepted multiplier.
pub const MAX_MULTIPLIER: f64 = 3.0;

/// One of the three color multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    Brightness,
    Contrast,
    Saturation,
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Adjustment::Brightness => "brightness",
            Adjustment::Contrast => "contrast",
            Adjustment::Saturation => "saturation",
        })
    }
}

/// Color multipliers applied by [`apply_color`](super::color::apply_color).
///
/// All three default to 1.0, which is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdjustmentParameters {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
}

impl Default for AdjustmentParameters {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }
}

impl AdjustmentParameters {
    /// Set one multiplier, clamped to `[0, 3]`.
    ///
    /// Returns `false` (and leaves the value untouched) for NaN or infinity.
    pub fn set(&mut self, which: Adjustment, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        let value = value.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);
        match which {
            Adjustment::Brightness => self.brightness = value,
            Adjustment::Contrast => self.contrast = value,
            Adjustment::Saturation => self.saturation = value,
        }
        true
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// Named anchor for positioning the crop window inside the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropAnchor {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl CropAnchor {
    pub const ALL: [CropAnchor; 9] = [
        CropAnchor::Center,
        CropAnchor::Top,
        CropAnchor::Bottom,
        CropAnchor::Left,
        CropAnchor::Right,
        CropAnchor::TopLeft,
        CropAnchor::TopRight,
        CropAnchor::BottomLeft,
        CropAnchor::BottomRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CropAnchor::Center => "center",
            CropAnchor::Top => "top",
            CropAnchor::Bottom => "bottom",
            CropAnchor::Left => "left",
            CropAnchor::Right => "right",
            CropAnchor::TopLeft => "top-left",
            CropAnchor::TopRight => "top-right",
            CropAnchor::BottomLeft => "bottom-left",
            CropAnchor::BottomRight => "bottom-right",
        }
    }
}

impl fmt::Display for CropAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CropAnchor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CropAnchor::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = CropAnchor::ALL.iter().map(|a| a.as_str()).collect();
                format!("unknown crop anchor '{s}', expected one of: {}", names.join(", "))
            })
    }
}

/// Output geometry requested by the user.
///
/// A target dimension of 0 means "derive from the source": see
/// [`resolve_target_dimensions`](super::calculations::resolve_target_dimensions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeometrySpec {
    pub target_width: u32,
    pub target_height: u32,
    pub keep_aspect: bool,
    pub anchor: CropAnchor,
}

impl Default for GeometrySpec {
    fn default() -> Self {
        Self {
            target_width: 0,
            target_height: 0,
            keep_aspect: true,
            anchor: CropAnchor::Center,
        }
    }
}

/// Resampling filter for the scale step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resample {
    Nearest,
    /// Bilinear. Closest to a browser's smoothed stretch-blit.
    #[default]
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl Resample {
    pub const ALL: [Resample; 4] = [
        Resample::Nearest,
        Resample::Triangle,
        Resample::CatmullRom,
        Resample::Lanczos3,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resample::Nearest => "nearest",
            Resample::Triangle => "triangle",
            Resample::CatmullRom => "catmull-rom",
            Resample::Lanczos3 => "lanczos3",
        }
    }

    pub fn filter(self) -> FilterType {
        match self {
            Resample::Nearest => FilterType::Nearest,
            Resample::Triangle => FilterType::Triangle,
            Resample::CatmullRom => FilterType::CatmullRom,
            Resample::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl FromStr for Resample {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resample::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Resample::ALL.iter().map(|r| r.as_str()).collect();
                format!("unknown resample filter '{s}', expected one of: {}", names.join(", "))
            })
    }
}
