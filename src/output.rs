//! CLI output formatting.
//!
//! Every formatter is a pure function returning lines, so tests can check the
//! exact text without capturing stdout; `print_*` wrappers do the printing.
//!
//! # Output Format
//!
//! ## Session
//!
//! ```text
//! [7] Image received: 640x480
//! [7] Preview: 320x240 (sha256 3f2a9c1e…)
//! [7] Warning: adjustments not applied yet; they will be applied automatically
//! [7] Auto-applying in a moment
//! [7] Submitting 320x240
//! [7] Applied
//! ```
//!
//! ## Adjust
//!
//! ```text
//! photo.png → out.png
//!     Source: 640x480
//!     Output: 320x240 (crop 480x480 at 80,0)
//!     Color: brightness 1.20, contrast 1.00, saturation 0.80
//!     SHA-256: 3f2a9c1e…
//! ```

use crate::imaging::{AdjustmentParameters, GeometryPlan};
use crate::runtime::SessionEvent;
use std::path::Path;

/// Number of fingerprint hex digits shown in short form.
const SHORT_FINGERPRINT: usize = 8;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn short_fingerprint(fingerprint: &str) -> String {
    match fingerprint.get(..SHORT_FINGERPRINT) {
        Some(prefix) if fingerprint.len() > SHORT_FINGERPRINT => format!("{prefix}…"),
        _ => fingerprint.to_string(),
    }
}

// ============================================================================
// Session
// ============================================================================

/// Format one session notification.
pub fn format_session_event(node_id: &str, event: &SessionEvent) -> Vec<String> {
    let body = match event {
        SessionEvent::Ingested { width, height } => format!("Image received: {width}x{height}"),
        SessionEvent::IngestFailed { reason } => format!("Image rejected: {reason}"),
        SessionEvent::PreviewRendered {
            width,
            height,
            fingerprint,
        } => format!(
            "Preview: {width}x{height} (sha256 {})",
            short_fingerprint(fingerprint)
        ),
        SessionEvent::IdleWarning => {
            "Warning: adjustments not applied yet; they will be applied automatically".to_string()
        }
        SessionEvent::AutoApplyScheduled => "Auto-applying in a moment".to_string(),
        SessionEvent::SubmitStarted { width, height } => format!("Submitting {width}x{height}"),
        SessionEvent::Applied => "Applied".to_string(),
        SessionEvent::SubmitFailed { reason } => format!("Apply failed: {reason} (submit again to retry)"),
        SessionEvent::SubmitRejected { reason } => format!("Not submitted: {reason}"),
        SessionEvent::SubmitIgnored => "Submit ignored: already submitting".to_string(),
        SessionEvent::TornDown => "Session closed".to_string(),
    };
    vec![format!("[{node_id}] {body}")]
}

pub fn print_session_event(node_id: &str, event: &SessionEvent) {
    for line in format_session_event(node_id, event) {
        println!("{}", line);
    }
}

// ============================================================================
// Adjust
// ============================================================================

/// Format the result of the offline `adjust` command.
pub fn format_adjust_output(
    input: &Path,
    output: &Path,
    params: &AdjustmentParameters,
    plan: &GeometryPlan,
    fingerprint: &str,
) -> Vec<String> {
    let mut lines = vec![format!("{} → {}", input.display(), output.display())];
    let (sw, sh) = plan.source;
    let (tw, th) = plan.target;
    lines.push(format!("{}Source: {sw}x{sh}", indent(1)));
    let geometry = match (plan.is_identity(), plan.crop) {
        (true, _) => "unchanged".to_string(),
        (false, Some(crop)) => format!(
            "{tw}x{th} (crop {}x{} at {},{})",
            crop.width, crop.height, crop.x, crop.y
        ),
        (false, None) => format!("{tw}x{th}"),
    };
    lines.push(format!("{}Output: {geometry}", indent(1)));
    if params.is_identity() {
        lines.push(format!("{}Color: unchanged", indent(1)));
    } else {
        lines.push(format!(
            "{}Color: brightness {:.2}, contrast {:.2}, saturation {:.2}",
            indent(1),
            params.brightness,
            params.contrast,
            params.saturation
        ));
    }
    lines.push(format!("{}SHA-256: {}", indent(1), short_fingerprint(fingerprint)));
    lines
}

pub fn print_adjust_output(
    input: &Path,
    output: &Path,
    params: &AdjustmentParameters,
    plan: &GeometryPlan,
    fingerprint: &str,
) {
    for line in format_adjust_output(input, output, params, plan, fingerprint) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{CropAnchor, GeometrySpec, MAX_DIMENSION, plan_geometry};

    const FP: &str = "3f2a9c1e0b7d4e5f3f2a9c1e0b7d4e5f3f2a9c1e0b7d4e5f3f2a9c1e0b7d4e5f";

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    #[test]
    fn short_fingerprint_truncates() {
        assert_eq!(short_fingerprint(FP), "3f2a9c1e…");
        assert_eq!(short_fingerprint("abc"), "abc");
    }

    // =========================================================================
    // Session events
    // =========================================================================

    #[test]
    fn session_lines_are_prefixed_with_node() {
        let lines = format_session_event("12", &SessionEvent::Ingested { width: 640, height: 480 });
        assert_eq!(lines, vec!["[12] Image received: 640x480"]);
    }

    #[test]
    fn preview_line_shows_short_fingerprint() {
        let lines = format_session_event(
            "1",
            &SessionEvent::PreviewRendered {
                width: 10,
                height: 5,
                fingerprint: FP.into(),
            },
        );
        assert_eq!(lines, vec!["[1] Preview: 10x5 (sha256 3f2a9c1e…)"]);
    }

    #[test]
    fn failure_line_carries_reason_and_retry_hint() {
        let lines = format_session_event(
            "1",
            &SessionEvent::SubmitFailed {
                reason: "backend returned HTTP 500".into(),
            },
        );
        assert!(lines[0].contains("HTTP 500"));
        assert!(lines[0].contains("retry"));
    }

    #[test]
    fn rejected_and_ignored_are_distinct() {
        let rejected = format_session_event(
            "1",
            &SessionEvent::SubmitRejected {
                reason: "this image has already been applied".into(),
            },
        );
        let ignored = format_session_event("1", &SessionEvent::SubmitIgnored);
        assert_ne!(rejected, ignored);
        assert!(rejected[0].contains("already been applied"));
    }

    // =========================================================================
    // Adjust
    // =========================================================================

    #[test]
    fn adjust_output_with_crop() {
        let spec = GeometrySpec {
            target_width: 50,
            target_height: 100,
            keep_aspect: false,
            anchor: CropAnchor::Left,
        };
        let plan = plan_geometry((100, 100), &spec, 0.01, MAX_DIMENSION);
        let params = AdjustmentParameters {
            brightness: 1.2,
            contrast: 1.0,
            saturation: 0.8,
        };
        let lines = format_adjust_output(
            Path::new("in.png"),
            Path::new("out.png"),
            &params,
            &plan,
            FP,
        );
        assert_eq!(
            lines,
            vec![
                "in.png → out.png",
                "    Source: 100x100",
                "    Output: 50x100 (crop 50x100 at 0,0)",
                "    Color: brightness 1.20, contrast 1.00, saturation 0.80",
                "    SHA-256: 3f2a9c1e…",
            ]
        );
    }

    #[test]
    fn adjust_output_identity() {
        let plan = plan_geometry((20, 10), &GeometrySpec::default(), 0.01, MAX_DIMENSION);
        let lines = format_adjust_output(
            Path::new("a.png"),
            Path::new("b.png"),
            &AdjustmentParameters::default(),
            &plan,
            "abcd",
        );
        assert_eq!(lines[2], "    Output: unchanged");
        assert_eq!(lines[3], "    Color: unchanged");
    }
}
