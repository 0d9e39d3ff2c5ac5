//! Service configuration module.
//!
//! Handles loading, validating, and merging `live-adjust.toml`. Stock defaults
//! are the base layer; a user config file overrides any subset of keys.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [backend]
//! base_url = "http://127.0.0.1:8188"
//! apply_path = "/dapao_toolbox/realtime_image_adjust/apply"
//! request_timeout_secs = 30
//!
//! [session]
//! update_event = "realtime_image_adjust_update"
//! warn_after_secs = 20        # Idle warning
//! auto_apply_after_secs = 40  # Idle auto-apply
//! auto_apply_grace_ms = 1000  # Delay between auto-apply notice and submit
//! drag_throttle_ms = 50       # Preview interval while dragging a slider
//!
//! [geometry]
//! max_dimension = 8192
//! aspect_tolerance = 0.01
//! resample = "triangle"       # nearest | triangle | catmull-rom | lanczos3
//!
//! [processing]
//! max_processes = 4           # Color pass workers (omit for auto = CPU cores)
//!
//! [logging]
//! filter = "info"             # Overridden by RUST_LOG
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse — override just the values you want:
//!
//! ```toml
//! [backend]
//! base_url = "http://10.0.0.5:8188"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{GeometryOptions, Resample};
use crate::session::SessionSettings;
use crate::timer::EscalationTimings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "live-adjust.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `live-adjust.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdjustConfig {
    /// Where adjusted images are submitted.
    pub backend: BackendConfig,
    /// Event name and idle timer settings.
    pub session: SessionConfig,
    /// Resize limits and resampling.
    pub geometry: GeometryConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Log filter used when `RUST_LOG` is unset.
    pub logging: LoggingConfig,
}

impl AdjustConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let backend = &self.backend;
        if !(backend.base_url.starts_with("http://") || backend.base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(
                "backend.base_url must start with http:// or https://".into(),
            ));
        }
        if !backend.apply_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "backend.apply_path must start with '/'".into(),
            ));
        }
        if backend.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "backend.request_timeout_secs must be at least 1".into(),
            ));
        }
        let session = &self.session;
        if session.warn_after_secs == 0 {
            return Err(ConfigError::Validation(
                "session.warn_after_secs must be non-zero".into(),
            ));
        }
        if session.auto_apply_after_secs <= session.warn_after_secs {
            return Err(ConfigError::Validation(
                "session.auto_apply_after_secs must be greater than session.warn_after_secs".into(),
            ));
        }
        if self.geometry.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "geometry.max_dimension must be at least 1".into(),
            ));
        }
        let tol = self.geometry.aspect_tolerance;
        if !(tol > 0.0 && tol < 1.0) {
            return Err(ConfigError::Validation(
                "geometry.aspect_tolerance must be between 0 and 1 (exclusive)".into(),
            ));
        }
        Ok(())
    }

    /// Session tunables derived from this config.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            timings: EscalationTimings {
                warn_after: Duration::from_secs(self.session.warn_after_secs),
                act_after: Duration::from_secs(self.session.auto_apply_after_secs),
                grace: Duration::from_millis(self.session.auto_apply_grace_ms),
            },
            drag_throttle: Duration::from_millis(self.session.drag_throttle_ms),
            geometry: GeometryOptions {
                aspect_tolerance: self.geometry.aspect_tolerance,
                resample: self.geometry.resample,
                max_dimension: self.geometry.max_dimension,
            },
        }
    }
}

/// Backend endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Scheme, host and port of the backend.
    pub base_url: String,
    /// Path of the apply endpoint, joined onto `base_url`.
    pub apply_path: String,
    /// Whole-request timeout for a submission.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8188".to_string(),
            apply_path: "/dapao_toolbox/realtime_image_adjust/apply".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Session behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Name of the backend event that carries new images.
    pub update_event: String,
    pub warn_after_secs: u64,
    pub auto_apply_after_secs: u64,
    pub auto_apply_grace_ms: u64,
    pub drag_throttle_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            update_event: "realtime_image_adjust_update".to_string(),
            warn_after_secs: 20,
            auto_apply_after_secs: 40,
            auto_apply_grace_ms: 1000,
            drag_throttle_ms: 50,
        }
    }
}

/// Geometry limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeometryConfig {
    /// Largest accepted target width or height.
    pub max_dimension: u32,
    /// Aspect ratios closer than this are treated as equal (no crop).
    pub aspect_tolerance: f64,
    pub resample: Resample,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            max_dimension: 8192,
            aspect_tolerance: 0.01,
            resample: Resample::default(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of threads for the color pass.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(AdjustConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AdjustConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AdjustConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file, falling back to stock defaults when it
/// does not exist.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: &Path) -> Result<AdjustConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `live-adjust.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# live-adjust Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# The file is read from ./live-adjust.toml, or from the path given with
# --config. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Backend
# ---------------------------------------------------------------------------
[backend]
# Scheme, host and port of the backend server.
base_url = "http://127.0.0.1:8188"

# Endpoint that receives adjusted images (POST, JSON body).
apply_path = "/dapao_toolbox/realtime_image_adjust/apply"

# Give up on a submission after this many seconds.
request_timeout_secs = 30

# ---------------------------------------------------------------------------
# Session
# ---------------------------------------------------------------------------
[session]
# Backend event that carries a new image for this node.
update_event = "realtime_image_adjust_update"

# After the last adjustment, warn that nothing has been applied yet...
warn_after_secs = 20

# ...and apply automatically. Must be greater than warn_after_secs.
auto_apply_after_secs = 40

# Pause between the auto-apply notice and the actual submission.
auto_apply_grace_ms = 1000

# Minimum interval between preview renders while a slider is dragged.
drag_throttle_ms = 50

# ---------------------------------------------------------------------------
# Geometry
# ---------------------------------------------------------------------------
[geometry]
# Largest target width or height accepted from the controls.
max_dimension = 8192

# Aspect ratios closer than this are treated as equal (no crop).
aspect_tolerance = 0.01

# Resampling filter: "nearest", "triangle", "catmull-rom" or "lanczos3".
resample = "triangle"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum threads for the color pass.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[logging]
# tracing filter directive; RUST_LOG takes precedence when set.
filter = "info"
"##
}
