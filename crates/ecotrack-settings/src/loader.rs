//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::EcotrackSettings;

/// Resolve the path to the settings file (`~/.ecotrack/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".ecotrack").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EcotrackSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an out-of-range value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<EcotrackSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
fn load_file_layer(path: &Path) -> Result<EcotrackSettings> {
    let defaults = serde_json::to_value(EcotrackSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `ECOTRACK_*` environment variable overrides.
///
/// Invalid or out-of-range values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut EcotrackSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup (the env in production).
fn apply_overrides(settings: &mut EcotrackSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let number = |name: &str, min: u64, max: u64| {
        checked(name, lookup(name), |v| parse_u64_range(v, min, max))
    };
    let size = |name: &str, min: usize, max: usize| {
        checked(name, lookup(name), |v| parse_usize_range(v, min, max))
    };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("ECOTRACK_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = checked("ECOTRACK_PORT", lookup("ECOTRACK_PORT"), |v| {
        parse_u16_range(v, 0, u16::MAX)
    }) {
        settings.server.port = v;
    }
    if let Some(v) = size("ECOTRACK_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = size("ECOTRACK_MAX_MESSAGE_SIZE", 1_024, 16 * 1024 * 1024) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = number("ECOTRACK_HEARTBEAT_INTERVAL_SECS", 1, 3_600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = number("ECOTRACK_HEARTBEAT_TIMEOUT_SECS", 1, 86_400) {
        settings.server.heartbeat_timeout_secs = v;
    }

    // ── Hub ─────────────────────────────────────────────────────────
    if let Some(v) = string("ECOTRACK_ADMIN_PREFIX") {
        settings.hub.admin_prefix = v;
    }
    if let Some(v) = number("ECOTRACK_STATS_INTERVAL_MS", 100, 3_600_000) {
        settings.hub.stats_interval_ms = v;
    }
    if let Some(v) = size("ECOTRACK_SEND_QUEUE_CAPACITY", 1, 65_536) {
        settings.hub.send_queue_capacity = v;
    }
    if let Some(v) = number("ECOTRACK_MAX_SEND_DROPS", 1, 1_000_000) {
        settings.hub.max_send_drops = v;
    }
    if let Some(v) = size("ECOTRACK_EVENT_QUEUE_CAPACITY", 1, 1_048_576) {
        settings.hub.event_queue_capacity = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("ECOTRACK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("ECOTRACK_LOG_FORMAT") {
        match v.parse() {
            Ok(format) => settings.logging.format = format,
            Err(e) => tracing::warn!(key = "ECOTRACK_LOG_FORMAT", error = %e, "ignoring"),
        }
    }
}

/// Parse a present value, warning when it is rejected.
fn checked<T>(name: &str, val: Option<String>, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let val = val?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
    }
    result
}

/// Parse a string as a `u16` within an inclusive range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
