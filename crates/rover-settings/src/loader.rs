//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RoverSettings::default()`]
//! 2. If `~/.rover/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `ROVER_*` environment overrides (highest priority)
//! 4. [`RoverSettings::validate`]

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RoverSettings;

/// Resolve the path to the settings file (`~/.rover/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".rover").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RoverSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RoverSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<RoverSettings> {
    let defaults = serde_json::to_value(RoverSettings::default())?;

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
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `ROVER_*` overrides read through `lookup`.
///
/// Values that fail to parse or fall outside their range are logged and
/// ignored, leaving the file/default value in place.
pub fn apply_env_overrides<F>(settings: &mut RoverSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("ROVER_HOST") {
        settings.controller.host = v;
    }
    if let Some(v) = env.parsed("ROVER_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.controller.port = v;
    }
    if let Some(v) = env.string("ROVER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("ROVER_WALL_THRESHOLD", |s| {
        parse_f64_range(s, f64::MIN_POSITIVE, 10_000.0)
    }) {
        settings.navigation.wall_threshold = v;
    }
    if let Some(v) = env.parsed("ROVER_COMMAND_INTERVAL_MS", |s| {
        parse_u64_range(s, 10, 60_000)
    }) {
        settings.drive.command_interval_ms = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a finite `f64` within a range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.trim().parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"controller": {"host": "a", "port": 81}});
        let source = serde_json::json!({"controller": {"port": 8081}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["controller"]["port"], 8081);
        assert_eq!(merged["controller"]["host"], "a");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(
            serde_json::json!({"a": 1, "b": 2}),
            serde_json::json!({"a": null}),
        );
        assert_eq!(merged, serde_json::json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_array_and_primitive_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3], "a": {"nested": true}}),
            serde_json::json!({"items": [4], "a": 42}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
        assert_eq!(merged["a"], 42);
    }

    #[test]
    fn merge_adds_new_keys() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_file_layer(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, RoverSettings::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"controller": {"host": "10.0.0.7"}, "drive": {"robotSpeed": 0.5}}"#,
        )
        .unwrap();

        let settings = read_file_layer(&path).unwrap();
        assert_eq!(settings.controller.host, "10.0.0.7");
        assert_eq!(settings.controller.port, 81);
        assert!((settings.drive.robot_speed - 0.5).abs() < f64::EPSILON);
        assert_eq!(settings.drive.command_interval_ms, 50);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn wrong_field_type_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"controller": {"port": "eighty-one"}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn out_of_range_file_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"navigation": {"repeatIntervalMs": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_win_over_file() {
        let mut settings = RoverSettings::default();
        settings.controller.host = "from-file".into();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("ROVER_HOST", "rover.local"),
                ("ROVER_PORT", "8081"),
                ("ROVER_LOG_LEVEL", "debug"),
                ("ROVER_WALL_THRESHOLD", "35.5"),
                ("ROVER_COMMAND_INTERVAL_MS", "20"),
            ]),
        );
        assert_eq!(settings.controller.host, "rover.local");
        assert_eq!(settings.controller.port, 8081);
        assert_eq!(settings.logging.level, "debug");
        assert!((settings.navigation.wall_threshold - 35.5).abs() < f64::EPSILON);
        assert_eq!(settings.drive.command_interval_ms, 20);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = RoverSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("ROVER_HOST", ""),
                ("ROVER_PORT", "0"),
                ("ROVER_WALL_THRESHOLD", "-3"),
                ("ROVER_COMMAND_INTERVAL_MS", "fast"),
            ]),
        );
        assert_eq!(settings, RoverSettings::default());
    }

    #[test]
    fn no_env_leaves_settings_untouched() {
        let mut settings = RoverSettings::default();
        apply_env_overrides(&mut settings, |_| None);
        assert_eq!(settings, RoverSettings::default());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_u16_range_bounds() {
        assert_eq!(parse_u16_range("81", 1, 65535), Some(81));
        assert_eq!(parse_u16_range(" 81 ", 1, 65535), Some(81));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u16_range("-1", 1, 65535), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("50", 10, 100), Some(50));
        assert_eq!(parse_u64_range("5", 10, 100), None);
        assert_eq!(parse_u64_range("", 10, 100), None);
    }

    #[test]
    fn parse_f64_range_rejects_non_finite() {
        assert_eq!(parse_f64_range("20", 0.1, 100.0), Some(20.0));
        assert_eq!(parse_f64_range("NaN", 0.1, 100.0), None);
        assert_eq!(parse_f64_range("inf", 0.1, 100.0), None);
        assert_eq!(parse_f64_range("0", 0.1, 100.0), None);
    }

    #[test]
    fn settings_path_ends_with_rover_dir() {
        let path = settings_path();
        assert!(path.ends_with(".rover/settings.json"));
    }
}
