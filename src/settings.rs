use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::cache::CACHE_VERSION;
use crate::audio::probe::PROBE_WINDOW;
use crate::engine::meter::{DEFAULT_DECAY_DB, DEFAULT_FLOOR_DB};
use crate::engine::mix::{DEFAULT_FADE_SECONDS, MAX_FADE_SECONDS};

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_METER_INTERVAL_MS: u64 = 16;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub audio_output_enabled: bool,
    pub sample_rate: u32,
    pub cache_enabled: bool,
    /// Falls back to the platform cache dir when unset
    pub cache_dir: Option<PathBuf>,
    pub cache_version: String,
    pub meter_interval_ms: u64,
    pub meter_window: usize,
    pub meter_decay_db: f32,
    pub meter_floor_db: f32,
    pub fade_seconds: f32,
    /// Base for relative track URLs
    pub fetch_base_url: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            audio_output_enabled: true,
            sample_rate: DEFAULT_SAMPLE_RATE,
            cache_enabled: true,
            cache_dir: None,
            cache_version: CACHE_VERSION.to_string(),
            meter_interval_ms: DEFAULT_METER_INTERVAL_MS,
            meter_window: PROBE_WINDOW,
            meter_decay_db: DEFAULT_DECAY_DB,
            meter_floor_db: DEFAULT_FLOOR_DB,
            fade_seconds: DEFAULT_FADE_SECONDS,
            fetch_base_url: None,
        }
    }
}

impl EngineSettings {
    /// Build settings from string key/value pairs. Missing or unparsable
    /// values keep their defaults.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            audio_output_enabled: map
                .get("audio_output_enabled")
                .map(|v| v == "true")
                .unwrap_or(defaults.audio_output_enabled),
            sample_rate: map
                .get("sample_rate")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|v| *v >= 8_000)
                .unwrap_or(defaults.sample_rate),
            cache_enabled: map
                .get("cache_enabled")
                .map(|v| v == "true")
                .unwrap_or(defaults.cache_enabled),
            cache_dir: map
                .get("cache_dir")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            cache_version: map
                .get("cache_version")
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or(defaults.cache_version),
            meter_interval_ms: map
                .get("meter_interval_ms")
                .and_then(|v| v.parse::<u64>().ok())
                .map(|v| v.max(1))
                .unwrap_or(defaults.meter_interval_ms),
            meter_window: map
                .get("meter_window")
                .and_then(|v| v.parse::<usize>().ok())
                .map(|v| v.max(1))
                .unwrap_or(defaults.meter_window),
            meter_decay_db: map
                .get("meter_decay_db")
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(defaults.meter_decay_db),
            meter_floor_db: map
                .get("meter_floor_db")
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(defaults.meter_floor_db),
            fade_seconds: map
                .get("fade_seconds")
                .and_then(|v| v.parse::<f32>().ok())
                .map(|v| v.clamp(0.0, MAX_FADE_SECONDS))
                .unwrap_or(defaults.fade_seconds),
            fetch_base_url: map.get("fetch_base_url").filter(|v| !v.is_empty()).cloned(),
        }
    }

    pub fn load_json(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings {}: {}", path.display(), e))?;
        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse settings {}: {}", path.display(), e))
    }

    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(crate::audio::ByteCache::default_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_values_override_defaults() {
        let map: HashMap<String, String> = [
            ("audio_output_enabled", "false"),
            ("sample_rate", "44100"),
            ("fade_seconds", "9"),
            ("meter_interval_ms", "oops"),
            ("cache_dir", "/tmp/stems"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings = EngineSettings::from_map(&map);
        assert!(!settings.audio_output_enabled);
        assert_eq!(settings.sample_rate, 44_100);
        assert_eq!(settings.fade_seconds, MAX_FADE_SECONDS);
        assert_eq!(settings.meter_interval_ms, DEFAULT_METER_INTERVAL_MS);
        assert_eq!(settings.cache_dir, Some(PathBuf::from("/tmp/stems")));
        assert!(settings.cache_enabled);
    }

    #[test]
    fn json_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"cache_enabled": false, "meter_window": 512}"#).unwrap();

        let settings = EngineSettings::load_json(&path).unwrap();
        assert!(!settings.cache_enabled);
        assert_eq!(settings.meter_window, 512);
        assert_eq!(settings.sample_rate, DEFAULT_SAMPLE_RATE);

        assert!(EngineSettings::load_json(&dir.path().join("missing.json")).is_err());
    }
}
