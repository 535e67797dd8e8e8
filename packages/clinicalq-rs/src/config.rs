//! Session configuration
//!
//! A JSON config file is merged over the defaults: top-level keys replace the
//! default values, while the `board` and `channels` objects merge key by key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, SessionError};
use crate::protocol::SEQUENTIAL_ORDER;

/// Acquisition board settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// `cyton`, `synthetic`, or a numeric board id
    pub board_id: Value,
    pub serial_port: String,
    pub use_synthetic: bool,
    /// Channels the synthetic board exposes
    pub available_channels: Vec<u32>,
    pub seed: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            board_id: Value::String("cyton".to_string()),
            serial_port: "/dev/ttyUSB0".to_string(),
            use_synthetic: true,
            available_channels: (1..=8).collect(),
            seed: 42,
        }
    }
}

/// Raw session configuration as read from disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// `sequential` or `simultaneous`
    pub mode: String,
    pub epoch_seconds: u32,
    pub reposition_seconds: u32,
    /// `timer` or `manual`
    pub reposition_mode: String,
    pub sampling_rate: u32,
    pub fast_mode: bool,
    pub include_frontal_baseline: bool,
    pub live_bandpower: bool,
    pub live_window_seconds: f64,
    pub board: BoardConfig,
    /// Site to 1-based board channel. Signed so bad indices can be reported.
    pub channels: BTreeMap<String, i64>,
    pub sequential_order: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: "sequential".to_string(),
            epoch_seconds: 15,
            reposition_seconds: 20,
            reposition_mode: "timer".to_string(),
            sampling_rate: 250,
            fast_mode: false,
            include_frontal_baseline: true,
            live_bandpower: true,
            live_window_seconds: 2.0,
            board: BoardConfig::default(),
            channels: default_channels(),
            sequential_order: SEQUENTIAL_ORDER.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Default 10-20 site wiring
pub fn default_channels() -> BTreeMap<String, i64> {
    [("Cz", 1), ("O1", 2), ("Fz", 3), ("F3", 4), ("F4", 5)]
        .into_iter()
        .map(|(site, ch)| (site.to_string(), ch))
        .collect()
}

impl SessionConfig {
    /// Load a JSON config file and merge it over the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded session config from {}", path.display());
        Ok(config)
    }

    /// Parse JSON text and merge it over the defaults
    pub fn from_json_str(text: &str) -> Result<Self> {
        let text = text.trim_start_matches('\u{feff}');
        let loaded: Value = serde_json::from_str(text)?;
        let Value::Object(loaded) = loaded else {
            return Err(SessionError::Configuration(
                "config root must be a JSON object".to_string(),
            ));
        };

        let mut merged = serde_json::to_value(Self::default())?;
        if let Value::Object(base) = &mut merged {
            for (key, value) in loaded {
                if matches!(key.as_str(), "board" | "channels") {
                    if let (Some(Value::Object(existing)), Value::Object(over)) =
                        (base.get_mut(&key), &value)
                    {
                        existing.extend(over.clone());
                        continue;
                    }
                }
                base.insert(key, value);
            }
        }

        serde_json::from_value(merged)
            .map_err(|e| SessionError::Configuration(format!("invalid config value: {}", e)))
    }

    /// Write this config as pretty JSON, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_channels_merge_with_defaults() {
        let config = SessionConfig::from_json_str(r#"{"channels": {"Cz": 7}}"#).unwrap();
        assert_eq!(config.channels["Cz"], 7);
        assert_eq!(config.channels["O1"], 2);
        assert_eq!(config.channels.len(), 5);
    }

    #[test]
    fn test_partial_board_merges_with_defaults() {
        let config =
            SessionConfig::from_json_str(r#"{"board": {"seed": 7}, "epoch_seconds": 3}"#).unwrap();
        assert_eq!(config.board.seed, 7);
        assert!(config.board.use_synthetic);
        assert_eq!(config.board.available_channels.len(), 8);
        assert_eq!(config.epoch_seconds, 3);
        assert_eq!(config.mode, "sequential");
    }

    #[test]
    fn test_sequential_order_is_replaced_not_merged() {
        let config =
            SessionConfig::from_json_str(r#"{"sequential_order": ["Cz", "O1"]}"#).unwrap();
        assert_eq!(config.sequential_order, vec!["Cz", "O1"]);
    }

    #[test]
    fn test_bom_is_tolerated() {
        let config = SessionConfig::from_json_str("\u{feff}{\"mode\": \"simultaneous\"}").unwrap();
        assert_eq!(config.mode, "simultaneous");
    }

    #[test]
    fn test_non_object_root_is_rejected() {
        assert!(matches!(
            SessionConfig::from_json_str("[1, 2]"),
            Err(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn test_wrong_value_type_is_configuration_error() {
        let err = SessionConfig::from_json_str(r#"{"epoch_seconds": "long"}"#).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = SessionConfig::default();
        config.mode = "simultaneous".to_string();
        config.save(&path).unwrap();
        assert_eq!(SessionConfig::load(&path).unwrap(), config);
    }
}
