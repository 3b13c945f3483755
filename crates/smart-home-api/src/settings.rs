//! Settings loading: `settings.json` with environment overrides
//!
//! Every field has a default, so the file is optional. `SETTINGS_PATH`
//! points at another file, `DATA_DIR` overrides the data directory.

use anyhow::Context;
use home_core::DeviceConfig;
use security_engine::EngineConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const DEFAULT_PATH: &str = "settings.json";

/// Top-level settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Node id of this controller; overrides `engine.pi`
    pub pi: Option<String>,
    /// HTTP listen address
    pub bind: String,
    /// Root of the time-series buckets
    pub data_dir: PathBuf,
    /// Per-device settings, keyed by code
    pub devices: BTreeMap<String, DeviceConfig>,
    /// Rule engine settings
    pub engine: EngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pi: None,
            bind: "0.0.0.0:5000".to_string(),
            data_dir: PathBuf::from("./data"),
            devices: BTreeMap::new(),
            engine: EngineConfig::default(),
        }
    }
}

impl Settings {
    /// Load from `SETTINGS_PATH` (or `settings.json`), then apply env overrides
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("SETTINGS_PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut settings = Self::from_file(Path::new(&path))?;
        if let Ok(dir) = std::env::var("DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        Ok(settings)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content)
                .with_context(|| format!("Malformed settings file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No settings file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Engine config with the top-level `pi` and `devices` folded in
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = self.engine.clone();
        if let Some(pi) = &self.pi {
            config.pi = pi.clone();
        }
        for (code, device) in &self.devices {
            config.devices.insert(code.clone(), device.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use home_core::Pull;

    #[test]
    fn test_defaults() {
        let settings = Settings::parse("{}").unwrap();
        assert_eq!(settings.bind, "0.0.0.0:5000");
        assert_eq!(settings.data_dir, PathBuf::from("./data"));
        assert_eq!(settings.engine_config().pi, "PI1");
    }

    #[test]
    fn test_devices_and_pi_fold_into_engine() {
        let settings = Settings::parse(
            r#"{
                "pi": "PI2",
                "devices": {
                    "DS1": {"simulated": false, "pin": 17, "pull": "DOWN"},
                    "RPIR1": {"enabled": false}
                },
                "engine": {"pin": "4321", "arm_delay_secs": 30}
            }"#,
        )
        .unwrap();

        let config = settings.engine_config();
        assert_eq!(config.pi, "PI2");
        assert_eq!(config.pin, "4321");
        assert_eq!(config.arm_delay_secs, 30);
        assert_eq!(config.devices["DS1"].pull, Pull::Down);
        assert_eq!(config.devices["DS1"].pin, Some(17));
        assert!(!config.devices["RPIR1"].enabled);
    }

    #[test]
    fn test_malformed_is_error() {
        assert!(Settings::parse(r#"{"bind": 5000"#).is_err());
        assert!(Settings::parse(r#"{"engine": {"reset_key": "**"}}"#).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = Settings::from_file(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.bind, "0.0.0.0:5000");
    }
}
