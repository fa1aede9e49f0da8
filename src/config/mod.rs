use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::device::AmbientLevel;

/// Tool preferences stored as TOML. Device settings live on the headset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Headset Bluetooth address used when `--mac` is not given.
    pub device_address: Option<String>,
    /// RFCOMM channel; looked up through the service UUID when unset.
    pub rfcomm_channel: Option<u8>,
    pub reply_timeout_ms: u64,
    /// Level sent when a command enters ambient mode without naming one.
    pub default_ambient_level: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_address: None,
            rfcomm_channel: None,
            reply_timeout_ms: 5000,
            default_ambient_level: AmbientLevel::DEFAULT.value(),
        }
    }
}

impl AppConfig {
    /// Config file path: ~/.config/sonyctl/config.toml
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sonyctl")
            .join("config.toml")
    }

    /// Load config from disk, or return defaults.
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Ignoring config {}: {:#}", path.display(), e),
                },
                Err(e) => tracing::warn!("Failed to read config: {}", e),
            }
        }
        Self::default()
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("invalid TOML")?;
        config.ambient_level()?;
        Ok(config)
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        tracing::info!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ambient_level(&self) -> Result<AmbientLevel> {
        AmbientLevel::new(self.default_ambient_level as i32).context("default_ambient_level")
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_empty_file() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.reply_timeout(), Duration::from_secs(5));
        assert_eq!(config.ambient_level().unwrap().value(), 10);
    }

    #[test]
    fn test_partial_file() {
        let config = AppConfig::parse("device_address = \"AC:80:0A:00:00:01\"\nrfcomm_channel = 9\n").unwrap();
        assert_eq!(config.device_address.as_deref(), Some("AC:80:0A:00:00:01"));
        assert_eq!(config.rfcomm_channel, Some(9));
        assert_eq!(config.reply_timeout_ms, 5000);
    }

    #[test]
    fn test_rejects_out_of_range_level() {
        let err = AppConfig::parse("default_ambient_level = 25").unwrap_err();
        assert!(format!("{:#}", err).contains("invalid ambient sound level 25"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("sonyctl-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let config = AppConfig {
            device_address: Some("00:11:22:33:44:55".into()),
            default_ambient_level: 15,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path), config);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_broken_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("sonyctl-broken-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "reply_timeout_ms = \"soon\"").unwrap();
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
