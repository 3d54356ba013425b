//! Configuration file support for gymtrack.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/gymtrack/config.toml`.

use crate::cooldown::{CooldownSettings, DEFAULT_NOTIFICATION_ID, DEFAULT_REST_SECONDS};
use crate::session::RecoveryPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub timer: TimerConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    /// Location of the ledger file inside `data_dir`
    pub fn ledger_path(data_dir: &Path) -> PathBuf {
        data_dir.join("ledger.json")
    }
}

/// Rest countdown configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_rest_seconds")]
    pub rest_seconds: u64,

    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,

    #[serde(default = "default_notification_id")]
    pub notification_id: String,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            rest_seconds: default_rest_seconds(),
            tick_millis: default_tick_millis(),
            notification_id: default_notification_id(),
        }
    }
}

impl TimerConfig {
    pub fn rest_duration(&self) -> Duration {
        Duration::from_secs(self.rest_seconds)
    }

    pub fn cooldown_settings(&self) -> CooldownSettings {
        CooldownSettings {
            tick: Duration::from_millis(self.tick_millis),
            notification_id: self.notification_id.clone(),
        }
    }
}

/// Open-session handling
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SessionsConfig {
    #[serde(default)]
    pub recovery: RecoveryPolicy,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("gymtrack")
}

fn default_rest_seconds() -> u64 {
    DEFAULT_REST_SECONDS
}

fn default_tick_millis() -> u64 {
    1000
}

fn default_notification_id() -> String {
    DEFAULT_NOTIFICATION_ID.to_string()
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values the countdown cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.timer.rest_seconds == 0 {
            return Err(Error::Config("timer.rest_seconds must be positive".into()));
        }
        if self.timer.tick_millis == 0 {
            return Err(Error::Config("timer.tick_millis must be positive".into()));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("gymtrack").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timer.rest_seconds, 120);
        assert_eq!(config.timer.tick_millis, 1000);
        assert_eq!(config.timer.notification_id, "rest_done");
        assert_eq!(config.sessions.recovery, RecoveryPolicy::Resume);
        assert!(config.data.data_dir.ends_with("gymtrack"));
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.timer.rest_seconds = 90;
        config.sessions.recovery = RecoveryPolicy::AutoClose;
        config.save_to(&path).unwrap();

        let parsed = Config::load_from(&path).unwrap();
        assert_eq!(parsed.timer.rest_seconds, 90);
        assert_eq!(parsed.sessions.recovery, RecoveryPolicy::AutoClose);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[timer]
rest_seconds = 75

[sessions]
recovery = "auto_close"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.timer.rest_seconds, 75);
        assert_eq!(config.timer.tick_millis, 1000); // default
        assert_eq!(config.sessions.recovery, RecoveryPolicy::AutoClose);
        assert_eq!(config.timer.rest_duration(), Duration::from_secs(75));
    }

    #[test]
    fn test_zero_rest_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[timer]\nrest_seconds = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
