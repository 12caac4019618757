//! Configuration loaded from `<data_dir>/config.toml`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{BridgeCalError, BridgeCalResult};

const DEFAULT_PAST_DAYS: i64 = 30;
const DEFAULT_FUTURE_DAYS: i64 = 180;
const DEFAULT_INTERVAL_SECONDS: u64 = 120;
const DEFAULT_ADAPTER_TIMEOUT_SECONDS: u64 = 120;

/// What mirror payloads carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedactionMode {
    /// Mirrors carry the source's summary, location and description.
    #[default]
    None,
    /// Mirrors carry summary "Busy" and no location/description.
    BusyOnly,
}

/// Sync window bounds in days around now.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub past_days: i64,
    pub future_days: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            past_days: DEFAULT_PAST_DAYS,
            future_days: DEFAULT_FUTURE_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Tick period in daemon mode, seconds.
    pub interval_seconds: u64,
    pub redaction_mode: RedactionMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            redaction_mode: RedactionMode::None,
        }
    }
}

/// Adapter subprocess commands and the per-call timeout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub outlook_command: String,
    pub google_command: String,
    pub timeout_seconds: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            outlook_command: "bridgecal-adapter-outlook".to_string(),
            google_command: "bridgecal-adapter-google".to_string(),
            timeout_seconds: DEFAULT_ADAPTER_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    data_dir: Option<PathBuf>,
    pub window: WindowConfig,
    pub sync: SyncConfig,
    pub adapters: AdapterConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// With an explicit `path` the file must exist. Otherwise the default
    /// location is tried and a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> BridgeCalResult<AppConfig> {
        let (cfg_path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_data_dir().join("config.toml"), false),
        };

        let config = if cfg_path.exists() {
            let raw = std::fs::read_to_string(&cfg_path).map_err(|e| {
                BridgeCalError::Config(format!("cannot read {}: {e}", cfg_path.display()))
            })?;
            toml::from_str(&raw).map_err(|e| {
                BridgeCalError::Config(format!("cannot parse {}: {e}", cfg_path.display()))
            })?
        } else if required {
            return Err(BridgeCalError::Config(format!(
                "config file not found: {}",
                cfg_path.display()
            )));
        } else {
            AppConfig::default()
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BridgeCalResult<()> {
        if self.window.past_days < 0 || self.window.future_days < 0 {
            return Err(BridgeCalError::Config(
                "window bounds must not be negative".to_string(),
            ));
        }
        if self.sync.interval_seconds == 0 {
            return Err(BridgeCalError::Config(
                "sync.interval_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The directory holding config, the mapping store and logs.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Path of the mapping store database.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir().join("state.db")
    }
}

/// `BRIDGECAL_DATA_DIR` override, `%APPDATA%\BridgeCal` on Windows,
/// otherwise `~/.bridgecal`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BRIDGECAL_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(appdata) = std::env::var("APPDATA") {
        if !appdata.is_empty() {
            return PathBuf::from(appdata).join("BridgeCal");
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bridgecal")
}
