//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, where persisted session state lives, and the session timing
//! knobs.
//!
//! Configuration is stored at `~/.config/huddle/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "huddle";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Tokens at least this many days old are refreshed before startup completes.
const DEFAULT_REFRESH_AFTER_DAYS: i64 = 14;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Directory for persisted session state; defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    pub refresh_after_days: i64,
    pub request_timeout_secs: u64,
    /// Keep the token in the OS keychain instead of the state file.
    pub use_keyring: bool,
    /// `host:port` to probe for reachability; no probing when unset.
    pub connectivity_probe: Option<String>,
    pub probe_interval_secs: u64,
    /// Write logs to a daily rolling file here instead of stderr.
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            data_dir: None,
            refresh_after_days: DEFAULT_REFRESH_AFTER_DAYS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            use_keyring: false,
            connectivity_probe: None,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            log_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn refresh_threshold(&self) -> chrono::Duration {
        // Out-of-range values from a hand-edited file mean "never"
        chrono::Duration::try_days(self.refresh_after_days).unwrap_or(chrono::Duration::MAX)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.probe_interval_secs)
    }
}
