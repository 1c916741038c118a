//! Configuration loading and persistence.
//!
//! Precedence, lowest to highest: built-in defaults, the JSON config
//! file, `SHELLBACK_*` environment variables, CLI flags. The file holds
//! the channel key, so it is written with owner-only permissions.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::constants::{
    DEFAULT_CHANNEL_KEY, DEFAULT_CONTROLLER_HOST, DEFAULT_CONTROLLER_PORT,
    DEFAULT_RETRY_INTERVAL_SECS,
};

/// Configuration for the shellback client.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Controller host to call back to.
    pub host: String,
    /// Controller port.
    pub port: u16,
    /// Seconds between reconnect attempts.
    pub retry_interval_secs: u64,
    /// Pre-shared channel key (url-safe base64, 32 bytes decoded).
    pub key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_CONTROLLER_HOST.to_string(),
            port: DEFAULT_CONTROLLER_PORT,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            key: DEFAULT_CHANNEL_KEY.to_string(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/shellback-test`
    /// 2. `SHELLBACK_CONFIG_DIR` env var: explicit override
    /// 3. Default: platform config dir (e.g. `~/.config/shellback`)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/shellback-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var("SHELLBACK_CONFIG_DIR") {
                    PathBuf::from(dir)
                } else {
                    dirs::config_dir()
                        .context("could not determine config directory")?
                        .join("shellback")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of the JSON config file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file yields defaults; an unreadable or malformed file is
    /// an error, since it may carry the channel key and silently falling
    /// back to the default key would connect with the wrong identity.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("could not read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("malformed config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SHELLBACK_HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("SHELLBACK_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.port = port;
            }
        }

        if let Ok(interval) = std::env::var("SHELLBACK_RETRY_INTERVAL") {
            if let Ok(interval) = interval.parse::<u64>() {
                self.retry_interval_secs = interval;
            }
        }

        if let Ok(key) = std::env::var("SHELLBACK_KEY") {
            self.key = key;
        }
    }

    /// Apply command-line overrides on top of file and env values.
    pub fn apply_cli_overrides(
        &mut self,
        host: Option<String>,
        port: Option<u16>,
        retry_interval: Option<u64>,
    ) {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(interval) = retry_interval {
            self.retry_interval_secs = interval;
        }
    }

    /// Reconnect backoff as a [`Duration`].
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// Persists the current configuration to disk.
    ///
    /// Sets owner-only permissions: the file contains the channel key.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("could not write {}", path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }
}
