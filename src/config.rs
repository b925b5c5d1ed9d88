// rc file handling: ~/.lotflow/rc holds `key=value` lines

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bounded wait for a per-lot lock
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;

/// Settings resolved from the rc file
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_location: PathBuf,
    pub lock_timeout: Duration,
}

impl Settings {
    /// Directory holding the rc file and the default database
    pub fn home_dir() -> Result<PathBuf> {
        // HOME wins so tests and scripts can relocate the ledger
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .or_else(dirs::home_dir)
            .context("Could not determine home directory")?;
        Ok(home.join(".lotflow"))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("rc"))
    }

    /// Load settings from the rc file, falling back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let defaults = Self::defaults(&Self::home_dir()?);

        if !config_path.exists() {
            return Ok(defaults);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;
        Self::parse(&content, &config_path, defaults)
    }

    fn defaults(home: &Path) -> Self {
        Self {
            data_location: home.join("ledger.db"),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }

    /// Parse rc content; unknown keys and comments are ignored
    pub fn parse(content: &str, config_path: &Path, defaults: Self) -> Result<Self> {
        let mut settings = defaults;
        let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "data.location" => {
                    let path = PathBuf::from(value);
                    // Relative paths resolve against the rc file's directory
                    settings.data_location = if path.is_relative() {
                        config_dir.join(path)
                    } else {
                        path
                    };
                }
                "lock.timeout_ms" => {
                    let ms: u64 = value
                        .parse()
                        .with_context(|| format!("Invalid lock.timeout_ms: '{}'", value))?;
                    settings.lock_timeout = Duration::from_millis(ms);
                }
                other => log::debug!("Ignoring unknown config key '{}'", other),
            }
        }

        Ok(settings)
    }
}
