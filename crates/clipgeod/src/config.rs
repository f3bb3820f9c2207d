// Daemon configuration loading
//
// Order of precedence (last wins):
//
// 1. Built-in defaults (`ClipgeoConfig::new()`, history file in the data dir)
// 2. JSON config file (`--config`, `CLIPGEO_CONFIG`, or `<data dir>/config.json`)
// 3. Environment overrides:
//    - `CLIPGEO_CHECK_INTERVAL`: Poll interval in seconds (float, clamped to >= 0.5)
//    - `CLIPGEO_ENABLE_IPV4` / `CLIPGEO_ENABLE_IPV6`: Address families to detect
//    - `CLIPGEO_NOTIFICATIONS`: Enable desktop notifications
//    - `CLIPGEO_NOTIFICATION_TIMEOUT`: Seconds a notification stays visible (3-30)
//    - `CLIPGEO_AUTO_START`: Recorded only
//    - `CLIPGEO_API_BASE_URL`: Geolocation API base URL
//    - `CLIPGEO_LOOKUP_TIMEOUT_SECS`: Lookup timeout (1-60)
//    - `CLIPGEO_HISTORY_STORE`: History store type (file, memory)
//    - `CLIPGEO_HISTORY_PATH`: Path to the history file
//    - `CLIPGEO_NOTIFY_BACKENDS`: Comma-separated backend order
//    - `CLIPGEO_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export CLIPGEO_CHECK_INTERVAL=1.5
// export CLIPGEO_ENABLE_IPV6=false
// export CLIPGEO_NOTIFY_BACKENDS=tray,console
//
// clipgeod run
// ```

use anyhow::{Context, Result};
use clipgeo_core::config::{ClipgeoConfig, HistoryStoreConfig};
use directories::ProjectDirs;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// File name of the config file inside the data directory
const CONFIG_FILE_NAME: &str = "config.json";

/// File name of the history file inside the data directory
const HISTORY_FILE_NAME: &str = "history.json";

const DEFAULT_LOG_LEVEL: &str = "info";

/// Fully resolved daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub config: ClipgeoConfig,
    pub log_level: String,
    /// Config file that was read, if one existed
    pub loaded_from: Option<PathBuf>,
}

/// Resolves file and environment configuration
///
/// Kept around by the daemon so SIGHUP can reload with the same paths.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader using the platform data directory
    ///
    /// `cli_path` wins over `CLIPGEO_CONFIG`, which wins over
    /// `<data dir>/config.json`.
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        let data_dir = ProjectDirs::from("com", "clipgeo", "clipgeo")
            .map(|dirs| dirs.data_dir().to_path_buf());

        let config_path = cli_path
            .or_else(|| std::env::var_os("CLIPGEO_CONFIG").map(PathBuf::from))
            .or_else(|| data_dir.as_ref().map(|dir| dir.join(CONFIG_FILE_NAME)));

        Self::with_paths(config_path, data_dir)
    }

    /// Loader with explicit paths
    pub fn with_paths(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Self {
        Self {
            config_path,
            data_dir,
        }
    }

    /// Load from the config file and the process environment
    pub fn load(&self) -> Result<DaemonConfig> {
        self.load_with(|key| std::env::var(key).ok())
    }

    /// Load with a custom environment lookup
    pub fn load_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<DaemonConfig> {
        let (mut config, history_configured, loaded_from) = match &self.config_path {
            Some(path) if path.exists() => {
                let (config, has_history) = read_config_file(path)?;
                (config, has_history, Some(path.clone()))
            }
            _ => (ClipgeoConfig::new(), false, None),
        };

        // Persist history by default when the file does not say otherwise
        if !history_configured && let Some(path) = self.default_history_path() {
            config.history = HistoryStoreConfig::File {
                path: path.to_string_lossy().into_owned(),
            };
        }

        self.apply_env_overrides(&mut config, &env)?;

        let log_level = env("CLIPGEO_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        validate_log_level(&log_level)?;

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(DaemonConfig {
            config,
            log_level,
            loaded_from,
        })
    }

    fn default_history_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(HISTORY_FILE_NAME))
    }

    fn apply_env_overrides(
        &self,
        config: &mut ClipgeoConfig,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        let settings = &mut config.settings;

        if let Some(value) = env("CLIPGEO_CHECK_INTERVAL") {
            settings.check_interval = parse_number("CLIPGEO_CHECK_INTERVAL", &value)?;
        }
        if let Some(value) = env("CLIPGEO_ENABLE_IPV4") {
            settings.enable_ipv4 = parse_bool("CLIPGEO_ENABLE_IPV4", &value)?;
        }
        if let Some(value) = env("CLIPGEO_ENABLE_IPV6") {
            settings.enable_ipv6 = parse_bool("CLIPGEO_ENABLE_IPV6", &value)?;
        }
        if let Some(value) = env("CLIPGEO_NOTIFICATIONS") {
            settings.notifications = parse_bool("CLIPGEO_NOTIFICATIONS", &value)?;
        }
        if let Some(value) = env("CLIPGEO_NOTIFICATION_TIMEOUT") {
            settings.notification_timeout = parse_number("CLIPGEO_NOTIFICATION_TIMEOUT", &value)?;
        }
        if let Some(value) = env("CLIPGEO_AUTO_START") {
            settings.auto_start = parse_bool("CLIPGEO_AUTO_START", &value)?;
        }

        if let Some(value) = env("CLIPGEO_API_BASE_URL") {
            config.lookup.base_url = value.trim().to_string();
        }
        if let Some(value) = env("CLIPGEO_LOOKUP_TIMEOUT_SECS") {
            config.lookup.timeout_secs = parse_number("CLIPGEO_LOOKUP_TIMEOUT_SECS", &value)?;
        }

        let history_path = env("CLIPGEO_HISTORY_PATH").filter(|p| !p.trim().is_empty());
        match env("CLIPGEO_HISTORY_STORE").as_deref().map(str::trim) {
            Some("memory") => config.history = HistoryStoreConfig::Memory,
            Some("file") => {
                let path = history_path
                    .map(PathBuf::from)
                    .or_else(|| match &config.history {
                        HistoryStoreConfig::File { path } => Some(PathBuf::from(path)),
                        HistoryStoreConfig::Memory => None,
                    })
                    .or_else(|| self.default_history_path())
                    .context(
                        "CLIPGEO_HISTORY_PATH is required when CLIPGEO_HISTORY_STORE=file \
                         and no data directory is available",
                    )?;
                config.history = HistoryStoreConfig::File {
                    path: path.to_string_lossy().into_owned(),
                };
            }
            Some(other) => anyhow::bail!(
                "CLIPGEO_HISTORY_STORE '{}' is not supported. Supported types: file, memory",
                other
            ),
            None => {
                if let Some(path) = history_path {
                    config.history = HistoryStoreConfig::File { path };
                }
            }
        }

        if let Some(value) = env("CLIPGEO_NOTIFY_BACKENDS") {
            config.notify.backends = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(())
    }
}

/// Parse a config file, reporting whether it names a history store
fn read_config_file(path: &Path) -> Result<(ClipgeoConfig, bool)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Config file {} is not valid JSON", path.display()))?;
    let has_history = value.get("history").is_some();

    let config = serde_json::from_value(value)
        .with_context(|| format!("Config file {} has invalid settings", path.display()))?;

    Ok((config, has_history))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{} must be a boolean (true/false). Got: {}", key, value),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a number. Got: {}", key, value))
}

fn validate_log_level(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => anyhow::bail!(
            "CLIPGEO_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}
