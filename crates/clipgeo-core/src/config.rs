//! Configuration types for clipgeo
//!
//! The user-facing options (`check_interval`, `enable_ipv4`, ...) are kept
//! flat at the top level so an existing `config.json` from earlier releases
//! still deserializes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::matcher::FamilyFilters;

/// Smallest accepted polling interval, in seconds
pub const MIN_CHECK_INTERVAL_SECS: f64 = 0.5;

/// Largest accepted polling interval, in seconds
pub const MAX_CHECK_INTERVAL_SECS: f64 = 3600.0;

/// Accepted range for how long a notification stays visible, in seconds
pub const NOTIFICATION_TIMEOUT_RANGE: (u64, u64) = (3, 30);

/// Main clipgeo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipgeoConfig {
    /// Options the monitor re-reads at runtime
    #[serde(flatten)]
    pub settings: MonitorSettings,

    /// Geolocation API settings
    #[serde(default)]
    pub lookup: LookupConfig,

    /// History store selection
    #[serde(default)]
    pub history: HistoryStoreConfig,

    /// Notification backend ordering
    #[serde(default)]
    pub notify: NotificationConfig,

    /// Capacity of the monitor event channel
    ///
    /// When full, new events are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ClipgeoConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            settings: MonitorSettings::default(),
            lookup: LookupConfig::default(),
            history: HistoryStoreConfig::default(),
            notify: NotificationConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.settings.validate()?;
        self.lookup.validate()?;
        self.history.validate()?;
        self.notify.validate()?;

        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }

        Ok(())
    }
}

impl Default for ClipgeoConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Options that can change while the monitor is running
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Whether the user asked for start-on-login
    ///
    /// Only recorded here; registering with the OS is done by the installer.
    #[serde(default)]
    pub auto_start: bool,

    /// Polling interval in seconds (clamped to 0.5..=3600)
    #[serde(default = "default_check_interval")]
    pub check_interval: f64,

    /// Whether lookups raise a desktop notification
    #[serde(default = "default_true")]
    pub notifications: bool,

    /// Detect IPv4 literals
    #[serde(default = "default_true")]
    pub enable_ipv4: bool,

    /// Detect IPv6 literals
    #[serde(default = "default_true")]
    pub enable_ipv6: bool,

    /// How long a notification stays visible, in seconds
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout: u64,
}

impl MonitorSettings {
    /// Polling interval with the accepted range applied
    ///
    /// Out-of-range values are clamped and NaN falls back to the default, so
    /// this never panics whatever a reload delivers.
    pub fn poll_interval(&self) -> Duration {
        let fallback = Duration::from_secs_f64(default_check_interval());
        if self.check_interval.is_nan() {
            return fallback;
        }
        let secs = self
            .check_interval
            .clamp(MIN_CHECK_INTERVAL_SECS, MAX_CHECK_INTERVAL_SECS);
        Duration::try_from_secs_f64(secs).unwrap_or(fallback)
    }

    /// Notification display duration with the accepted range applied
    pub fn notification_duration(&self) -> Duration {
        let (min, max) = NOTIFICATION_TIMEOUT_RANGE;
        Duration::from_secs(self.notification_timeout.clamp(min, max))
    }

    /// Address family filters for the matcher
    pub fn filters(&self) -> FamilyFilters {
        FamilyFilters {
            ipv4: self.enable_ipv4,
            ipv6: self.enable_ipv6,
        }
    }

    /// Validate the settings
    ///
    /// Any numeric `check_interval` is accepted; [`poll_interval`] clamps it.
    ///
    /// [`poll_interval`]: MonitorSettings::poll_interval
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.check_interval.is_nan() {
            return Err(crate::Error::config("check_interval must be a number of seconds"));
        }
        Ok(())
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            auto_start: false,
            check_interval: default_check_interval(),
            notifications: true,
            enable_ipv4: true,
            enable_ipv6: true,
            notification_timeout: default_notification_timeout(),
        }
    }
}

/// Geolocation API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Base URL of the geolocation API
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_lookup_timeout_secs")]
    pub timeout_secs: u64,
}

impl LookupConfig {
    /// Validate the lookup configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.base_url.is_empty() {
            return Err(crate::Error::config("lookup base_url cannot be empty"));
        }
        if !self.base_url.starts_with("https://") && !self.base_url.starts_with("http://") {
            return Err(crate::Error::config(format!(
                "lookup base_url must use HTTP or HTTPS scheme. Got: {}",
                self.base_url
            )));
        }
        if !(1..=60).contains(&self.timeout_secs) {
            return Err(crate::Error::config(format!(
                "lookup timeout_secs must be between 1 and 60. Got: {}",
                self.timeout_secs
            )));
        }
        Ok(())
    }

    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Human-facing page with details about an address
    pub fn details_url(&self, address: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), address)
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout_secs: default_lookup_timeout_secs(),
        }
    }
}

/// History store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryStoreConfig {
    /// JSON file store
    File {
        /// Path to the history file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl HistoryStoreConfig {
    /// Validate the history store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            HistoryStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("history file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            HistoryStoreConfig::File { .. } => "file",
            HistoryStoreConfig::Memory => "memory",
        }
    }
}

/// Notification backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Backend names in priority order
    #[serde(default = "default_backends")]
    pub backends: Vec<String>,
}

impl NotificationConfig {
    /// Validate the notification configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.backends.iter().any(|b| b.trim().is_empty()) {
            return Err(crate::Error::config(
                "notification backend names cannot be empty",
            ));
        }
        Ok(())
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_check_interval() -> f64 {
    2.0
}

fn default_notification_timeout() -> u64 {
    10
}

fn default_api_base_url() -> String {
    "https://ipv4.ink".to_string()
}

fn default_lookup_timeout_secs() -> u64 {
    10
}

fn default_backends() -> Vec<String> {
    vec![
        "native".to_string(),
        "tray".to_string(),
        "console".to_string(),
    ]
}

fn default_event_channel_capacity() -> usize {
    1000
}
