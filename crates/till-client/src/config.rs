//! # Client Configuration
//!
//! Configuration for the register's backend client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_API_URL=http://10.0.0.5:8080                                  │
//! │     TILL_DEVICE_ID=abc-123                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tillpoint/register.toml (Linux)                          │
//! │     ~/Library/Application Support/com.tillpoint.register/register.toml │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     localhost backend, auto-generated device_id                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Register 1"
//!
//! [api]
//! base_url = "http://localhost:8080"
//! request_timeout_secs = 10
//!
//! [offline]
//! probe_path = "/health"
//! probe_interval_secs = 5
//! max_probe_backoff_secs = 60
//! requeue_on_connectivity_error = false
//!
//! [scanner]
//! max_gap_ms = 50
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use till_core::{ScanConfig, DEFAULT_SCAN_GAP_MS};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    #[serde(default = "default_device_id")]
    pub id: String,

    /// Human-readable device name (e.g., "Register 1").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_device_name() -> String {
    "Register".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: default_device_id(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// API Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Backend origin; endpoint paths are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Offline Settings
// =============================================================================

/// Connectivity probing and replay behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineSettings {
    /// Path polled to decide whether the backend is reachable.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Poll interval while online; also the first backoff step while offline.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Ceiling for the offline probe backoff.
    #[serde(default = "default_max_probe_backoff")]
    pub max_probe_backoff_secs: u64,

    /// Keep an action queued when its replay fails because the connection
    /// dropped again. Backend rejections are always dropped.
    #[serde(default)]
    pub requeue_on_connectivity_error: bool,
}

fn default_probe_path() -> String {
    "/health".to_string()
}

fn default_probe_interval() -> u64 {
    5
}

fn default_max_probe_backoff() -> u64 {
    60
}

impl Default for OfflineSettings {
    fn default() -> Self {
        OfflineSettings {
            probe_path: default_probe_path(),
            probe_interval_secs: default_probe_interval(),
            max_probe_backoff_secs: default_max_probe_backoff(),
            requeue_on_connectivity_error: false,
        }
    }
}

// =============================================================================
// Scanner Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerSettings {
    /// Longest pause between two keystrokes of one hardware scan.
    #[serde(default = "default_max_gap")]
    pub max_gap_ms: u64,
}

fn default_max_gap() -> u64 {
    DEFAULT_SCAN_GAP_MS
}

impl Default for ScannerSettings {
    fn default() -> Self {
        ScannerSettings {
            max_gap_ms: default_max_gap(),
        }
    }
}

// =============================================================================
// Main Client Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub offline: OfflineSettings,

    #[serde(default)]
    pub scanner: ScannerSettings,
}

impl ClientConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (register.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading client config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load client config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Client config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("device.id must not be empty".into()));
        }

        let url = Url::parse(&self.api.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Base URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if !self.offline.probe_path.starts_with('/') {
            return Err(SyncError::InvalidConfig(format!(
                "probe_path must start with '/', got: {}",
                self.offline.probe_path
            )));
        }

        let positive = [
            ("api.request_timeout_secs", self.api.request_timeout_secs),
            ("offline.probe_interval_secs", self.offline.probe_interval_secs),
            ("offline.max_probe_backoff_secs", self.offline.max_probe_backoff_secs),
            ("scanner.max_gap_ms", self.scanner.max_gap_ms),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(SyncError::InvalidConfig(format!(
                "{name} must be greater than 0"
            )));
        }

        if self.offline.max_probe_backoff_secs < self.offline.probe_interval_secs {
            return Err(SyncError::InvalidConfig(
                "max_probe_backoff_secs must not be below probe_interval_secs".into(),
            ));
        }

        Ok(())
    }

    /// Applies `TILL_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("TILL_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(name) = lookup("TILL_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(url) = lookup("TILL_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Some(interval) = lookup("TILL_PROBE_INTERVAL_SECS") {
            match interval.parse::<u64>() {
                Ok(secs) => self.offline.probe_interval_secs = secs,
                Err(_) => warn!(value = %interval, "Ignoring invalid TILL_PROBE_INTERVAL_SECS"),
            }
        }

        if let Some(gap) = lookup("TILL_SCAN_GAP_MS") {
            match gap.parse::<u64>() {
                Ok(ms) => self.scanner.max_gap_ms = ms,
                Err(_) => warn!(value = %gap, "Ignoring invalid TILL_SCAN_GAP_MS"),
            }
        }
    }

    /// Returns the platform config directory for the register.
    pub fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "tillpoint", "register")
    }

    /// `register.toml` in the platform config directory.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("register.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Parsed backend origin.
    pub fn base_url(&self) -> SyncResult<Url> {
        Ok(Url::parse(&self.api.base_url)?)
    }

    /// Full URL of a backend endpoint such as `/health`.
    pub fn endpoint_url(&self, path: &str) -> SyncResult<Url> {
        Ok(Url::parse(&endpoint(&self.base_url()?, path))?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.offline.probe_interval_secs)
    }

    pub fn max_probe_backoff(&self) -> Duration {
        Duration::from_secs(self.offline.max_probe_backoff_secs)
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig::with_max_gap_ms(self.scanner.max_gap_ms)
    }
}

/// Appends `path` to `base`, keeping any path prefix on the base
/// (`http://host/pos` + `/health` is `http://host/pos/health`).
pub(crate) fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(!config.device.id.is_empty()); // Auto-generated
        assert_eq!(config.api.request_timeout_secs, 10);
        assert_eq!(config.offline.probe_path, "/health");
        assert!(!config.offline.requeue_on_connectivity_error);
        assert_eq!(config.scan_config().max_gap, Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_keeps_base_path_prefix() {
        let mut config = ClientConfig::default();
        config.api.base_url = "http://10.0.0.5:8080/pos".into();
        assert_eq!(
            config.endpoint_url("/health").unwrap().as_str(),
            "http://10.0.0.5:8080/pos/health"
        );

        config.api.base_url = "http://10.0.0.5:8080/pos/".into();
        assert_eq!(
            config.endpoint_url("/health").unwrap().as_str(),
            "http://10.0.0.5:8080/pos/health"
        );

        config.api.base_url = "http://10.0.0.5:8080".into();
        assert_eq!(
            config.endpoint_url("health").unwrap().as_str(),
            "http://10.0.0.5:8080/health"
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = ClientConfig::default();

        config.api.base_url = "ws://localhost:8080".into();
        assert!(config.validate().unwrap_err().is_config_error());

        config.api.base_url = "not a url".into();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.api.base_url = "https://pos.example.com".into();
        assert!(config.validate().is_ok());

        config.scanner.max_gap_ms = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
        config.scanner.max_gap_ms = 50;

        config.offline.probe_interval_secs = 0;
        assert!(config.validate().is_err());
        config.offline.probe_interval_secs = 5;

        config.device.id = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TILL_DEVICE_ID", "reg-7"),
            ("TILL_DEVICE_NAME", "Front Counter"),
            ("TILL_API_URL", "http://10.0.0.5:3000"),
            ("TILL_PROBE_INTERVAL_SECS", "2"),
            ("TILL_SCAN_GAP_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = ClientConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.device_id(), "reg-7");
        assert_eq!(config.device.name, "Front Counter");
        assert_eq!(config.api.base_url, "http://10.0.0.5:3000");
        assert_eq!(config.probe_interval(), Duration::from_secs(2));
        assert_eq!(config.scanner.max_gap_ms, 50);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://pos.example.com"

            [offline]
            requeue_on_connectivity_error = true
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://pos.example.com");
        assert_eq!(config.api.request_timeout_secs, 10);
        assert!(config.offline.requeue_on_connectivity_error);
        assert_eq!(config.offline.probe_interval_secs, 5);
        assert!(!config.device.id.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("register.toml");

        let mut config = ClientConfig::default();
        config.device.name = "Register 2".into();
        config.offline.max_probe_backoff_secs = 120;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[device]"));
        assert!(contents.contains("[offline]"));

        let loaded: ClientConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.device.id, config.device.id);
        assert_eq!(loaded.device.name, "Register 2");
        assert_eq!(loaded.offline.max_probe_backoff_secs, 120);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_or_default(Some(dir.path().join("absent.toml")));
        assert_eq!(config.offline.probe_path, "/health");
    }
}
