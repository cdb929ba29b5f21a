//! Configuration loading for pocket-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! section and key is optional.

use crate::discovery::SERVICE_TYPE;
use crate::session::SessionConfig;
use relay_core::ReconnectPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for pocket-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Discovery configuration.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Session configuration.
    #[serde(default)]
    pub session: SessionSettings,
    /// Change poller configuration.
    #[serde(default)]
    pub poller: PollerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Discovery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// DNS-SD service type to browse (default: `_relay._tcp.local.`).
    #[serde(default = "default_service_type")]
    pub service_type: String,
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// First reconnect delay in milliseconds (default: 1000).
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    /// Cap on the exponential reconnect delay in milliseconds (default: 30000).
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    /// Maximum random jitter added per reconnect in milliseconds (default: 1000).
    #[serde(default = "default_reconnect_jitter_ms")]
    pub reconnect_jitter_ms: u64,
    /// Give up after this many failed attempts; 0 retries forever (default: 0).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

/// Change poller configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Delay between ticks in seconds (default: 5).
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// Emit the legacy idle placeholder record (default: false).
    #[serde(default)]
    pub legacy_idle_placeholder: bool,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Settings file holding the trusted hosts (default: `settings.toml`).
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,
}

// Default value functions
fn default_service_type() -> String {
    SERVICE_TYPE.to_string()
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_cap_ms() -> u64 {
    30_000
}

fn default_reconnect_jitter_ms() -> u64 {
    1_000
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("settings.toml")
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            reconnect_jitter_ms: default_reconnect_jitter_ms(),
            max_reconnect_attempts: 0,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            legacy_idle_placeholder: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            settings_path: default_settings_path(),
        }
    }
}

impl SessionSettings {
    /// The reconnect backoff these settings describe.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(self.reconnect_base_ms),
            cap: Duration::from_millis(self.reconnect_cap_ms),
            max_jitter: Duration::from_millis(self.reconnect_jitter_ms),
            max_attempts: (self.max_reconnect_attempts > 0).then_some(self.max_reconnect_attempts),
        }
    }
}

impl PollerConfig {
    /// Delay between ticks.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Session tuning derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reconnect: self.session.reconnect_policy(),
            poll_interval: self.poller.interval(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = RelayConfig::default();
        assert_eq!(config.discovery.service_type, "_relay._tcp.local.");
        assert_eq!(config.session.reconnect_base_ms, 1_000);
        assert_eq!(config.poller.interval_secs, 5);
        assert!(!config.poller.legacy_idle_placeholder);
        assert_eq!(config.storage.settings_path, PathBuf::from("settings.toml"));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(config.session.reconnect_cap_ms, 30_000);
        assert_eq!(config.session.max_reconnect_attempts, 0);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[discovery]
service_type = "_relay-test._tcp.local."

[session]
reconnect_base_ms = 250
max_reconnect_attempts = 4

[poller]
interval_secs = 2
legacy_idle_placeholder = true

[storage]
settings_path = "/data/relay/settings.toml"
"#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.discovery.service_type, "_relay-test._tcp.local.");
        assert_eq!(config.session.reconnect_base_ms, 250);
        assert_eq!(config.session.reconnect_cap_ms, 30_000);
        assert_eq!(config.poller.interval(), Duration::from_secs(2));
        assert!(config.poller.legacy_idle_placeholder);
        assert_eq!(
            config.storage.settings_path,
            PathBuf::from("/data/relay/settings.toml")
        );
    }

    #[test]
    fn zero_attempts_means_unlimited() {
        let policy = SessionSettings::default().reconnect_policy();
        assert_eq!(policy.max_attempts, None);

        let bounded = SessionSettings {
            max_reconnect_attempts: 3,
            ..Default::default()
        }
        .reconnect_policy();
        assert_eq!(bounded.max_attempts, Some(3));
        assert_eq!(bounded.base, Duration::from_secs(1));
        assert_eq!(bounded.max_jitter, Duration::from_secs(1));
    }

    #[test]
    fn session_config_carries_poll_interval() {
        let mut config = RelayConfig::default();
        config.poller.interval_secs = 9;
        assert_eq!(config.session_config().poll_interval, Duration::from_secs(9));
    }

    #[test]
    fn from_file_reports_path_on_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            RelayConfig::from_file(&missing),
            Err(ConfigError::ReadError { path, .. }) if path == missing
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::File::create(&bad)
            .unwrap()
            .write_all(b"[session\n")
            .unwrap();
        assert!(matches!(
            RelayConfig::from_file(&bad),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
