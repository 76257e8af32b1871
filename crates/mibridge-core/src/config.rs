/*!
 * Configuration management for mibridge.
 *
 * This module provides functionality to load, validate, and access configuration
 * settings: logging, the discovery retry policy, and the list of bridged
 * accessories.
 */
use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::DeviceKind;

/// Core configuration for mibridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Discovery configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Bridged accessories
    #[serde(default)]
    pub accessories: Vec<AccessoryConfig>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Name the bridge announces itself with
    #[serde(default = "default_bridge_name")]
    pub bridge_name: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (e.g. "info", "mibridge_devices=debug")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// Discovery and reconnection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Fixed delay between discovery attempts, in seconds
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,

    /// Upper bound on a single connect attempt, in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// During a failure streak, log one warning every this many failures
    #[serde(default = "default_failure_log_every")]
    pub failure_log_every: u32,

    /// Drop the session and rediscover when a command reports a lost connection
    #[serde(default)]
    pub rediscover_on_connection_loss: bool,
}

/// A single bridged accessory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessoryConfig {
    /// Device profile
    pub kind: DeviceKind,

    /// Display name; defaults per profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Network address of the device
    #[serde(default, alias = "ip", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Shared-secret token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Expected device model, overriding the profile default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AccessoryConfig {
    /// Create an accessory entry with the required fields
    pub fn new<A: Into<String>, T: Into<String>>(kind: DeviceKind, address: A, token: T) -> Self {
        Self {
            kind,
            name: None,
            address: Some(address.into()),
            token: Some(token.into()),
            model: None,
        }
    }

    /// Set the display name
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The configured name, or the profile default
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.kind.default_name().to_string())
    }

    /// Check that address and token are present
    pub fn validate(&self) -> Result<()> {
        let name = self.display_name();
        match self.address.as_deref() {
            Some(address) if !address.trim().is_empty() => {}
            _ => return Err(Error::config(format!("{}: missing address", name))),
        }
        match self.token.as_deref() {
            Some(token) if !token.trim().is_empty() => {}
            _ => return Err(Error::config(format!("{}: missing token", name))),
        }
        Ok(())
    }
}

impl DiscoveryConfig {
    /// Delay between discovery attempts
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// Upper bound on a single connect attempt
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        if self.discovery.retry_interval_secs == 0 {
            return Err(Error::config("discovery.retry_interval_secs must be positive"));
        }
        if self.discovery.connect_timeout_secs == 0 {
            return Err(Error::config("discovery.connect_timeout_secs must be positive"));
        }
        if self.discovery.failure_log_every == 0 {
            return Err(Error::config("discovery.failure_log_every must be positive"));
        }
        for accessory in &self.accessories {
            accessory.validate()?;
        }
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bridge_name: default_bridge_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            failure_log_every: default_failure_log_every(),
            rediscover_on_connection_loss: false,
        }
    }
}

fn default_bridge_name() -> String {
    "mibridge".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_retry_interval_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_failure_log_every() -> u32 {
    10
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        let mut config_builder = ConfigLib::builder();

        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                return Err(Error::config(format!(
                    "Configuration file {} does not exist",
                    config_file
                )));
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;

        info!(
            accessories = config.accessories.len(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.toml");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, file_path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.bridge_name, "mibridge");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.discovery.retry_interval(), Duration::from_secs(30));
        assert_eq!(config.discovery.failure_log_every, 10);
        assert!(!config.discovery.rediscover_on_connection_loss);
        assert!(config.accessories.is_empty());
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.general.bridge_name, "mibridge");
        assert_eq!(config.discovery.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_builder_with_file() -> Result<()> {
        let (_dir, path) = write_config(
            r#"
                [general]
                bridge_name = "living-room"

                [discovery]
                retry_interval_secs = 5

                [[accessories]]
                kind = "air_purifier"
                name = "Bedroom Purifier"
                address = "192.168.1.20"
                token = "ffffffffffffffffffffffffffffffff"

                [[accessories]]
                kind = "camera"
                ip = "192.168.1.21"
                token = "00112233445566778899aabbccddeeff"
            "#,
        );

        let config = ConfigBuilder::new().with_config_file(path).build()?;

        assert_eq!(config.general.bridge_name, "living-room");
        assert_eq!(config.discovery.retry_interval(), Duration::from_secs(5));
        assert_eq!(config.accessories.len(), 2);
        assert_eq!(config.accessories[0].kind, DeviceKind::AirPurifier);
        assert_eq!(config.accessories[0].display_name(), "Bedroom Purifier");
        assert_eq!(config.accessories[1].kind, DeviceKind::Camera);
        assert_eq!(config.accessories[1].address.as_deref(), Some("192.168.1.21"));
        assert_eq!(config.accessories[1].display_name(), "Mi Camera");

        Ok(())
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let (_dir, path) = write_config(
            r#"
                [[accessories]]
                kind = "air_purifier"
                address = "192.168.1.20"
            "#,
        );

        let err = ConfigBuilder::new().with_config_file(path).build().unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("missing token")));
    }

    #[test]
    fn test_missing_address_is_fatal() {
        let accessory = AccessoryConfig {
            kind: DeviceKind::Camera,
            name: Some("Porch".into()),
            address: Some("  ".into()),
            token: Some("abc".into()),
            model: None,
        };
        let err = accessory.validate().unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: Porch: missing address");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = ConfigBuilder::new()
            .with_config_file("/nonexistent/mibridge.toml")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_config_builder_with_env() -> Result<()> {
        env::set_var("MIBRIDGE__GENERAL__BRIDGE_NAME", "env-bridge");
        env::set_var("MIBRIDGE__DISCOVERY__RETRY_INTERVAL_SECS", "45");

        let config = ConfigBuilder::new()
            .with_environment_prefix("mibridge")
            .build()?;

        assert_eq!(config.general.bridge_name, "env-bridge");
        assert_eq!(config.discovery.retry_interval_secs, 45);

        env::remove_var("MIBRIDGE__GENERAL__BRIDGE_NAME");
        env::remove_var("MIBRIDGE__DISCOVERY__RETRY_INTERVAL_SECS");

        Ok(())
    }

    #[test]
    fn test_zero_retry_interval_rejected() {
        let mut config = Config::default();
        config.discovery.retry_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_round_trips_accessories() -> Result<()> {
        let mut config = Config::default();
        config.accessories.push(
            AccessoryConfig::new(DeviceKind::AirPurifier, "10.0.0.2", "token").with_name("Office"),
        );

        let rendered = config.to_toml()?;
        assert!(rendered.contains("kind = \"air_purifier\""));
        assert!(rendered.contains("name = \"Office\""));
        assert!(!rendered.contains("model"));
        Ok(())
    }
}
