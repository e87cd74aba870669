//! Configuration management
//!
//! This module handles loading, saving, and migrating the s3c configuration file.
//! The configuration file is stored in TOML format at ~/.config/s3c/config.toml,
//! or under `$S3C_CONFIG_DIR` when that variable is set.
//!
//! Changes to schema_version require migration support.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::DEFAULT_DELIMITER;
use crate::profile::Profile;

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "S3C_CONFIG_DIR";

/// Default theme name handed to the presentation layer
const DEFAULT_THEME: &str = "green_on_black";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Listing and cache settings
    #[serde(default)]
    pub namespace: NamespaceConfig,

    /// Transfer engine settings
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Configured storage profiles
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// Default settings for application behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Theme name, interpreted by the presentation layer only
    #[serde(default = "default_theme")]
    pub theme: String,

    /// Profile used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Ask for confirmation before non-destructive copies as well
    #[serde(default)]
    pub confirm_copy: bool,

    /// Show progress bars
    #[serde(default = "default_true")]
    pub progress: bool,
}

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            profile: None,
            confirm_copy: false,
            progress: true,
        }
    }
}

/// Namespace model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Listing cache TTL in seconds; absent means valid until invalidated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,

    /// Maximum keys per listing page; absent uses the backend default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i32>,

    /// Key delimiter used to synthesize directories
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: None,
            page_size: None,
            delimiter: default_delimiter(),
        }
    }
}

impl NamespaceConfig {
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

/// Retry configuration for transient failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    10000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `retry` (0 = first retry), doubling up to the cap
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Transfer engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum number of items in flight
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Timeout applied to every backend call, in milliseconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_max_in_flight() -> usize {
    4
}

fn default_call_timeout() -> u64 {
    30000
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            call_timeout_ms: default_call_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl TransferConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            namespace: NamespaceConfig::default(),
            transfer: TransferConfig::default(),
            profiles: Vec::new(),
        }
    }
}

impl Config {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.namespace.delimiter.is_empty() {
            return Err(Error::Config("namespace.delimiter cannot be empty".into()));
        }
        if self.transfer.max_in_flight == 0 {
            return Err(Error::Config("transfer.max_in_flight must be at least 1".into()));
        }
        if self.transfer.retry.max_attempts == 0 {
            return Err(Error::Config("transfer.retry.max_attempts must be at least 1".into()));
        }
        if matches!(self.namespace.page_size, Some(n) if n <= 0) {
            return Err(Error::Config("namespace.page_size must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("s3c"),
        };
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    /// If the schema version doesn't match, attempts migration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config = self.migrate(config)?;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade s3c.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 600 (owner read/write only) since profiles may hold keys.
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.config_path, permissions)?;
        }

        Ok(())
    }

    /// Migrate configuration from older schema version
    fn migrate(&self, mut config: Config) -> Result<Config> {
        config.schema_version = SCHEMA_VERSION;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = ConfigManager::with_path(config_path);
        (manager, temp_dir)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.defaults.theme, "green_on_black");
        assert!(config.defaults.progress);
        assert!(!config.defaults.confirm_copy);
        assert_eq!(config.namespace.delimiter, "/");
        assert!(config.namespace.cache_ttl().is_none());
        assert_eq!(config.transfer.max_in_flight, 4);
        assert_eq!(config.transfer.retry.max_attempts, 3);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let (manager, _temp_dir) = temp_config_manager();
        let config = manager.load().unwrap();
        assert_eq!(config.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_save_and_load() {
        let (manager, _temp_dir) = temp_config_manager();

        let mut config = Config::default();
        config.namespace.cache_ttl_secs = Some(30);
        config.transfer.max_in_flight = 8;
        config.profiles.push(Profile::new("local"));

        manager.save(&config).unwrap();
        let loaded = manager.load().unwrap();

        assert_eq!(loaded.namespace.cache_ttl(), Some(Duration::from_secs(30)));
        assert_eq!(loaded.transfer.max_in_flight, 8);
        assert_eq!(loaded.profiles.len(), 1);
        assert_eq!(loaded.profiles[0].name, "local");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let (manager, _temp_dir) = temp_config_manager();
        std::fs::write(
            manager.config_path(),
            "schema_version = 1\n[transfer.retry]\nmax_attempts = 5\n",
        )
        .unwrap();

        let config = manager.load().unwrap();
        assert_eq!(config.transfer.retry.max_attempts, 5);
        assert_eq!(config.transfer.retry.initial_backoff_ms, 100);
        assert_eq!(config.transfer.max_in_flight, 4);
    }

    #[test]
    fn test_schema_version_too_new() {
        let (manager, _temp_dir) = temp_config_manager();

        let content = format!("schema_version = {}\n", SCHEMA_VERSION + 1);
        std::fs::write(manager.config_path(), content).unwrap();

        let result = manager.load();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("newer than supported"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let (manager, _temp_dir) = temp_config_manager();
        std::fs::write(
            manager.config_path(),
            "schema_version = 1\n[transfer]\nmax_in_flight = 0\n",
        )
        .unwrap();

        assert!(matches!(manager.load(), Err(Error::Config(_))));
    }

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
        };
        assert_eq!(retry.backoff(0), Duration::from_millis(100));
        assert_eq!(retry.backoff(1), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(800));
        assert_eq!(retry.backoff(4), Duration::from_millis(1000));
        assert_eq!(retry.backoff(80), Duration::from_millis(1000));
    }
}
