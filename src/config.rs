//! Configuration module for newsdesk.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{NewsdeskError, Result};

/// Source store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file holding sources.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/newsdesk.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Item store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemsConfig {
    /// Directory of the item file store.
    #[serde(default = "default_items_path")]
    pub path: String,
}

fn default_items_path() -> String {
    "data/items".to_string()
}

impl Default for ItemsConfig {
    fn default() -> Self {
        Self {
            path: default_items_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/newsdesk.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Discovery engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// How often the control loop checks for due sources, in seconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// How often enabled sources are re-listed from storage, in seconds.
    #[serde(default = "default_relist_interval")]
    pub relist_interval_secs: u64,
    /// Maximum number of concurrent source fetches.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    /// End-to-end timeout for one source fetch, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Timeout for a single HTTP request inside a fetch, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// TCP connect timeout, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Consecutive transient failures before a source is disabled.
    #[serde(default = "default_disable_threshold")]
    pub disable_threshold: u32,
    /// Polling interval applied when a source omits one, in seconds.
    #[serde(default = "default_polling_interval")]
    pub default_polling_interval_secs: u64,
    /// How long in-flight fetches may run after a termination request, in seconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// Maximum accepted response body in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Allow loopback and private network source URLs.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_tick_interval() -> u64 {
    60
}

fn default_relist_interval() -> u64 {
    300 // 5 minutes
}

fn default_max_concurrent_fetches() -> usize {
    5
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_disable_threshold() -> u32 {
    10
}

fn default_polling_interval() -> u64 {
    3600 // 1 hour
}

fn default_shutdown_grace() -> u64 {
    60
}

fn default_max_response_bytes() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_max_redirects() -> usize {
    5
}

fn default_user_agent() -> String {
    concat!("newsdesk/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            relist_interval_secs: default_relist_interval(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fetch_timeout_secs: default_fetch_timeout(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            disable_threshold: default_disable_threshold(),
            default_polling_interval_secs: default_polling_interval(),
            shutdown_grace_secs: default_shutdown_grace(),
            max_response_bytes: default_max_response_bytes(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            allow_private_hosts: false,
        }
    }
}

impl DiscoveryConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn relist_interval(&self) -> Duration {
        Duration::from_secs(self.relist_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn default_polling_interval(&self) -> Duration {
        Duration::from_secs(self.default_polling_interval_secs)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Source store configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Item store configuration.
    #[serde(default)]
    pub items: ItemsConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Discovery engine configuration.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(NewsdeskError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| NewsdeskError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `NEWSDESK_DATABASE_PATH`: source store database file
    /// - `NEWSDESK_ITEMS_PATH`: item store directory
    /// - `NEWSDESK_LOG_LEVEL`: log level
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = non_empty_env("NEWSDESK_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(path) = non_empty_env("NEWSDESK_ITEMS_PATH") {
            self.items.path = path;
        }
        if let Some(level) = non_empty_env("NEWSDESK_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let d = &self.discovery;
        if d.max_concurrent_fetches == 0 {
            return Err(NewsdeskError::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if d.tick_interval_secs == 0 || d.relist_interval_secs == 0 {
            return Err(NewsdeskError::Config(
                "tick_interval_secs and relist_interval_secs must be positive".to_string(),
            ));
        }
        if d.fetch_timeout_secs == 0 || d.request_timeout_secs == 0 {
            return Err(NewsdeskError::Config(
                "fetch and request timeouts must be positive".to_string(),
            ));
        }
        if d.request_timeout_secs > d.fetch_timeout_secs {
            return Err(NewsdeskError::Config(format!(
                "request_timeout_secs ({}) exceeds fetch_timeout_secs ({})",
                d.request_timeout_secs, d.fetch_timeout_secs
            )));
        }
        if d.disable_threshold == 0 {
            return Err(NewsdeskError::Config(
                "disable_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.database.path, "data/newsdesk.db");
        assert_eq!(config.items.path, "data/items");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/newsdesk.log");

        let d = &config.discovery;
        assert_eq!(d.tick_interval_secs, 60);
        assert_eq!(d.relist_interval_secs, 300);
        assert_eq!(d.max_concurrent_fetches, 5);
        assert_eq!(d.fetch_timeout_secs, 60);
        assert_eq!(d.request_timeout_secs, 10);
        assert_eq!(d.disable_threshold, 10);
        assert_eq!(d.default_polling_interval_secs, 3600);
        assert_eq!(d.shutdown_grace_secs, 60);
        assert_eq!(d.max_response_bytes, 5 * 1024 * 1024);
        assert!(!d.allow_private_hosts);
        assert!(d.user_agent.starts_with("newsdesk/"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[database]
path = "custom/sources.db"

[items]
path = "custom/items"

[logging]
level = "debug"
file = "custom/logs/app.log"

[discovery]
tick_interval_secs = 30
relist_interval_secs = 120
max_concurrent_fetches = 8
fetch_timeout_secs = 90
request_timeout_secs = 15
connect_timeout_secs = 3
disable_threshold = 4
default_polling_interval_secs = 1800
shutdown_grace_secs = 20
max_response_bytes = 1048576
max_redirects = 2
user_agent = "test-agent"
allow_private_hosts = true
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.database.path, "custom/sources.db");
        assert_eq!(config.items.path, "custom/items");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "custom/logs/app.log");

        let d = &config.discovery;
        assert_eq!(d.tick_interval(), Duration::from_secs(30));
        assert_eq!(d.relist_interval(), Duration::from_secs(120));
        assert_eq!(d.max_concurrent_fetches, 8);
        assert_eq!(d.fetch_timeout(), Duration::from_secs(90));
        assert_eq!(d.request_timeout(), Duration::from_secs(15));
        assert_eq!(d.connect_timeout(), Duration::from_secs(3));
        assert_eq!(d.disable_threshold, 4);
        assert_eq!(d.default_polling_interval(), Duration::from_secs(1800));
        assert_eq!(d.shutdown_grace(), Duration::from_secs(20));
        assert_eq!(d.max_response_bytes, 1048576);
        assert_eq!(d.max_redirects, 2);
        assert_eq!(d.user_agent, "test-agent");
        assert!(d.allow_private_hosts);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[discovery]
max_concurrent_fetches = 2
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.discovery.max_concurrent_fetches, 2);
        assert_eq!(config.discovery.fetch_timeout_secs, 60);
        assert_eq!(config.database.path, "data/newsdesk.db");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.discovery.disable_threshold, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        assert!(result.is_err());
        if let Err(NewsdeskError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(NewsdeskError::Io(_))));
    }

    #[test]
    fn test_apply_env_overrides_items_path() {
        let original = std::env::var("NEWSDESK_ITEMS_PATH").ok();

        std::env::set_var("NEWSDESK_ITEMS_PATH", "/srv/items");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.items.path, "/srv/items");

        std::env::set_var("NEWSDESK_ITEMS_PATH", "");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.items.path, "data/items");

        if let Some(val) = original {
            std::env::set_var("NEWSDESK_ITEMS_PATH", val);
        } else {
            std::env::remove_var("NEWSDESK_ITEMS_PATH");
        }
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default();
        config.discovery.max_concurrent_fetches = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_request_timeout_exceeds_fetch_timeout() {
        let mut config = Config::default();
        config.discovery.request_timeout_secs = 120;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_validate_zero_threshold() {
        let mut config = Config::default();
        config.discovery.disable_threshold = 0;
        assert!(config.validate().is_err());
    }
}
