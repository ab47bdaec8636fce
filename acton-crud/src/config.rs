//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: ACTON_, nesting separator: `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/acton-crud/{service_name}/config.toml
//! 4. System directory: /etc/acton-crud/{service_name}/config.toml
//! 5. Default values
//!
//! Every collaborator receives the sub-struct it needs explicitly; nothing in
//! the crate reads configuration from global state.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Relationship eager fetching
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Named caches
    #[serde(default)]
    pub cache: CacheConfig,

    /// Call logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Eager fetching configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Route reads through the eager-fetch repository when one is available
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Allow a many-to-many relationship to take the single collection join
    ///
    /// When false, many-to-many relationships are always loaded by a
    /// secondary batched query.
    #[serde(default = "default_true")]
    pub join_many_to_many: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            join_many_to_many: true,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Consult and populate caches at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Suffix of the list-query cache family evicted on writes
    #[serde(default = "default_all_suffix")]
    pub all_suffix: String,

    /// Redis backing store (optional)
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            all_suffix: default_all_suffix(),
            redis: None,
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,

    /// Maximum retry attempts for establishing the Redis connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl RedisConfig {
    /// Base delay between connection attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Call logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log every call of every service, loggable or not
    #[serde(default = "default_false")]
    pub activate_logging: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_all_suffix() -> String {
    "All".to_string()
}

fn default_redis_max_connections() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

impl Config {
    /// Load configuration from all sources
    ///
    /// The service name is inferred from the binary name.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "acton-crud".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::named(service_name)));

        // Lowest priority first so that later merges win
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("ACTON_").split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// Bypasses the XDG and system directories.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ACTON_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Config file paths for a service, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("acton-crud");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc/acton-crud").join(service_name).join("config.toml"));

        paths
    }

    /// Default configuration for the named service
    pub fn named(service_name: &str) -> Self {
        let mut config = Self::default();
        config.service.name = service_name.to_string();
        config
    }

    /// Get Redis URL
    pub fn redis_url(&self) -> Option<&str> {
        self.cache.redis.as_ref().map(|r| r.url.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "acton-crud".to_string(),
                log_level: default_log_level(),
                environment: default_environment(),
            },
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.log_level, "info");
        assert!(config.fetch.enabled);
        assert!(config.fetch.join_many_to_many);
        assert_eq!(config.cache.all_suffix, "All");
        assert!(!config.logging.activate_logging);
        assert!(config.redis_url().is_none());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[service]
name = "employees"

[fetch]
join_many_to_many = false

[cache]
all_suffix = "List"

[cache.redis]
url = "redis://localhost:6379"

[logging]
activate_logging = true
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.service.name, "employees");
        assert_eq!(config.service.environment, "dev");
        assert!(config.fetch.enabled);
        assert!(!config.fetch.join_many_to_many);
        assert_eq!(config.cache.all_suffix, "List");
        assert_eq!(config.redis_url(), Some("redis://localhost:6379"));
        assert_eq!(config.cache.redis.as_ref().unwrap().max_retries, 5);
        assert!(config.logging.activate_logging);
    }

    #[test]
    fn test_named_config() {
        let config = Config::named("orders");
        assert_eq!(config.service.name, "orders");
    }
}
