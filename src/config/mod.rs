/// Configuration management for jcouch

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default cluster host used when none (or an invalid one) is given
pub const DEFAULT_HOST: &str = "52.4.120.251";
/// Default cluster port used when none (or an invalid one) is given
pub const DEFAULT_PORT: u16 = 8091;
/// Idle time after which a cached bucket handle is evicted, in seconds
pub const DEFAULT_BUCKET_TIMEOUT_SEC: u64 = 10;
/// Period of the idle bucket sweep, in seconds
pub const DEFAULT_BUCKET_INTERVAL_SEC: u64 = 10;

/// Main jcouch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cluster endpoint
    pub cluster: ClusterConfig,
    /// Bucket cache configuration
    pub cache: CacheConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Cluster endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster host name or IP
    pub host: String,
    /// Cluster management port
    pub port: u16,
}

/// Bucket cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Idle seconds before a bucket handle is evicted
    pub bucket_timeout_sec: u64,
    /// Seconds between idle sweeps
    pub bucket_interval_sec: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl ClusterConfig {
    /// Build a cluster config, falling back to the defaults for omitted or
    /// unusable values. Nothing is reported for the fallback.
    pub fn new(host: Option<&str>, port: Option<u16>) -> Self {
        let host = match host.map(str::trim) {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => DEFAULT_HOST.to_string(),
        };
        let port = match port {
            Some(p) if p != 0 => p,
            _ => DEFAULT_PORT,
        };
        Self { host, port }
    }

    /// Address handed to the cluster client, `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl CacheConfig {
    pub fn bucket_timeout(&self) -> Duration {
        Duration::from_secs(self.bucket_timeout_sec)
    }

    pub fn bucket_interval(&self) -> Duration {
        Duration::from_secs(self.bucket_interval_sec)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bucket_timeout_sec: DEFAULT_BUCKET_TIMEOUT_SEC,
            bucket_interval_sec: DEFAULT_BUCKET_INTERVAL_SEC,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "cluster host cannot be empty".to_string(),
            ));
        }

        if self.cluster.port == 0 {
            return Err(ConfigError::ValidationError(
                "cluster port must be greater than 0".to_string(),
            ));
        }

        if self.cache.bucket_timeout_sec == 0 {
            return Err(ConfigError::ValidationError(
                "bucket_timeout_sec must be greater than 0".to_string(),
            ));
        }

        if self.cache.bucket_interval_sec == 0 {
            return Err(ConfigError::ValidationError(
                "bucket_interval_sec must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => return Err(ConfigError::ValidationError(
                format!("Invalid log level: {}", self.logging.level)
            )),
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        // Production deployments keep handles around far longer than the defaults.
        let config = Config {
            cache: CacheConfig {
                bucket_timeout_sec: 600,
                bucket_interval_sec: 10,
            },
            ..Default::default()
        };

        config.save_to_file(path)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
